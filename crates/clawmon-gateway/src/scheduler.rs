use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub const DEFAULT_REFRESH: Duration = Duration::from_millis(1000);

/// Periodic refresh tick. The first tick fires one period after creation. Ticks do not wait
/// for earlier fetches to finish.
#[derive(Debug)]
pub struct RefreshScheduler {
    period: Duration,
    ticker: Interval,
    ticks: u64,
}

impl RefreshScheduler {
    pub fn new(period: Duration) -> Self {
        let period = if period.is_zero() { DEFAULT_REFRESH } else { period };
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            period,
            ticker,
            ticks: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Waits for the next tick. Cancel-safe.
    pub async fn tick(&mut self) -> u64 {
        self.ticker.tick().await;
        self.ticks += 1;
        debug!(event = "refresh_tick", tick = self.ticks);
        self.ticks
    }

    /// Restarts the period from now, e.g. after a manual refresh.
    pub fn reset(&mut self) {
        self.ticker.reset();
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH)
    }
}
