use clawmon_core::{GatewayStatus, HealthReport};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::runner::CommandRunner;

pub const STATUS_ARGS: &[&str] = &["status", "--json"];
pub const HEALTH_ARGS: &[&str] = &["health", "--json"];

/// Single-signal view of the latest status fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusOutcome {
    Never,
    Fresh(Arc<GatewayStatus>),
    Failed(GatewayError),
}

#[derive(Debug, Default)]
struct AdapterCache {
    status: Option<Arc<GatewayStatus>>,
    status_error: Option<GatewayError>,
    status_at: Option<Instant>,
    health: Option<Arc<HealthReport>>,
    health_error: Option<GatewayError>,
    health_raw: Option<String>,
}

/// Fetches and caches status and health snapshots for one instance.
///
/// A successful fetch replaces the snapshot and clears the error. A failed fetch records the
/// error and leaves the last good snapshot in place. Cancelled fetches change nothing.
#[derive(Debug)]
pub struct StatusAdapter {
    runner: Arc<CommandRunner>,
    cache: RwLock<AdapterCache>,
}

impl StatusAdapter {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self {
            runner,
            cache: RwLock::new(AdapterCache::default()),
        }
    }

    pub fn runner(&self) -> &Arc<CommandRunner> {
        &self.runner
    }

    pub fn instance_name(&self) -> &str {
        self.runner.instance_name()
    }

    pub async fn fetch_status(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<GatewayStatus>, GatewayError> {
        let result = self
            .runner
            .run(STATUS_ARGS, cancel)
            .await
            .and_then(|raw| decode_status(&raw));
        let mut cache = self.write();
        match result {
            Ok(status) => {
                let status = Arc::new(status);
                cache.status = Some(status.clone());
                cache.status_error = None;
                cache.status_at = Some(Instant::now());
                debug!(
                    event = "status_fetched",
                    instance = %self.instance_name(),
                    reachable = status.is_reachable()
                );
                Ok(status)
            }
            Err(err) => {
                if !matches!(err, GatewayError::Cancelled(_)) {
                    warn!(
                        event = "status_fetch_failed",
                        instance = %self.instance_name(),
                        kind = %err.kind(),
                        error = %err
                    );
                    cache.status_error = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    pub async fn fetch_health(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<HealthReport>, GatewayError> {
        let output = self.runner.run(HEALTH_ARGS, cancel).await;
        let mut cache = self.write();
        let result = output.and_then(|raw| {
            cache.health_raw = Some(raw.clone());
            HealthReport::from_json(&raw).map_err(|err| GatewayError::Decode {
                what: "health",
                message: err.to_string(),
                raw,
            })
        });
        match result {
            Ok(report) => {
                let report = Arc::new(report);
                cache.health = Some(report.clone());
                cache.health_error = None;
                debug!(
                    event = "health_fetched",
                    instance = %self.instance_name(),
                    overall = %report.overall
                );
                Ok(report)
            }
            Err(err) => {
                if !matches!(err, GatewayError::Cancelled(_)) {
                    warn!(
                        event = "health_fetch_failed",
                        instance = %self.instance_name(),
                        kind = %err.kind(),
                        error = %err
                    );
                    cache.health_error = Some(err.clone());
                }
                Err(err)
            }
        }
    }

    pub fn cached_status(&self) -> Option<Arc<GatewayStatus>> {
        self.read().status.clone()
    }

    pub fn cached_error(&self) -> Option<GatewayError> {
        self.read().status_error.clone()
    }

    pub fn cached_health(&self) -> Option<Arc<HealthReport>> {
        self.read().health.clone()
    }

    pub fn cached_health_error(&self) -> Option<GatewayError> {
        self.read().health_error.clone()
    }

    /// Raw text of the latest `health --json` response that produced output.
    pub fn cached_health_raw(&self) -> Option<String> {
        self.read().health_raw.clone()
    }

    /// Time since the last successful status fetch.
    pub fn status_age(&self) -> Option<Duration> {
        self.read().status_at.map(|at| at.elapsed())
    }

    pub fn is_reachable(&self) -> bool {
        self.read()
            .status
            .as_ref()
            .is_some_and(|status| status.is_reachable())
    }

    pub fn latest_status_outcome(&self) -> StatusOutcome {
        let cache = self.read();
        match (&cache.status_error, &cache.status) {
            (Some(err), _) => StatusOutcome::Failed(err.clone()),
            (None, Some(status)) => StatusOutcome::Fresh(status.clone()),
            (None, None) => StatusOutcome::Never,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, AdapterCache> {
        self.cache.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AdapterCache> {
        self.cache.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn decode_status(raw: &str) -> Result<GatewayStatus, GatewayError> {
    serde_json::from_str(raw).map_err(|err| GatewayError::Decode {
        what: "status",
        message: err.to_string(),
        raw: raw.to_string(),
    })
}
