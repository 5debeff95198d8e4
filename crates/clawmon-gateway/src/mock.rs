//! Simulated gateway for trying the watch loop without an `openclaw` install.
//!
//! Produces the same notifications as [`InstanceCoordinator`](crate::InstanceCoordinator):
//! a status and health snapshot on every switch, refresh and reconnect, plus a log line every
//! couple of seconds from a fixed rotation. No subprocess is ever spawned.

use clawmon_core::{GatewayStatus, HealthReport, Instance, LogEvent, LogLevel};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::info;

use crate::coordinator::{ConnectionState, Notification};
use crate::error::UnknownInstance;

pub const MOCK_LOG_PERIOD: Duration = Duration::from_secs(2);
pub const MOCK_VERSION: &str = "mock-1.0.0";

const MOCK_STATUS: &str = r#"{
    "gateway": {
        "mode": "local",
        "url": "ws://127.0.0.1:18789",
        "reachable": true,
        "connectLatencyMs": 4,
        "self": {"host": "mock", "version": "mock-1.0.0", "platform": "linux"}
    },
    "linkChannel": {"id": "whatsapp", "label": "WhatsApp", "linked": true, "authAgeMs": 86400000},
    "sessions": {"count": 12, "defaults": {"model": "mock-model", "contextTokens": 200000}},
    "agents": {"defaultId": "assistant", "agents": [{"id": "assistant", "sessionsCount": 12}]},
    "memory": {"files": 42, "chunks": 310, "dirty": false},
    "securityAudit": {"summary": {"critical": 0, "warn": 1, "info": 3}}
}"#;

const MOCK_HEALTH: &str = r#"{
    "overall": "ok",
    "gateway": {"reachable": true, "latencyMs": 4, "version": "mock-1.0.0"},
    "channels": [
        {"id": "whatsapp", "label": "WhatsApp", "status": "ok", "connected": true, "authAgeMs": 86400000},
        {"id": "telegram", "label": "Telegram", "status": "ok", "connected": true, "authAgeMs": 172800000}
    ],
    "probeDurationMs": 45
}"#;

const MOCK_LOGS: &[(LogLevel, &str)] = &[
    (LogLevel::Info, "Gateway started successfully"),
    (LogLevel::Info, "WhatsApp channel connected"),
    (LogLevel::Info, "Telegram channel connected"),
    (LogLevel::Debug, "Heartbeat sent"),
    (LogLevel::Info, "New session started: user_123"),
    (LogLevel::Debug, "Processing incoming message"),
    (LogLevel::Info, "Agent 'assistant' handling request"),
    (LogLevel::Debug, "Tool call: web_search"),
    (LogLevel::Info, "Response sent to user"),
    (LogLevel::Warn, "Rate limit approaching for API calls"),
    (LogLevel::Info, "Session compaction triggered"),
    (LogLevel::Debug, "Cache hit for embedding lookup"),
    (LogLevel::Info, "Webhook received from external service"),
    (LogLevel::Error, "Failed to connect to backup server (retrying...)"),
    (LogLevel::Info, "Backup server connection restored"),
];

pub struct MockGateway {
    instances: Vec<Instance>,
    current: usize,
    active: bool,
    connection: ConnectionState,
    ticker: Interval,
    sequence: usize,
    pending: VecDeque<Notification>,
}

impl MockGateway {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self::with_period(instances, MOCK_LOG_PERIOD)
    }

    pub fn with_period(instances: Vec<Instance>, period: Duration) -> Self {
        let period = if period.is_zero() { MOCK_LOG_PERIOD } else { period };
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            instances,
            current: 0,
            active: false,
            connection: ConnectionState::Unknown,
            ticker,
            sequence: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&Instance> {
        self.instances.get(self.current)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.instances
            .iter()
            .position(|instance| instance.name.eq_ignore_ascii_case(name))
    }

    pub fn switch_to(&mut self, index: usize) -> Result<(), UnknownInstance> {
        if index >= self.instances.len() {
            return Err(UnknownInstance {
                index,
                len: self.instances.len(),
            });
        }
        self.pending.clear();
        self.current = index;
        self.active = true;
        self.connection = ConnectionState::Unknown;
        self.ticker.reset();
        info!(event = "mock_switch", to = %self.instances[index].name);
        self.push_snapshots();
        Ok(())
    }

    pub fn select_next(&mut self) -> Result<(), UnknownInstance> {
        let next = match self.instances.len() {
            0 => 0,
            len => (self.current + 1) % len,
        };
        self.switch_to(next)
    }

    pub fn select_previous(&mut self) -> Result<(), UnknownInstance> {
        let previous = match self.instances.len() {
            0 => 0,
            len => (self.current + len - 1) % len,
        };
        self.switch_to(previous)
    }

    pub fn request_refresh(&mut self) {
        if self.active {
            let status = self.status();
            self.push_status(status);
        }
    }

    pub fn reconnect(&mut self) {
        if !self.active {
            let _ = self.switch_to(self.current);
            return;
        }
        self.pending.push_back(Notification::LogArrived {
            instance: self.current,
            event: LogEvent::synthetic(LogLevel::Info, "reconnecting"),
        });
        self.push_snapshots();
    }

    /// Next simulated change. Pends while no instance has been selected.
    pub async fn next(&mut self) -> Notification {
        loop {
            if let Some(notification) = self.pending.pop_front() {
                return notification;
            }
            if !self.active {
                return std::future::pending().await;
            }
            self.ticker.tick().await;
            let event = self.next_log_event();
            self.pending.push_back(Notification::LogArrived {
                instance: self.current,
                event,
            });
        }
    }

    pub fn shutdown(&mut self) {
        self.active = false;
        self.pending.clear();
        info!(event = "mock_shutdown");
    }

    fn status(&self) -> GatewayStatus {
        // The fixture is a constant; a decode failure here would be a bug in it.
        let mut status: GatewayStatus = serde_json::from_str(MOCK_STATUS).unwrap_or_default();
        if let (Some(gateway), Some(instance)) = (status.gateway.as_mut(), self.current()) {
            gateway.self_info.host = instance.name.clone();
        }
        status
    }

    fn health(&self) -> HealthReport {
        let mut report = HealthReport::from_json(MOCK_HEALTH).unwrap_or_default();
        report.ts = Some(chrono::Utc::now().timestamp_millis());
        report
    }

    fn push_snapshots(&mut self) {
        let status = self.status();
        self.push_status(status);
        let report = self.health();
        self.pending.push_back(Notification::HealthFetched {
            instance: self.current,
            result: Ok(Arc::new(report)),
        });
    }

    fn push_status(&mut self, status: GatewayStatus) {
        self.pending.push_back(Notification::StatusFetched {
            instance: self.current,
            result: Ok(Arc::new(status)),
        });
        if self.connection != ConnectionState::Connected {
            self.connection = ConnectionState::Connected;
            self.pending.push_back(Notification::ConnectionChanged {
                instance: self.current,
                state: ConnectionState::Connected,
            });
        }
    }

    fn next_log_event(&mut self) -> LogEvent {
        let (level, message) = MOCK_LOGS[self.sequence % MOCK_LOGS.len()];
        self.sequence += 1;
        let mut event = LogEvent::synthetic(level, message);
        event.source = clawmon_core::log_event::SOURCE_GATEWAY.to_string();
        event
    }
}
