//! Owns every instance's adapter and follower and implements the switch protocol.
//!
//! The coordinator is driven from one task. Fetches run as spawned tasks and report back
//! through an internal channel; `next()` folds those completions and log events into the
//! dashboard view and hands out one notification at a time.

use clawmon_core::{GatewayStatus, HealthReport, Instance, LogEvent, LogLevel, UiConfig};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::adapter::StatusAdapter;
use crate::error::{GatewayError, UnknownInstance};
use crate::follower::{FollowState, LogFollower};
use crate::runner::CommandRunner;

const COMPLETION_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Connected,
    Unreachable(String),
    Failed(String),
}

impl ConnectionState {
    fn from_status(result: &Result<Arc<GatewayStatus>, GatewayError>) -> Option<Self> {
        match result {
            Ok(status) if status.is_reachable() => Some(ConnectionState::Connected),
            Ok(status) => Some(ConnectionState::Unreachable(
                status
                    .gateway_error()
                    .unwrap_or("gateway not reachable")
                    .to_string(),
            )),
            Err(GatewayError::Cancelled(_)) => None,
            Err(err) if err.is_connection() => Some(ConnectionState::Unreachable(err.to_string())),
            Err(err) => Some(ConnectionState::Failed(err.to_string())),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Unknown => f.write_str("unknown"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Unreachable(reason) => write!(f, "unreachable: {reason}"),
            ConnectionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// What changed, delivered to the rendering side. `instance` is the slot index.
#[derive(Debug, Clone)]
pub enum Notification {
    StatusFetched {
        instance: usize,
        result: Result<Arc<GatewayStatus>, GatewayError>,
    },
    HealthFetched {
        instance: usize,
        result: Result<Arc<HealthReport>, GatewayError>,
    },
    LogArrived {
        instance: usize,
        event: LogEvent,
    },
    ConnectionChanged {
        instance: usize,
        state: ConnectionState,
    },
    FollowEnded {
        instance: usize,
    },
}

/// Display state for the current instance. Cleared on every switch.
#[derive(Debug, Default)]
pub struct DashboardView {
    status: Option<Arc<GatewayStatus>>,
    status_error: Option<GatewayError>,
    health: Option<Arc<HealthReport>>,
    health_error: Option<GatewayError>,
    logs: VecDeque<LogEvent>,
    connection: ConnectionState,
}

impl DashboardView {
    pub fn status(&self) -> Option<&Arc<GatewayStatus>> {
        self.status.as_ref()
    }

    pub fn status_error(&self) -> Option<&GatewayError> {
        self.status_error.as_ref()
    }

    pub fn health(&self) -> Option<&Arc<HealthReport>> {
        self.health.as_ref()
    }

    pub fn health_error(&self) -> Option<&GatewayError> {
        self.health_error.as_ref()
    }

    pub fn logs(&self) -> &VecDeque<LogEvent> {
        &self.logs
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

enum Completion {
    Status {
        index: usize,
        epoch: u64,
        result: Result<Arc<GatewayStatus>, GatewayError>,
    },
    Health {
        index: usize,
        epoch: u64,
        result: Result<Arc<HealthReport>, GatewayError>,
    },
}

struct InstanceSlot {
    instance: Instance,
    adapter: Arc<StatusAdapter>,
    follower: LogFollower,
}

pub struct InstanceCoordinator {
    slots: Vec<InstanceSlot>,
    current: usize,
    active: bool,
    epoch: u64,
    view: DashboardView,
    log_capacity: usize,
    completions_tx: mpsc::Sender<Completion>,
    completions_rx: mpsc::Receiver<Completion>,
    pending: VecDeque<Notification>,
    root: CancellationToken,
    fetch_cancel: CancellationToken,
}

impl fmt::Debug for InstanceCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCoordinator")
            .field("instances", &self.slots.len())
            .field("current", &self.current)
            .field("active", &self.active)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl InstanceCoordinator {
    /// Builds one (adapter, follower) pair per instance. Nothing runs until `switch_to`.
    pub fn new(instances: Vec<Instance>, ui: &UiConfig) -> Self {
        let slots = instances
            .into_iter()
            .map(|instance| {
                let runner = Arc::new(
                    CommandRunner::for_instance(&instance).with_fetch_timeout(ui.fetch_timeout()),
                );
                InstanceSlot {
                    adapter: Arc::new(StatusAdapter::new(runner.clone())),
                    follower: LogFollower::new(runner, ui.follow_buffer),
                    instance,
                }
            })
            .collect();
        let (completions_tx, completions_rx) = mpsc::channel(COMPLETION_BUFFER);
        let root = CancellationToken::new();
        Self {
            slots,
            current: 0,
            active: false,
            epoch: 0,
            view: DashboardView::default(),
            log_capacity: ui.log_tail_lines.max(1),
            completions_tx,
            completions_rx,
            pending: VecDeque::new(),
            fetch_cancel: root.child_token(),
            root,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&Instance> {
        self.slots.get(self.current).map(|slot| &slot.instance)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.slots.iter().map(|slot| &slot.instance)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.instance.name.eq_ignore_ascii_case(name))
    }

    pub fn adapter(&self, index: usize) -> Option<&Arc<StatusAdapter>> {
        self.slots.get(index).map(|slot| &slot.adapter)
    }

    pub fn follow_state(&self, index: usize) -> Option<FollowState> {
        self.slots.get(index).map(|slot| slot.follower.state())
    }

    pub fn follow_session_id(&self, index: usize) -> Option<u64> {
        self.slots.get(index).and_then(|slot| slot.follower.session_id())
    }

    pub fn follow_pid(&self, index: usize) -> Option<u32> {
        self.slots.get(index).and_then(|slot| slot.follower.session_pid())
    }

    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    /// Makes `index` the current instance.
    ///
    /// Stops and awaits the current follow session, clears the view, issues status and health
    /// fetches, then starts a new follow session. Switching to the instance that is already
    /// streaming only re-issues the fetches.
    pub async fn switch_to(&mut self, index: usize) -> Result<(), UnknownInstance> {
        if index >= self.slots.len() {
            return Err(UnknownInstance {
                index,
                len: self.slots.len(),
            });
        }
        if self.active
            && index == self.current
            && self.slots[index].follower.state() == FollowState::Streaming
        {
            self.issue_status_fetch();
            self.issue_health_fetch();
            return Ok(());
        }

        let previous = self.current;
        self.slots[previous].follower.stop().await;
        self.fetch_cancel.cancel();

        self.view.clear();
        self.pending.clear();
        self.current = index;
        self.active = true;
        self.epoch += 1;
        self.fetch_cancel = self.root.child_token();

        self.issue_status_fetch();
        self.issue_health_fetch();

        let session = self.slots[index].follower.start().await;
        info!(
            event = "instance_switch",
            from = %self.slots[previous].instance.name,
            to = %self.slots[index].instance.name,
            epoch = self.epoch,
            session
        );
        Ok(())
    }

    pub async fn select_next(&mut self) -> Result<(), UnknownInstance> {
        if self.slots.is_empty() {
            return self.switch_to(0).await;
        }
        let next = (self.current + 1) % self.slots.len();
        self.switch_to(next).await
    }

    pub async fn select_previous(&mut self) -> Result<(), UnknownInstance> {
        if self.slots.is_empty() {
            return self.switch_to(0).await;
        }
        let previous = (self.current + self.slots.len() - 1) % self.slots.len();
        self.switch_to(previous).await
    }

    /// Scheduler entry point: fetch status for whichever instance is current now.
    pub fn request_refresh(&mut self) {
        if self.active {
            self.issue_status_fetch();
        }
    }

    /// Manual retry: restarts the follow session and re-issues both fetches.
    pub async fn reconnect(&mut self) {
        if !self.active {
            let current = self.current;
            let _ = self.switch_to(current).await;
            return;
        }
        info!(event = "instance_reconnect", instance = %self.slots[self.current].instance.name);
        self.issue_status_fetch();
        self.issue_health_fetch();
        self.slots[self.current].follower.start().await;
        self.push_log(LogEvent::synthetic(LogLevel::Info, "reconnecting"));
    }

    /// Waits for the next change affecting the current instance and applies it to the view.
    pub async fn next(&mut self) -> Notification {
        loop {
            if let Some(notification) = self.pending.pop_front() {
                return notification;
            }

            let step = {
                let completions = &mut self.completions_rx;
                let follower = match self.slots.get_mut(self.current) {
                    Some(slot) if self.active => Some(&mut slot.follower),
                    _ => None,
                };
                tokio::select! {
                    completion = completions.recv() => Step::Completion(completion),
                    event = next_log(follower) => Step::Log(event),
                }
            };

            match step {
                Step::Completion(Some(completion)) => self.apply(completion),
                Step::Completion(None) => {}
                Step::Log(Some(event)) => {
                    self.push_log(event);
                }
                Step::Log(None) => {
                    self.pending.push_back(Notification::FollowEnded {
                        instance: self.current,
                    });
                }
            }
        }
    }

    /// Stops every follow session and cancels outstanding fetches.
    pub async fn shutdown(&mut self) {
        self.root.cancel();
        for slot in &mut self.slots {
            slot.follower.stop().await;
        }
        self.active = false;
        info!(event = "coordinator_shutdown", instances = self.slots.len());
    }

    fn issue_status_fetch(&self) {
        let Some(slot) = self.slots.get(self.current) else {
            return;
        };
        let adapter = slot.adapter.clone();
        let cancel = self.fetch_cancel.clone();
        let tx = self.completions_tx.clone();
        let (index, epoch) = (self.current, self.epoch);
        debug!(event = "status_fetch_issued", instance = %slot.instance.name, epoch);
        tokio::spawn(async move {
            let result = adapter.fetch_status(&cancel).await;
            let _ = tx.send(Completion::Status { index, epoch, result }).await;
        });
    }

    fn issue_health_fetch(&self) {
        let Some(slot) = self.slots.get(self.current) else {
            return;
        };
        let adapter = slot.adapter.clone();
        let cancel = self.fetch_cancel.clone();
        let tx = self.completions_tx.clone();
        let (index, epoch) = (self.current, self.epoch);
        debug!(event = "health_fetch_issued", instance = %slot.instance.name, epoch);
        tokio::spawn(async move {
            let result = adapter.fetch_health(&cancel).await;
            let _ = tx.send(Completion::Health { index, epoch, result }).await;
        });
    }

    fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Status { index, epoch, result } => {
                if !self.is_live(index, epoch) || is_cancelled(&result) {
                    return;
                }
                match &result {
                    Ok(status) => {
                        self.view.status = Some(status.clone());
                        self.view.status_error = None;
                    }
                    Err(err) => self.view.status_error = Some(err.clone()),
                }
                let state = ConnectionState::from_status(&result);
                self.pending.push_back(Notification::StatusFetched {
                    instance: index,
                    result,
                });
                if let Some(state) = state.filter(|state| *state != self.view.connection) {
                    info!(
                        event = "connection_changed",
                        instance = %self.slots[index].instance.name,
                        state = %state
                    );
                    self.view.connection = state.clone();
                    self.pending.push_back(Notification::ConnectionChanged {
                        instance: index,
                        state,
                    });
                }
            }
            Completion::Health { index, epoch, result } => {
                if !self.is_live(index, epoch) || is_cancelled(&result) {
                    return;
                }
                match &result {
                    Ok(report) => {
                        self.view.health = Some(report.clone());
                        self.view.health_error = None;
                    }
                    Err(err) => self.view.health_error = Some(err.clone()),
                }
                self.pending.push_back(Notification::HealthFetched {
                    instance: index,
                    result,
                });
            }
        }
    }

    fn is_live(&self, index: usize, epoch: u64) -> bool {
        if index == self.current && epoch == self.epoch {
            return true;
        }
        debug!(event = "stale_completion_dropped", index, epoch, current_epoch = self.epoch);
        false
    }

    fn push_log(&mut self, event: LogEvent) {
        while self.view.logs.len() >= self.log_capacity {
            self.view.logs.pop_front();
        }
        self.view.logs.push_back(event.clone());
        self.pending.push_back(Notification::LogArrived {
            instance: self.current,
            event,
        });
    }
}

impl Drop for InstanceCoordinator {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

enum Step {
    Completion(Option<Completion>),
    Log(Option<LogEvent>),
}

async fn next_log(follower: Option<&mut LogFollower>) -> Option<LogEvent> {
    match follower {
        Some(follower) => follower.next_event().await,
        None => std::future::pending().await,
    }
}

fn is_cancelled<T>(result: &Result<T, GatewayError>) -> bool {
    matches!(result, Err(GatewayError::Cancelled(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawmon_core::status::GatewayInfo;

    #[test]
    fn connection_state_follows_status_outcome() {
        let reachable = GatewayStatus {
            gateway: Some(GatewayInfo {
                reachable: true,
                ..GatewayInfo::default()
            }),
            ..GatewayStatus::default()
        };
        assert_eq!(
            ConnectionState::from_status(&Ok(Arc::new(reachable))),
            Some(ConnectionState::Connected)
        );
        assert_eq!(
            ConnectionState::from_status(&Ok(Arc::new(GatewayStatus::default()))),
            Some(ConnectionState::Unreachable("gateway not reachable".to_string()))
        );

        let refused = GatewayError::Connection {
            host: "ops@gw".to_string(),
            message: "Connection refused".to_string(),
        };
        assert!(matches!(
            ConnectionState::from_status(&Err(refused)),
            Some(ConnectionState::Unreachable(_))
        ));
        assert_eq!(
            ConnectionState::from_status(&Err(GatewayError::Cancelled("status".to_string()))),
            None
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn switching_out_of_range_is_rejected() {
        let mut coordinator =
            InstanceCoordinator::new(vec![Instance::local("a")], &UiConfig::default());
        let err = coordinator.switch_to(3).await.expect_err("out of range");
        assert_eq!(err, UnknownInstance { index: 3, len: 1 });
        assert_eq!(coordinator.current_index(), 0);
        assert_eq!(coordinator.follow_state(0), Some(FollowState::Idle));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn log_buffer_is_bounded() {
        let ui = UiConfig {
            log_tail_lines: 2,
            ..UiConfig::default()
        };
        let mut coordinator = InstanceCoordinator::new(vec![Instance::local("a")], &ui);
        for n in 0..5 {
            coordinator.push_log(LogEvent::synthetic(LogLevel::Info, format!("line {n}")));
        }
        let messages: Vec<_> = coordinator
            .view()
            .logs()
            .iter()
            .map(|event| event.message.as_str())
            .collect();
        assert_eq!(messages, vec!["line 3", "line 4"]);
        assert_eq!(coordinator.pending.len(), 5);
    }
}
