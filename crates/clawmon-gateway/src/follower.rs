//! Long-running `logs --follow` sessions.
//!
//! A session owns one subprocess, two line readers (stdout and stderr) and a supervisor that
//! reaps the child. Everything funnels into one bounded channel. A full channel blocks the
//! readers until the consumer drains it or the session is cancelled.

use chrono::Utc;
use clawmon_core::{parse_log_line, LogEvent, LogLevel};
use std::fmt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::runner::{CommandRunner, ProcessGroup};

pub const FOLLOW_ARGS: &[&str] = &["logs", "--follow"];
pub const DEFAULT_FOLLOW_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

impl FollowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowState::Idle => "idle",
            FollowState::Starting => "starting",
            FollowState::Streaming => "streaming",
            FollowState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for FollowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Handle to one follow subprocess. The raw channel and child are never exposed; dropping the
/// handle cancels the session.
pub struct FollowSession {
    id: u64,
    instance: String,
    events: mpsc::Receiver<LogEvent>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
    pid: Option<u32>,
}

impl fmt::Debug for FollowSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FollowSession")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("pid", &self.pid)
            .field("running", &self.is_running())
            .finish()
    }
}

impl FollowSession {
    /// Spawns the follow command. Launch failures do not error: the session delivers a single
    /// warning event and then ends.
    pub fn launch(runner: &CommandRunner, id: u64, capacity: usize) -> Self {
        let (tx, events) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(false));
        let instance = runner.instance_name().to_string();
        let description = runner.describe(FOLLOW_ARGS);

        let mut child = match runner.command(FOLLOW_ARGS).spawn() {
            Ok(child) => child,
            Err(err) => {
                let reason = runner.launch_error(description, err).to_string();
                let failure = GatewayError::FollowUnavailable(reason);
                warn!(event = "follow_unavailable", instance = %instance, session = id, error = %failure);
                // Capacity is at least one and nothing else has sent yet.
                let _ = tx.try_send(LogEvent::synthetic(LogLevel::Warn, failure.to_string()));
                return Self {
                    id,
                    instance,
                    events,
                    cancel,
                    running,
                    supervisor: None,
                    pid: None,
                };
            }
        };

        let pid = child.id();
        let group = ProcessGroup::of(&child);
        running.store(true, Ordering::SeqCst);
        info!(event = "follow_start", instance = %instance, session = id, pid = ?pid);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_lines(
                stdout,
                Stream::Stdout,
                tx.clone(),
                cancel.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_lines(
                stderr,
                Stream::Stderr,
                tx.clone(),
                cancel.clone(),
            )));
        }

        let supervisor = tokio::spawn(supervise(
            child,
            group,
            readers,
            tx,
            cancel.clone(),
            running.clone(),
            SessionLabel {
                instance: instance.clone(),
                id,
                remote: runner.is_remote(),
            },
        ));

        Self {
            id,
            instance,
            events,
            cancel,
            running,
            supervisor: Some(supervisor),
            pid,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True while the subprocess is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Next event in arrival order. `None` once the stream has ended and been drained.
    pub async fn recv(&mut self) -> Option<LogEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LogEvent> {
        self.events.try_recv().ok()
    }

    /// Cancels the session, kills the subprocess and waits until it has been reaped and both
    /// readers have exited. Buffered events are discarded.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        self.events.close();
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(err) = supervisor.await {
                warn!(event = "follow_supervisor_failed", instance = %self.instance, session = self.id, error = %err);
            }
        }
        info!(event = "follow_stop", instance = %self.instance, session = self.id);
    }
}

impl Drop for FollowSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionLabel {
    instance: String,
    id: u64,
    remote: bool,
}

async fn supervise(
    mut child: Child,
    group: ProcessGroup,
    readers: Vec<JoinHandle<()>>,
    tx: mpsc::Sender<LogEvent>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    label: SessionLabel,
) {
    let exit = tokio::select! {
        _ = cancel.cancelled() => {
            group.kill();
            if let Err(err) = child.start_kill() {
                debug!(event = "follow_kill_failed", instance = %label.instance, session = label.id, error = %err);
            }
            let _ = child.wait().await;
            None
        }
        status = child.wait() => Some(status),
    };
    running.store(false, Ordering::SeqCst);
    // Leftovers of a command that exited on its own would keep the pipes open.
    group.kill();

    for reader in readers {
        let _ = reader.await;
    }

    let Some(status) = exit else {
        return;
    };
    let notice = ended_notice(status, label.remote);
    warn!(event = "follow_ended", instance = %label.instance, session = label.id, reason = %notice);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = tx.send(LogEvent::synthetic(LogLevel::Warn, notice)) => {}
    }
}

fn ended_notice(status: std::io::Result<ExitStatus>, remote: bool) -> String {
    match status {
        Ok(status) if remote && status.code() == Some(255) => {
            GatewayError::FollowUnavailable("ssh connection failed (exit 255)".to_string())
                .to_string()
        }
        Ok(status) => match status.code() {
            Some(code) => format!("log stream ended (exit {code})"),
            None => "log stream ended (terminated by signal)".to_string(),
        },
        Err(err) => format!("log stream ended: {err}"),
    }
}

async fn pump_lines<R>(
    stream: R,
    kind: Stream,
    tx: mpsc::Sender<LogEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(event = "follow_read_failed", stream = kind.as_str(), error = %err);
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        let event = match kind {
            Stream::Stdout => parse_log_line(line),
            Stream::Stderr => LogEvent::from_stderr(line, Utc::now()),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

/// Per-instance follow driver. Holds at most one session; starting a new one first stops
/// and awaits the previous one.
#[derive(Debug)]
pub struct LogFollower {
    runner: Arc<CommandRunner>,
    capacity: usize,
    session: Option<FollowSession>,
    state: FollowState,
    next_id: u64,
}

impl LogFollower {
    pub fn new(runner: Arc<CommandRunner>, capacity: usize) -> Self {
        Self {
            runner,
            capacity: capacity.max(1),
            session: None,
            state: FollowState::Idle,
            next_id: 1,
        }
    }

    pub fn state(&self) -> FollowState {
        match (self.state, &self.session) {
            (FollowState::Streaming, Some(session)) if session.is_running() => {
                FollowState::Streaming
            }
            (FollowState::Streaming, _) => FollowState::Idle,
            (state, _) => state,
        }
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(FollowSession::id)
    }

    pub fn session_pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(FollowSession::pid)
    }

    /// Starts a fresh session and returns its id.
    pub async fn start(&mut self) -> u64 {
        self.stop().await;
        self.state = FollowState::Starting;
        let id = self.next_id;
        self.next_id += 1;
        let session = FollowSession::launch(&self.runner, id, self.capacity);
        self.state = if session.is_running() {
            FollowState::Streaming
        } else {
            FollowState::Idle
        };
        self.session = Some(session);
        id
    }

    pub async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            self.state = FollowState::Stopping;
            session.stop().await;
        }
        self.state = FollowState::Idle;
    }

    /// Next event of the active session. Returns `None` once when that session ends and
    /// pends forever while no session is active, so it can sit in a `select!`.
    ///
    /// The only await point is the receive, so dropping this future never leaves the
    /// follower half-stopped.
    pub async fn next_event(&mut self) -> Option<LogEvent> {
        let Some(session) = self.session.as_mut() else {
            return std::future::pending().await;
        };
        let event = session.recv().await;
        if event.is_none() {
            self.retire_ended_session();
        }
        event
    }

    /// Detaches a session whose stream is closed. Its subprocess has already been reaped, so
    /// the remaining cleanup runs in the background.
    fn retire_ended_session(&mut self) {
        self.state = FollowState::Idle;
        if let Some(session) = self.session.take() {
            debug!(event = "follow_retired", instance = %session.instance(), session = session.id());
            tokio::spawn(session.stop());
        }
    }
}
