use clawmon_core::{Instance, LogLevel, RemoteTarget, UiConfig};
use clawmon_gateway::{
    CommandRunner, ConnectionState, FailureKind, FollowSession, FollowState, InstanceCoordinator,
    LogFollower, Notification, StatusAdapter, StatusOutcome,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const REACHABLE_STATUS: &str = r#"{"gateway":{"mode":"local","reachable":true,"self":{"host":"gw","version":"2026.2.1"}},"sessions":{"count":2}}"#;
const HEALTH: &str = r#"{"overall":"ok","channels":[{"id":"wa","label":"WhatsApp","status":"ok","connected":true}]}"#;

/// A stand-in for the gateway CLI. Every invocation is appended to `calls.log`. Marker files
/// in the directory change its behavior:
/// `status-broken` and `health-broken` print non-JSON, `status-slow` delays status by a second,
/// and `follow-forks` makes `logs` start a background `sleep` and record its pid.
struct FakeGateway {
    dir: tempfile::TempDir,
    label: String,
}

impl FakeGateway {
    fn new(label: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().display().to_string();
        fs::write(dir.path().join("status.json"), REACHABLE_STATUS).expect("write status");
        fs::write(dir.path().join("health.json"), HEALTH).expect("write health");
        let script = format!(
            r#"#!/bin/sh
echo "$*" >> '{root}/calls.log'
case "$1" in
  status)
    if [ -f '{root}/status-slow' ]; then sleep 1; fi
    if [ -f '{root}/status-broken' ]; then echo "Gateway not running"; exit 0; fi
    cat '{root}/status.json'
    ;;
  health)
    if [ -f '{root}/health-broken' ]; then echo "health probe crashed"; exit 0; fi
    cat '{root}/health.json'
    ;;
  logs)
    if [ -f '{root}/follow-forks' ]; then
      sleep 300 &
      echo $! > '{root}/grandchild.pid'
      echo "[INFO] {label} forked"
      wait
      exit 0
    fi
    echo '{{"level":"info","msg":"{label} ready","time":"2026-01-01T00:00:00Z"}}'
    echo "{label} stderr notice" >&2
    i=0
    while true; do
      i=$((i+1))
      echo "[WARN] {label} tick $i"
      sleep 0.05
    done
    ;;
  *)
    echo "unknown command: $1" >&2
    exit 2
    ;;
esac
"#
        );
        let path = dir.path().join("openclaw");
        fs::write(&path, script).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        Self {
            dir,
            label: label.to_string(),
        }
    }

    fn binary(&self) -> String {
        self.dir.path().join("openclaw").display().to_string()
    }

    fn instance(&self) -> Instance {
        Instance::local(self.label.clone()).with_command_path(self.binary())
    }

    fn runner(&self) -> Arc<CommandRunner> {
        Arc::new(CommandRunner::for_instance(&self.instance()))
    }

    fn mark(&self, marker: &str) {
        fs::write(self.dir.path().join(marker), "").expect("marker");
    }

    fn break_command(&self, command: &str) {
        self.mark(&format!("{command}-broken"));
    }

    fn grandchild_pid(&self) -> u32 {
        fs::read_to_string(self.dir.path().join("grandchild.pid"))
            .expect("pid file")
            .trim()
            .parse()
            .expect("pid")
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn count_calls(&self, call: &str) -> usize {
        self.calls().iter().filter(|line| line.as_str() == call).count()
    }
}

/// Zombies count as gone: an orphan killed by us may wait a while for init to reap it.
fn process_alive(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state != 'Z')
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

async fn next_within(coordinator: &mut InstanceCoordinator) -> Notification {
    tokio::time::timeout(Duration::from_secs(5), coordinator.next())
        .await
        .expect("notification within 5s")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_returns_trimmed_stdout_and_classifies_exit_codes() {
    let gateway = FakeGateway::new("alpha");
    let runner = gateway.runner();
    let cancel = CancellationToken::new();

    let output = runner.run(&["status", "--json"], &cancel).await.expect("status");
    assert_eq!(output, REACHABLE_STATUS);

    let err = runner.run(&["bogus"], &cancel).await.expect_err("bad command");
    assert_eq!(err.kind(), FailureKind::Execution);
    assert!(err.to_string().contains("unknown command: bogus"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_fetch_keeps_last_good_snapshot() {
    let gateway = FakeGateway::new("alpha");
    let adapter = StatusAdapter::new(gateway.runner());
    let cancel = CancellationToken::new();

    let status = adapter.fetch_status(&cancel).await.expect("first fetch");
    assert!(status.is_reachable());
    assert!(matches!(adapter.latest_status_outcome(), StatusOutcome::Fresh(_)));
    assert!(adapter.status_age().is_some());

    gateway.break_command("status");
    let err = adapter.fetch_status(&cancel).await.expect_err("decode failure");
    assert_eq!(err.kind(), FailureKind::Decode);
    assert_eq!(err.raw_output(), Some("Gateway not running"));

    let cached = adapter.cached_status().expect("snapshot retained");
    assert_eq!(cached.as_ref(), status.as_ref());
    assert!(adapter.is_reachable());
    assert_eq!(adapter.cached_error(), Some(err.clone()));
    assert_eq!(adapter.latest_status_outcome(), StatusOutcome::Failed(err));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn partial_status_json_is_a_decode_failure() {
    let gateway = FakeGateway::new("alpha");
    fs::write(
        gateway.dir.path().join("status.json"),
        r#"{"gateway": {"reachable": "#,
    )
    .expect("truncate status");
    let adapter = StatusAdapter::new(gateway.runner());
    let err = adapter
        .fetch_status(&CancellationToken::new())
        .await
        .expect_err("partial json");
    assert_eq!(err.kind(), FailureKind::Decode);
    assert!(adapter.cached_status().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_decode_failure_keeps_raw_text_for_display() {
    let gateway = FakeGateway::new("alpha");
    let adapter = StatusAdapter::new(gateway.runner());
    let cancel = CancellationToken::new();

    let report = adapter.fetch_health(&cancel).await.expect("health");
    assert_eq!(report.overall.as_str(), "ok");

    gateway.break_command("health");
    let err = adapter.fetch_health(&cancel).await.expect_err("decode");
    assert_eq!(err.kind(), FailureKind::Decode);
    assert_eq!(adapter.cached_health_raw().as_deref(), Some("health probe crashed"));
    assert_eq!(adapter.cached_health(), Some(report));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_merges_both_streams() {
    let gateway = FakeGateway::new("alpha");
    let runner = gateway.runner();
    let mut session = FollowSession::launch(&runner, 1, 8);
    assert!(session.is_running());

    let mut saw_json = false;
    let mut saw_stderr = false;
    let mut saw_bracket = false;
    for _ in 0..20 {
        let event = tokio::time::timeout(Duration::from_secs(5), session.recv())
            .await
            .expect("event in time")
            .expect("stream open");
        match event.source.as_str() {
            "openclaw-cli" => {
                assert_eq!(event.level, LogLevel::Error);
                assert_eq!(event.message, "alpha stderr notice");
                saw_stderr = true;
            }
            _ if event.message == "alpha ready" => {
                assert_eq!(event.level, LogLevel::Info);
                assert_eq!(event.timestamp.to_rfc3339(), "2026-01-01T00:00:00+00:00");
                saw_json = true;
            }
            _ => {
                assert_eq!(event.level, LogLevel::Warn);
                assert!(event.message.starts_with("alpha tick "));
                saw_bracket = true;
            }
        }
        if saw_json && saw_stderr && saw_bracket {
            break;
        }
    }
    assert!(saw_json && saw_stderr && saw_bracket);
    session.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_kills_the_subprocess_even_when_the_channel_is_full() {
    let gateway = FakeGateway::new("alpha");
    let runner = gateway.runner();
    let session = FollowSession::launch(&runner, 1, 1);
    let pid = session.pid().expect("pid");

    // Let the readers fill the one-slot buffer and block on send.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(session.is_running());

    tokio::time::timeout(Duration::from_secs(5), session.stop())
        .await
        .expect("stop does not need draining");
    assert!(!process_alive(pid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_also_kills_processes_the_command_started() {
    let gateway = FakeGateway::new("alpha");
    gateway.mark("follow-forks");
    let mut session = FollowSession::launch(&gateway.runner(), 1, 8);
    let pid = session.pid().expect("pid");

    let first = tokio::time::timeout(Duration::from_secs(5), session.recv())
        .await
        .expect("event in time")
        .expect("stream open");
    assert_eq!(first.message, "alpha forked");
    let grandchild = gateway.grandchild_pid();
    assert!(process_alive(grandchild));

    tokio::time::timeout(Duration::from_secs(5), session.stop())
        .await
        .expect("stop in time");
    assert!(!process_alive(pid));
    assert!(
        wait_until(|| !process_alive(grandchild)).await,
        "background process {grandchild} outlived its session"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switching_away_leaves_no_background_processes_behind() {
    let alpha = FakeGateway::new("alpha");
    alpha.mark("follow-forks");
    let beta = FakeGateway::new("beta");
    let mut coordinator =
        InstanceCoordinator::new(vec![alpha.instance(), beta.instance()], &UiConfig::default());

    coordinator.switch_to(0).await.expect("switch to alpha");
    loop {
        if let Notification::LogArrived { event, .. } = next_within(&mut coordinator).await {
            if event.message == "alpha forked" {
                break;
            }
        }
    }
    let grandchild = alpha.grandchild_pid();
    assert!(process_alive(grandchild));

    coordinator.switch_to(1).await.expect("switch to beta");
    assert!(wait_until(|| !process_alive(grandchild)).await);
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopped_follower_delivers_nothing_further() {
    let gateway = FakeGateway::new("alpha");
    let mut follower = LogFollower::new(gateway.runner(), 16);
    follower.start().await;
    assert_eq!(follower.state(), FollowState::Streaming);
    let pid = follower.session_pid().expect("pid");

    let first = tokio::time::timeout(Duration::from_secs(5), follower.next_event())
        .await
        .expect("event in time");
    assert!(first.is_some());

    follower.stop().await;
    assert_eq!(follower.state(), FollowState::Idle);
    assert!(!process_alive(pid));
    let after = tokio::time::timeout(Duration::from_millis(300), follower.next_event()).await;
    assert!(after.is_err(), "no events after stop");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restarting_replaces_the_previous_session() {
    let gateway = FakeGateway::new("alpha");
    let mut follower = LogFollower::new(gateway.runner(), 16);
    let first = follower.start().await;
    let first_pid = follower.session_pid().expect("pid");
    let second = follower.start().await;
    assert_ne!(first, second);
    assert!(!process_alive(first_pid));
    assert!(process_alive(follower.session_pid().expect("pid")));
    follower.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switching_twice_to_the_same_instance_keeps_one_session() {
    let gateway = FakeGateway::new("alpha");
    let mut coordinator = InstanceCoordinator::new(vec![gateway.instance()], &UiConfig::default());

    coordinator.switch_to(0).await.expect("switch");
    let session = coordinator.follow_session_id(0);
    let pid = coordinator.follow_pid(0).expect("pid");
    coordinator.switch_to(0).await.expect("switch again");

    assert_eq!(coordinator.follow_session_id(0), session);
    assert_eq!(coordinator.follow_pid(0), Some(pid));
    assert!(wait_until(|| gateway.count_calls("status --json") == 2).await);
    assert!(wait_until(|| gateway.count_calls("logs --follow") == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.count_calls("logs --follow"), 1);

    coordinator.shutdown().await;
    assert!(!process_alive(pid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switching_instances_cancels_the_old_session_and_clears_the_view() {
    let alpha = FakeGateway::new("alpha");
    let beta = FakeGateway::new("beta");
    let ui = UiConfig {
        log_tail_lines: 50,
        ..UiConfig::default()
    };
    let mut coordinator = InstanceCoordinator::new(vec![alpha.instance(), beta.instance()], &ui);

    coordinator.switch_to(0).await.expect("switch to alpha");
    let alpha_pid = coordinator.follow_pid(0).expect("alpha pid");
    let mut have_status = false;
    let mut have_logs = false;
    while !(have_status && have_logs) {
        match next_within(&mut coordinator).await {
            Notification::StatusFetched { instance, result } => {
                assert_eq!(instance, 0);
                assert!(result.expect("status").is_reachable());
                have_status = true;
            }
            Notification::LogArrived { instance, .. } => {
                assert_eq!(instance, 0);
                have_logs = true;
            }
            _ => {}
        }
    }
    assert_eq!(coordinator.view().connection(), &ConnectionState::Connected);
    assert!(!coordinator.view().logs().is_empty());

    coordinator.switch_to(1).await.expect("switch to beta");
    assert!(!process_alive(alpha_pid));
    assert_eq!(coordinator.follow_state(0), Some(FollowState::Idle));
    assert!(coordinator.view().logs().is_empty());
    assert!(coordinator.view().status().is_none());
    assert_eq!(coordinator.view().connection(), &ConnectionState::Unknown);

    let mut first_log_seen = false;
    let mut beta_status = false;
    while !(first_log_seen && beta_status) {
        match next_within(&mut coordinator).await {
            Notification::LogArrived { instance, event } => {
                assert_eq!(instance, 1);
                assert!(event.message.contains("beta"), "got {}", event.message);
                if !first_log_seen {
                    assert_eq!(coordinator.view().logs().len(), 1);
                    first_log_seen = true;
                }
            }
            Notification::StatusFetched { instance, .. } => {
                assert_eq!(instance, 1);
                beta_status = true;
            }
            Notification::HealthFetched { instance, .. }
            | Notification::ConnectionChanged { instance, .. }
            | Notification::FollowEnded { instance } => assert_eq!(instance, 1),
        }
    }
    assert!(beta.count_calls("status --json") >= 1);
    assert_eq!(alpha.count_calls("logs --follow"), 1);

    coordinator.shutdown().await;
    assert_eq!(coordinator.follow_state(1), Some(FollowState::Idle));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_restarts_the_session_and_refetches_both_snapshots() {
    let gateway = FakeGateway::new("alpha");
    let mut coordinator = InstanceCoordinator::new(vec![gateway.instance()], &UiConfig::default());

    coordinator.switch_to(0).await.expect("switch");
    let first_session = coordinator.follow_session_id(0).expect("session");
    let first_pid = coordinator.follow_pid(0).expect("pid");
    assert!(
        wait_until(|| {
            gateway.count_calls("status --json") == 1
                && gateway.count_calls("health --json") == 1
                && gateway.count_calls("logs --follow") == 1
        })
        .await
    );

    coordinator.reconnect().await;
    assert!(!process_alive(first_pid));
    let second_session = coordinator.follow_session_id(0).expect("new session");
    assert_ne!(second_session, first_session);
    assert_eq!(coordinator.follow_state(0), Some(FollowState::Streaming));
    let second_pid = coordinator.follow_pid(0).expect("new pid");
    assert_ne!(second_pid, first_pid);
    assert!(process_alive(second_pid));

    match next_within(&mut coordinator).await {
        Notification::LogArrived { instance, event } => {
            assert_eq!(instance, 0);
            assert_eq!(event.message, "reconnecting");
        }
        other => panic!("expected the reconnect notice first, got {other:?}"),
    }
    assert!(
        wait_until(|| {
            gateway.count_calls("status --json") == 2
                && gateway.count_calls("health --json") == 2
                && gateway.count_calls("logs --follow") == 2
        })
        .await
    );

    let mut statuses = 0;
    let mut healths = 0;
    while statuses < 2 || healths < 2 {
        match next_within(&mut coordinator).await {
            Notification::StatusFetched { instance, result } => {
                assert_eq!(instance, 0);
                assert!(result.is_ok());
                statuses += 1;
            }
            Notification::HealthFetched { instance, result } => {
                assert_eq!(instance, 0);
                assert!(result.is_ok());
                healths += 1;
            }
            Notification::FollowEnded { .. } => panic!("restarted stream must stay open"),
            _ => {}
        }
    }

    coordinator.shutdown().await;
    assert!(!process_alive(second_pid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_after_a_switch_targets_only_the_new_instance() {
    let alpha = FakeGateway::new("alpha");
    alpha.mark("status-slow");
    let beta = FakeGateway::new("beta");
    let mut coordinator =
        InstanceCoordinator::new(vec![alpha.instance(), beta.instance()], &UiConfig::default());

    coordinator.switch_to(0).await.expect("switch to alpha");
    // Alpha's status fetch is now sleeping inside the fake CLI.
    assert!(wait_until(|| alpha.count_calls("status --json") == 1).await);

    coordinator.switch_to(1).await.expect("switch to beta");
    coordinator.request_refresh();

    // Long enough for alpha's delayed answer to have landed had it not been dropped.
    let deadline = Instant::now() + Duration::from_millis(1500);
    let mut beta_statuses = 0;
    while let Ok(notification) = tokio::time::timeout_at(deadline, coordinator.next()).await {
        match notification {
            Notification::StatusFetched { instance, result } => {
                assert_eq!(instance, 1);
                assert!(result.expect("beta status").is_reachable());
                beta_statuses += 1;
            }
            Notification::HealthFetched { instance, .. }
            | Notification::LogArrived { instance, .. }
            | Notification::ConnectionChanged { instance, .. }
            | Notification::FollowEnded { instance } => assert_eq!(instance, 1),
        }
    }

    assert_eq!(beta_statuses, 2);
    assert_eq!(beta.count_calls("status --json"), 2);
    assert_eq!(alpha.count_calls("status --json"), 1);
    assert!(coordinator.view().status().is_some());
    assert_eq!(coordinator.view().connection(), &ConnectionState::Connected);

    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_cli_degrades_to_a_warning_event() {
    let instance = Instance::local("ghost").with_command_path("/nonexistent/clawmon-test/openclaw");
    let mut coordinator = InstanceCoordinator::new(vec![instance], &UiConfig::default());
    coordinator.switch_to(0).await.expect("switch");

    let mut warned = false;
    let mut failed = false;
    while !(warned && failed) {
        match next_within(&mut coordinator).await {
            Notification::LogArrived { event, .. } => {
                assert_eq!(event.level, LogLevel::Warn);
                warned = true;
            }
            Notification::ConnectionChanged { state, .. } => {
                assert!(matches!(state, ConnectionState::Failed(_)));
                failed = true;
            }
            _ => {}
        }
    }
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore = "needs ssh and a network that drops packets to 10.255.255.1"]
async fn unreachable_host_fails_within_connect_timeout() {
    let mut target = RemoteTarget::new("10.255.255.1");
    target.connect_timeout = Duration::from_secs(1);
    let runner = CommandRunner::for_instance(&Instance::remote("void", target));
    let started = std::time::Instant::now();
    let err = runner
        .run(&["status", "--json"], &CancellationToken::new())
        .await
        .expect_err("unreachable");
    assert_eq!(err.kind(), FailureKind::Connection);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn fake_gateway_script_is_executable() {
    let gateway = FakeGateway::new("alpha");
    let mode = fs::metadata(Path::new(&gateway.binary()))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o111, 0o111);
}
