use clawmon_core::{ExecutionMode, Instance, RemoteTarget};
use std::borrow::Cow;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::GatewayError;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// ssh reserves this exit status for its own failures (unreachable host, rejected auth).
const SSH_FAILURE_STATUS: i32 = 255;
/// ssh keepalive: a message every 15s, give up after 3 unanswered.
const SSH_ALIVE_INTERVAL_SECS: u64 = 15;
const SSH_ALIVE_COUNT_MAX: u32 = 3;

/// Runs gateway CLI commands for one instance, locally or through ssh.
///
/// Remote commands are wrapped in `bash -lc` so the remote user's login PATH applies, and
/// every argument is quoted on its own before the whole line is quoted again for ssh.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    instance: String,
    binary: String,
    remote: Option<RemoteTarget>,
    fetch_timeout: Duration,
}

impl CommandRunner {
    pub fn for_instance(instance: &Instance) -> Self {
        let remote = match &instance.mode {
            ExecutionMode::Local => None,
            ExecutionMode::Remote(target) => Some(target.clone()),
        };
        Self {
            instance: instance.name.clone(),
            binary: instance.binary().to_string(),
            remote,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn instance_name(&self) -> &str {
        &self.instance
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Human-readable command line for logs and error messages.
    pub fn describe(&self, args: &[&str]) -> String {
        let mut parts = vec![self.binary.clone()];
        parts.extend(args.iter().map(|arg| arg.to_string()));
        let line = parts.join(" ");
        match &self.remote {
            Some(target) => format!("{line} (via {})", target.destination()),
            None => line,
        }
    }

    /// Per-call deadline for one-shot commands. Remote calls also get the connect budget.
    pub fn deadline(&self) -> Duration {
        match &self.remote {
            Some(target) => self.fetch_timeout + target.connect_timeout,
            None => self.fetch_timeout,
        }
    }

    /// Options and destination passed to `ssh`, without the remote command.
    ///
    /// Killing the local ssh client does not signal the remote command: without a tty the
    /// remote `logs --follow` lingers until its next write fails. Keepalives at least make a
    /// dead link end the local session instead of hanging.
    pub fn ssh_args(&self) -> Vec<String> {
        let Some(target) = &self.remote else {
            return Vec::new();
        };
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", target.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            format!("ServerAliveInterval={SSH_ALIVE_INTERVAL_SECS}"),
            "-o".to_string(),
            format!("ServerAliveCountMax={SSH_ALIVE_COUNT_MAX}"),
        ];
        if let Some(port) = target.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &target.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        if let Some(jump) = &target.proxy_jump {
            args.push("-J".to_string());
            args.push(jump.clone());
        }
        args.push(target.destination());
        args
    }

    /// The single shell word handed to ssh: `bash -lc '<binary> <args...>'`.
    pub fn remote_command_line(&self, args: &[&str]) -> String {
        let mut inner = quote_program(&self.binary);
        for arg in args {
            inner.push(' ');
            inner.push_str(&quote_arg(arg));
        }
        format!("bash -lc {}", force_quote(&inner))
    }

    /// A configured but unspawned process. Output pipes are captured, the child leads its own
    /// process group and it is killed when its handle is dropped.
    pub fn command(&self, args: &[&str]) -> Command {
        let mut command = match &self.remote {
            Some(_) => {
                let mut command = Command::new("ssh");
                command
                    .args(self.ssh_args())
                    .arg(self.remote_command_line(args));
                command
            }
            None => {
                let mut command = Command::new(&self.binary);
                command.args(args);
                command
            }
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// Runs a one-shot command and returns its trimmed stdout. No retries.
    pub async fn run(
        &self,
        args: &[&str],
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let description = self.describe(args);
        debug!(
            event = "command_spawn",
            instance = %self.instance,
            command = %description,
            remote = self.is_remote()
        );

        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled(description));
        }
        let deadline = self.deadline();
        let child = match self.command(args).spawn() {
            Ok(child) => child,
            Err(err) => return Err(self.launch_error(description, err)),
        };
        let group = ProcessGroup::of(&child);
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                group.kill();
                return Err(GatewayError::Cancelled(description));
            }
            result = tokio::time::timeout(deadline, child.wait_with_output()) => match result {
                Err(_) => {
                    group.kill();
                    warn!(event = "command_timeout", instance = %self.instance, command = %description);
                    return Err(GatewayError::TimedOut {
                        command: description,
                        after: deadline,
                    });
                }
                Ok(Err(err)) => {
                    group.kill();
                    return Err(GatewayError::Execution {
                        command: description,
                        message: format!("failed to collect output: {err}"),
                        exit_code: None,
                    });
                }
                Ok(Ok(output)) => output,
            }
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(self.exit_error(description, output.status.code(), stderr))
    }

    pub(crate) fn launch_error(&self, command: String, err: io::Error) -> GatewayError {
        let program = if self.is_remote() { "ssh" } else { self.binary.as_str() };
        let message = if err.kind() == io::ErrorKind::NotFound {
            format!("{program} not found")
        } else {
            format!("failed to launch {program}: {err}")
        };
        GatewayError::Execution {
            command,
            message,
            exit_code: None,
        }
    }

    pub(crate) fn exit_error(
        &self,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    ) -> GatewayError {
        if let (Some(target), Some(SSH_FAILURE_STATUS)) = (&self.remote, exit_code) {
            let message = if stderr.is_empty() {
                format!("ssh exited with status {SSH_FAILURE_STATUS}")
            } else {
                stderr
            };
            return GatewayError::Connection {
                host: target.destination(),
                message,
            };
        }
        let message = if !stderr.is_empty() {
            stderr
        } else {
            match exit_code {
                Some(code) => format!("exited with code {code}"),
                None => "terminated by signal".to_string(),
            }
        };
        GatewayError::Execution {
            command,
            message,
            exit_code,
        }
    }
}

/// The process group a spawned command leads. Signalling the group also reaches whatever the
/// command started itself, which killing the direct child alone would leave running.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    pub(crate) fn of(child: &Child) -> Self {
        Self(child.id())
    }

    pub(crate) fn kill(self) {
        let Some(pgid) = self.0 else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(err) => debug!(event = "process_group_kill_failed", pgid, error = %err),
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

fn quote_arg(arg: &str) -> String {
    shlex::try_quote(arg)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| force_quote(&arg.replace('\0', "")))
}

/// Keeps a leading `~/` outside the quotes so the remote shell still expands it.
fn quote_program(program: &str) -> String {
    match program.strip_prefix("~/") {
        Some(rest) => format!("~/{}", quote_arg(rest)),
        None => quote_arg(program),
    }
}

/// Single-quotes unconditionally, closing and reopening around embedded quotes.
fn force_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// PATH lookup. Paths containing a separator are checked directly.
pub fn which_cmd(name: &str) -> Option<String> {
    if name.contains('/') {
        return Path::new(name)
            .is_file()
            .then(|| name.to_string());
    }
    let path_var = std::env::var("PATH").ok()?;
    for part in path_var.split(':') {
        if part.is_empty() {
            continue;
        }
        let candidate = Path::new(part).join(name);
        if candidate.is_file() {
            return Some(candidate.to_string_lossy().to_string());
        }
    }
    None
}

pub fn cli_available(binary: &str) -> bool {
    which_cmd(binary).is_some()
}

pub fn ssh_available() -> bool {
    which_cmd("ssh").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::path::PathBuf;

    fn remote_runner() -> CommandRunner {
        let mut target = RemoteTarget::new("gw.example.com");
        target.user = Some("ops".to_string());
        target.port = Some(2222);
        target.identity_file = Some(PathBuf::from("/home/ops/.ssh/id_gw"));
        target.proxy_jump = Some("bastion".to_string());
        CommandRunner::for_instance(
            &Instance::remote("prod", target).with_command_path("~/.local/bin/openclaw"),
        )
    }

    #[test]
    fn ssh_args_carry_connection_policy() {
        let args = remote_runner().ssh_args();
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ConnectTimeout=10",
                "-o",
                "ServerAliveInterval=15",
                "-o",
                "ServerAliveCountMax=3",
                "-p",
                "2222",
                "-i",
                "/home/ops/.ssh/id_gw",
                "-J",
                "bastion",
                "ops@gw.example.com",
            ]
        );
    }

    #[test]
    fn remote_line_wraps_login_shell_and_quotes_each_argument() {
        let runner = remote_runner();
        let line = runner.remote_command_line(&["logs", "--grep", "it's a; rm -rf /"]);
        assert!(line.starts_with("bash -lc '"));

        let words = shlex::split(&line).expect("outer split");
        assert_eq!(words[0], "bash");
        assert_eq!(words[1], "-lc");
        assert_eq!(words.len(), 3);
        assert!(words[2].starts_with("~/"));

        let inner = shlex::split(&words[2]).expect("inner split");
        assert_eq!(
            inner,
            vec!["~/.local/bin/openclaw", "logs", "--grep", "it's a; rm -rf /"]
        );
    }

    #[test]
    fn local_runner_has_no_ssh_args_and_plain_deadline() {
        let runner = CommandRunner::for_instance(&Instance::local("dev"))
            .with_fetch_timeout(Duration::from_secs(5));
        assert!(runner.ssh_args().is_empty());
        assert_eq!(runner.deadline(), Duration::from_secs(5));
        assert_eq!(runner.describe(&["status", "--json"]), "openclaw status --json");
        assert_eq!(remote_runner().deadline(), Duration::from_secs(40));
    }

    #[test]
    fn ssh_status_255_is_a_connection_failure() {
        let runner = remote_runner();
        let err = runner.exit_error(
            "openclaw status --json".to_string(),
            Some(255),
            "ssh: connect to host gw.example.com port 2222: Connection refused".to_string(),
        );
        assert_eq!(err.kind(), FailureKind::Connection);
        assert!(err.to_string().contains("Connection refused"));

        let app = runner.exit_error("openclaw status --json".to_string(), Some(1), String::new());
        assert_eq!(app.kind(), FailureKind::Execution);
        assert!(app.to_string().contains("exited with code 1"));
    }

    #[test]
    fn local_exit_255_is_not_a_connection_failure() {
        let runner = CommandRunner::for_instance(&Instance::local("dev"));
        let err = runner.exit_error("openclaw".to_string(), Some(255), "bad flag".to_string());
        assert_eq!(
            err,
            GatewayError::Execution {
                command: "openclaw".to_string(),
                message: "bad flag".to_string(),
                exit_code: Some(255),
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_local_binary_is_an_execution_failure() {
        let runner = CommandRunner::for_instance(
            &Instance::local("dev").with_command_path("/nonexistent/clawmon-test/openclaw"),
        );
        let err = runner
            .run(&["status", "--json"], &CancellationToken::new())
            .await
            .expect_err("spawn failure");
        assert_eq!(err.kind(), FailureKind::Execution);
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelled_token_short_circuits() {
        let runner = CommandRunner::for_instance(&Instance::local("dev").with_command_path("sleep"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner.run(&["30"], &cancel).await.expect_err("cancelled");
        assert_eq!(err.kind(), FailureKind::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_command_hits_the_deadline() {
        let runner = CommandRunner::for_instance(&Instance::local("dev").with_command_path("sleep"))
            .with_fetch_timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = runner
            .run(&["30"], &CancellationToken::new())
            .await
            .expect_err("timeout");
        assert!(matches!(err, GatewayError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
