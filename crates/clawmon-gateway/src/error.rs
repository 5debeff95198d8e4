use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Execution,
    Connection,
    Decode,
    FollowUnavailable,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Execution => "execution",
            FailureKind::Connection => "connection",
            FailureKind::Decode => "decode",
            FailureKind::FollowUnavailable => "follow-unavailable",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced by the acquisition layer. None of them is fatal to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Launch failure or non-zero exit. `message` is the command's stderr when it wrote any.
    #[error("{command} failed: {message}")]
    Execution {
        command: String,
        message: String,
        exit_code: Option<i32>,
    },
    /// Host unreachable or authentication rejected by ssh.
    #[error("connection to {host} failed: {message}")]
    Connection { host: String, message: String },
    #[error("{command} timed out after {}s", .after.as_secs())]
    TimedOut { command: String, after: Duration },
    /// The command ran but its output did not decode. `raw` is the output verbatim.
    #[error("failed to decode {what}: {message}")]
    Decode {
        what: &'static str,
        message: String,
        raw: String,
    },
    #[error("log stream unavailable: {0}")]
    FollowUnavailable(String),
    #[error("{0} cancelled")]
    Cancelled(String),
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("no instance at index {index} ({len} configured)")]
pub struct UnknownInstance {
    pub index: usize,
    pub len: usize,
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GatewayError::Execution { .. } | GatewayError::TimedOut { .. } => {
                FailureKind::Execution
            }
            GatewayError::Connection { .. } => FailureKind::Connection,
            GatewayError::Decode { .. } => FailureKind::Decode,
            GatewayError::FollowUnavailable(_) => FailureKind::FollowUnavailable,
            GatewayError::Cancelled(_) => FailureKind::Cancelled,
        }
    }

    /// Raw response text kept for fallback display, only present on decode failures.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            GatewayError::Decode { raw, .. } => Some(raw.as_str()),
            _ => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        self.kind() == FailureKind::Connection
    }
}
