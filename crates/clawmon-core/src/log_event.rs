use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SOURCE_GATEWAY: &str = "gateway";
pub const SOURCE_CLI: &str = "openclaw-cli";
pub const SOURCE_MONITOR: &str = "clawmon";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Case-insensitive, accepts the usual abbreviations. `None` for anything else.
    pub fn from_label(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "debug" | "dbg" | "trace" => Some(LogLevel::Debug),
            "info" | "inf" | "information" => Some(LogLevel::Info),
            "warn" | "warning" | "wrn" => Some(LogLevel::Warn),
            "error" | "err" | "fatal" | "critical" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed log line. `raw` always holds the line exactly as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub raw: String,
}

impl LogEvent {
    /// A line from the follow command's error stream.
    pub fn from_stderr(line: &str, received_at: DateTime<Utc>) -> Self {
        Self {
            timestamp: received_at,
            level: LogLevel::Error,
            source: SOURCE_CLI.to_string(),
            message: line.to_string(),
            raw: line.to_string(),
        }
    }

    /// Event generated by the monitor itself rather than read from the stream.
    pub fn synthetic(level: LogLevel, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            timestamp: Utc::now(),
            level,
            source: SOURCE_MONITOR.to_string(),
            raw: message.clone(),
            message,
        }
    }
}
