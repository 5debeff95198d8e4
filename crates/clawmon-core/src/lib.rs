pub mod config;
pub mod health;
pub mod instance;
pub mod log_event;
pub mod log_parser;
pub mod status;
mod wire;

pub use config::{ClawmonConfig, ConfigError, UiConfig};
pub use health::{HealthLevel, HealthReport};
pub use instance::{ExecutionMode, Instance, InstanceProfile, ProfileMode, RemoteTarget, SshProfile};
pub use log_event::{LogEvent, LogLevel};
pub use log_parser::{parse_log_line, parse_log_line_at};
pub use status::GatewayStatus;

/// Binary name used when no override is configured.
pub const DEFAULT_BINARY: &str = "openclaw";
