use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::instance::{Instance, InstanceProfile};

pub const CONFIG_ENV: &str = "CLAWMON_CONFIG";
pub const REFRESH_ENV: &str = "CLAWMON_REFRESH_MS";
const APP_DIR: &str = "clawmon";
const CONFIG_FILE: &str = "config.yml";
const MIN_REFRESH_MS: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config directory could be determined")]
    NoConfigDir,
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub refresh_ms: u64,
    pub log_tail_lines: usize,
    pub follow_buffer: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            refresh_ms: 1000,
            log_tail_lines: 500,
            follow_buffer: 256,
            fetch_timeout_secs: 30,
        }
    }
}

impl UiConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(MIN_REFRESH_MS))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClawmonConfig {
    pub instances: Vec<InstanceProfile>,
    pub ui: UiConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openclaw_cli: Option<String>,
}

impl ClawmonConfig {
    /// Loads from `$CLAWMON_CONFIG` or the default location. The flag is `true` on first run,
    /// i.e. when no file exists and defaults were used.
    pub fn load() -> Result<(Self, bool), ConfigError> {
        let path = config_path()?;
        let (mut config, first_run) = Self::load_from(&path)?;
        config.apply_env_overrides();
        Ok((config, first_run))
    }

    pub fn load_from(path: &Path) -> Result<(Self, bool), ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok((Self::default(), true)),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok((Self::default(), false));
        }
        let config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok((config, false))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(refresh_ms) = std::env::var(REFRESH_ENV)
            .ok()
            .and_then(|value| parse_millis(&value))
        {
            self.ui.refresh_ms = refresh_ms;
        }
    }

    /// Resolved instances in config order. Never empty: falls back to one local instance.
    pub fn resolve_instances(&self) -> Vec<Instance> {
        let default_cli = self.openclaw_cli.as_deref();
        let mut instances: Vec<Instance> = self
            .instances
            .iter()
            .filter_map(|profile| {
                let resolved = Instance::from_profile(profile, default_cli);
                if resolved.is_none() {
                    warn!(
                        event = "instance_skipped",
                        instance = %profile.name,
                        reason = "ssh mode without host"
                    );
                }
                resolved
            })
            .collect();
        if instances.is_empty() {
            let mut local = Instance::local("Local");
            if let Some(cli) = default_cli.filter(|cli| !cli.trim().is_empty()) {
                local = local.with_command_path(cli.trim());
            }
            instances.push(local);
        }
        instances
    }
}

pub fn parse_millis(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|ms| *ms > 0)
}

pub fn config_dir() -> Result<PathBuf, ConfigError> {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => dirs::config_dir().ok_or(ConfigError::NoConfigDir)?,
    };
    Ok(base.join(APP_DIR))
}

pub fn config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(value) = std::env::var(CONFIG_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    Ok(config_dir()?.join(CONFIG_FILE))
}

pub fn state_dir() -> PathBuf {
    if let Ok(value) = std::env::var("XDG_STATE_HOME") {
        if !value.trim().is_empty() {
            return PathBuf::from(value).join(APP_DIR);
        }
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}
