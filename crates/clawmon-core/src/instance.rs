use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::DEFAULT_BINARY;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    #[default]
    Local,
    #[serde(alias = "remote")]
    Ssh,
}

/// Instance entry as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mode: ProfileMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openclaw_cli: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SshProfile {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_jump: Option<String>,
    /// Seconds; zero or missing means the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openclaw_cli: Option<String>,
}

/// Connection parameters for an instance reached over ssh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub proxy_jump: Option<String>,
    pub connect_timeout: Duration,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: None,
            identity_file: None,
            proxy_jump: None,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// `user@host` unless the host string already names a user.
    pub fn destination(&self) -> String {
        match self.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() && !self.host.contains('@') => {
                format!("{user}@{}", self.host)
            }
            _ => self.host.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Local,
    Remote(RemoteTarget),
}

/// A configured monitoring target. Built once from config and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub tags: Vec<String>,
    pub mode: ExecutionMode,
    pub command_path: Option<String>,
}

impl Instance {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            mode: ExecutionMode::Local,
            command_path: None,
        }
    }

    pub fn remote(name: impl Into<String>, target: RemoteTarget) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            mode: ExecutionMode::Remote(target),
            command_path: None,
        }
    }

    pub fn with_command_path(mut self, path: impl Into<String>) -> Self {
        self.command_path = Some(path.into());
        self
    }

    /// Resolves a config entry. Returns `None` for an ssh profile with no usable host.
    ///
    /// Command path precedence: instance override, ssh-level override (remote only),
    /// then `default_cli`.
    pub fn from_profile(profile: &InstanceProfile, default_cli: Option<&str>) -> Option<Self> {
        let instance_cli = non_empty(profile.openclaw_cli.as_deref());
        match profile.mode {
            ProfileMode::Local => Some(Self {
                name: profile.name.clone(),
                tags: profile.tags.clone(),
                mode: ExecutionMode::Local,
                command_path: instance_cli.or_else(|| non_empty(default_cli)),
            }),
            ProfileMode::Ssh => {
                let ssh = profile.ssh.as_ref()?;
                if ssh.host.trim().is_empty() {
                    return None;
                }
                let timeout = match ssh.connect_timeout {
                    Some(secs) if secs > 0 => secs,
                    _ => DEFAULT_CONNECT_TIMEOUT_SECS,
                };
                let target = RemoteTarget {
                    host: ssh.host.trim().to_string(),
                    port: ssh.port.filter(|port| *port > 0),
                    user: ssh.user.clone().filter(|user| !user.trim().is_empty()),
                    identity_file: ssh.identity_file.clone(),
                    proxy_jump: ssh.proxy_jump.clone().filter(|jump| !jump.trim().is_empty()),
                    connect_timeout: Duration::from_secs(timeout),
                };
                Some(Self {
                    name: profile.name.clone(),
                    tags: profile.tags.clone(),
                    mode: ExecutionMode::Remote(target),
                    command_path: instance_cli
                        .or_else(|| non_empty(ssh.openclaw_cli.as_deref()))
                        .or_else(|| non_empty(default_cli)),
                })
            }
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.mode, ExecutionMode::Remote(_))
    }

    pub fn remote_target(&self) -> Option<&RemoteTarget> {
        match &self.mode {
            ExecutionMode::Remote(target) => Some(target),
            ExecutionMode::Local => None,
        }
    }

    pub fn binary(&self) -> &str {
        self.command_path.as_deref().unwrap_or(DEFAULT_BINARY)
    }

    pub fn display_target(&self) -> String {
        match &self.mode {
            ExecutionMode::Local => "local".to_string(),
            ExecutionMode::Remote(target) => match target.port {
                Some(port) => format!("{}:{port}", target.destination()),
                None => target.destination(),
            },
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.display_target())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
