//! Wire schema of `openclaw health --json`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::wire::null_default;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HealthLevel {
    Ok,
    Degraded,
    Down,
    #[default]
    Unknown,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Ok => "ok",
            HealthLevel::Degraded => "degraded",
            HealthLevel::Down => "down",
            HealthLevel::Unknown => "unknown",
        }
    }
}

impl From<String> for HealthLevel {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ok" | "healthy" | "pass" => HealthLevel::Ok,
            "degraded" | "warn" | "warning" => HealthLevel::Degraded,
            "down" | "fail" | "error" => HealthLevel::Down,
            _ => HealthLevel::Unknown,
        }
    }
}

impl From<HealthLevel> for String {
    fn from(value: HealthLevel) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthReport {
    #[serde(deserialize_with = "null_default")]
    pub overall: HealthLevel,
    pub ts: Option<i64>,
    pub gateway: Option<HealthGateway>,
    #[serde(deserialize_with = "null_default")]
    pub channels: Vec<HealthChannel>,
    #[serde(deserialize_with = "null_default")]
    pub services: Vec<HealthService>,
    #[serde(deserialize_with = "null_default")]
    pub doctor: Vec<DoctorFinding>,
    pub probe_duration_ms: Option<u64>,
    /// Response text exactly as received.
    #[serde(skip)]
    pub raw: String,
}

impl HealthReport {
    /// Decodes a `health --json` response, keeping the raw text on the result.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut report: HealthReport = serde_json::from_str(raw)?;
        report.raw = raw.to_string();
        Ok(report)
    }

    pub fn failing_channels(&self) -> impl Iterator<Item = &HealthChannel> {
        self.channels
            .iter()
            .filter(|channel| !channel.connected || channel.error.is_some())
    }

    pub fn failing_checks(&self) -> impl Iterator<Item = &DoctorFinding> {
        self.doctor
            .iter()
            .filter(|finding| !finding.status.eq_ignore_ascii_case("pass"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthGateway {
    #[serde(deserialize_with = "null_default")]
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub version: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthChannel {
    #[serde(deserialize_with = "null_default")]
    pub id: String,
    #[serde(deserialize_with = "null_default")]
    pub label: String,
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub connected: bool,
    pub error: Option<String>,
    pub auth_age_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthService {
    #[serde(deserialize_with = "null_default")]
    pub name: String,
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoctorFinding {
    #[serde(deserialize_with = "null_default")]
    pub check: String,
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub message: String,
}
