//! Wire schema of `openclaw status --json`.
//!
//! Every section is optional and every field defaults, so newer CLI versions that add or
//! drop fields still decode. Unknown top-level keys are kept in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::wire::null_default;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayStatus {
    pub link_channel: Option<LinkChannel>,
    pub heartbeat: Option<Heartbeat>,
    #[serde(deserialize_with = "null_default")]
    pub channel_summary: Vec<String>,
    pub sessions: Option<Sessions>,
    pub os: Option<OsInfo>,
    pub update: Option<UpdateInfo>,
    pub update_channel: Option<String>,
    pub memory: Option<MemoryInfo>,
    pub gateway: Option<GatewayInfo>,
    pub gateway_service: Option<ServiceInfo>,
    pub node_service: Option<ServiceInfo>,
    pub agents: Option<AgentsInfo>,
    pub security_audit: Option<SecurityAudit>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl GatewayStatus {
    pub fn is_reachable(&self) -> bool {
        self.gateway.as_ref().is_some_and(|gateway| gateway.reachable)
    }

    pub fn gateway_version(&self) -> Option<&str> {
        self.gateway
            .as_ref()
            .map(|gateway| gateway.self_info.version.as_str())
            .filter(|version| !version.is_empty())
    }

    pub fn gateway_error(&self) -> Option<&str> {
        self.gateway
            .as_ref()
            .and_then(|gateway| gateway.error.as_deref())
            .filter(|error| !error.is_empty())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.as_ref().map_or(0, |sessions| sessions.count)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.as_ref().map_or(0, |agents| agents.agents.len())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkChannel {
    #[serde(deserialize_with = "null_default")]
    pub id: String,
    #[serde(deserialize_with = "null_default")]
    pub label: String,
    #[serde(deserialize_with = "null_default")]
    pub linked: bool,
    #[serde(deserialize_with = "null_default")]
    pub auth_age_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Heartbeat {
    #[serde(deserialize_with = "null_default")]
    pub default_agent_id: String,
    #[serde(deserialize_with = "null_default")]
    pub agents: Vec<HeartbeatAgent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatAgent {
    #[serde(deserialize_with = "null_default")]
    pub agent_id: String,
    #[serde(deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(deserialize_with = "null_default")]
    pub every: String,
    #[serde(deserialize_with = "null_default")]
    pub every_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sessions {
    #[serde(deserialize_with = "null_default")]
    pub paths: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub count: usize,
    #[serde(deserialize_with = "null_default")]
    pub defaults: SessionDefaults,
    #[serde(deserialize_with = "null_default")]
    pub recent: Vec<Session>,
    #[serde(deserialize_with = "null_default")]
    pub by_agent: Vec<AgentSessions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionDefaults {
    #[serde(deserialize_with = "null_default")]
    pub model: String,
    #[serde(deserialize_with = "null_default")]
    pub context_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Session {
    #[serde(deserialize_with = "null_default")]
    pub agent_id: String,
    #[serde(deserialize_with = "null_default")]
    pub key: String,
    #[serde(deserialize_with = "null_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_default")]
    pub session_id: String,
    #[serde(deserialize_with = "null_default")]
    pub updated_at: i64,
    #[serde(deserialize_with = "null_default")]
    pub age: i64,
    #[serde(deserialize_with = "null_default")]
    pub system_sent: bool,
    #[serde(deserialize_with = "null_default")]
    pub aborted_last_run: bool,
    #[serde(deserialize_with = "null_default")]
    pub input_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub output_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub total_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub remaining_tokens: i64,
    #[serde(deserialize_with = "null_default")]
    pub percent_used: i64,
    #[serde(deserialize_with = "null_default")]
    pub model: String,
    #[serde(deserialize_with = "null_default")]
    pub context_tokens: u64,
    #[serde(deserialize_with = "null_default")]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSessions {
    #[serde(deserialize_with = "null_default")]
    pub agent_id: String,
    #[serde(deserialize_with = "null_default")]
    pub path: String,
    #[serde(deserialize_with = "null_default")]
    pub count: usize,
    #[serde(deserialize_with = "null_default")]
    pub recent: Vec<Session>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OsInfo {
    #[serde(deserialize_with = "null_default")]
    pub platform: String,
    #[serde(deserialize_with = "null_default")]
    pub arch: String,
    #[serde(deserialize_with = "null_default")]
    pub release: String,
    #[serde(deserialize_with = "null_default")]
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateInfo {
    #[serde(deserialize_with = "null_default")]
    pub root: String,
    #[serde(deserialize_with = "null_default")]
    pub install_kind: String,
    #[serde(deserialize_with = "null_default")]
    pub package_manager: String,
    #[serde(deserialize_with = "null_default")]
    pub deps: DepsInfo,
    #[serde(deserialize_with = "null_default")]
    pub registry: RegistryInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DepsInfo {
    #[serde(deserialize_with = "null_default")]
    pub manager: String,
    #[serde(deserialize_with = "null_default")]
    pub status: String,
    #[serde(deserialize_with = "null_default")]
    pub lockfile_path: String,
    #[serde(deserialize_with = "null_default")]
    pub marker_path: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryInfo {
    #[serde(deserialize_with = "null_default")]
    pub latest_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryInfo {
    #[serde(deserialize_with = "null_default")]
    pub agent_id: String,
    #[serde(deserialize_with = "null_default")]
    pub backend: String,
    #[serde(deserialize_with = "null_default")]
    pub files: u64,
    #[serde(deserialize_with = "null_default")]
    pub chunks: u64,
    #[serde(deserialize_with = "null_default")]
    pub dirty: bool,
    #[serde(deserialize_with = "null_default")]
    pub workspace_dir: String,
    #[serde(deserialize_with = "null_default")]
    pub db_path: String,
    #[serde(deserialize_with = "null_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_default")]
    pub model: String,
    #[serde(deserialize_with = "null_default")]
    pub requested_provider: String,
    #[serde(deserialize_with = "null_default")]
    pub sources: Vec<String>,
    #[serde(deserialize_with = "null_default")]
    pub source_counts: Vec<SourceCount>,
    #[serde(deserialize_with = "null_default")]
    pub cache: CacheInfo,
    #[serde(deserialize_with = "null_default")]
    pub fts: FtsInfo,
    #[serde(deserialize_with = "null_default")]
    pub vector: VectorInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceCount {
    #[serde(deserialize_with = "null_default")]
    pub source: String,
    #[serde(deserialize_with = "null_default")]
    pub files: u64,
    #[serde(deserialize_with = "null_default")]
    pub chunks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheInfo {
    #[serde(deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(deserialize_with = "null_default")]
    pub entries: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FtsInfo {
    #[serde(deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(deserialize_with = "null_default")]
    pub available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VectorInfo {
    #[serde(deserialize_with = "null_default")]
    pub enabled: bool,
    #[serde(deserialize_with = "null_default")]
    pub available: bool,
    pub extension_path: Option<String>,
    pub dims: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayInfo {
    #[serde(deserialize_with = "null_default")]
    pub mode: String,
    #[serde(deserialize_with = "null_default")]
    pub url: String,
    #[serde(deserialize_with = "null_default")]
    pub url_source: String,
    #[serde(deserialize_with = "null_default")]
    pub misconfigured: bool,
    #[serde(deserialize_with = "null_default")]
    pub reachable: bool,
    pub connect_latency_ms: Option<u64>,
    #[serde(rename = "self")]
    #[serde(deserialize_with = "null_default")]
    pub self_info: GatewaySelf,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySelf {
    #[serde(deserialize_with = "null_default")]
    pub host: String,
    #[serde(deserialize_with = "null_default")]
    pub ip: String,
    #[serde(deserialize_with = "null_default")]
    pub version: String,
    #[serde(deserialize_with = "null_default")]
    pub platform: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceInfo {
    #[serde(deserialize_with = "null_default")]
    pub label: String,
    #[serde(deserialize_with = "null_default")]
    pub installed: bool,
    #[serde(deserialize_with = "null_default")]
    pub loaded_text: String,
    #[serde(deserialize_with = "null_default")]
    pub runtime_short: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentsInfo {
    #[serde(deserialize_with = "null_default")]
    pub default_id: String,
    #[serde(deserialize_with = "null_default")]
    pub agents: Vec<AgentInfo>,
    #[serde(deserialize_with = "null_default")]
    pub total_sessions: usize,
    #[serde(deserialize_with = "null_default")]
    pub bootstrap_pending_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentInfo {
    #[serde(deserialize_with = "null_default")]
    pub id: String,
    #[serde(deserialize_with = "null_default")]
    pub workspace_dir: String,
    #[serde(deserialize_with = "null_default")]
    pub bootstrap_pending: bool,
    #[serde(deserialize_with = "null_default")]
    pub sessions_path: String,
    #[serde(deserialize_with = "null_default")]
    pub sessions_count: usize,
    pub last_updated_at: Option<i64>,
    pub last_active_age_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityAudit {
    #[serde(deserialize_with = "null_default")]
    pub ts: i64,
    #[serde(deserialize_with = "null_default")]
    pub summary: SecurityAuditSummary,
    #[serde(deserialize_with = "null_default")]
    pub findings: Vec<SecurityAuditFinding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityAuditSummary {
    #[serde(deserialize_with = "null_default")]
    pub critical: u32,
    #[serde(deserialize_with = "null_default")]
    pub warn: u32,
    #[serde(deserialize_with = "null_default")]
    pub info: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SecurityAuditFinding {
    #[serde(deserialize_with = "null_default")]
    pub check_id: String,
    #[serde(deserialize_with = "null_default")]
    pub severity: String,
    #[serde(deserialize_with = "null_default")]
    pub title: String,
    #[serde(deserialize_with = "null_default")]
    pub detail: String,
    pub remediation: Option<String>,
}
