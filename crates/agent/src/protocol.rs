//! Wire payloads exchanged with the management server.
//!
//! The server is loose about scalar types: `responseId` and `exitstatus`
//! arrive as numbers or numeric strings, booleans as `true` or `"true"`.
//! The deserializers here accept both and treat anything unparseable as
//! absent.

use std::collections::BTreeMap;

use recovery::{RecoveryReport, NO_RECOVERY_TIMESTAMP};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::queue::{CommandReport, ComponentStatusReport};

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_i64))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_bool))
}

pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Decode every element that parses, logging and skipping the rest.
pub fn decode_each<T: DeserializeOwned>(kind: &str, values: &[Value]) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match serde_json::from_value(value.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(kind, error = %e, "Skipping malformed command from server");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub response_id: Option<i64>,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub exitstatus: Option<i64>,
    #[serde(default)]
    pub status_commands: Option<Vec<Value>>,
    #[serde(default)]
    pub recovery_config: Option<Value>,
}

impl RegistrationResponse {
    /// A missing exit status counts as success.
    pub fn is_success(&self) -> bool {
        self.exitstatus.unwrap_or(0) == 0
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub response_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub exitstatus: Option<i64>,
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub restart_agent: Option<bool>,
    #[serde(default)]
    pub registration_command: Option<Value>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_mapped_components: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub has_pending_tasks: Option<bool>,
    #[serde(default)]
    pub execution_commands: Option<Vec<Value>>,
    #[serde(default)]
    pub status_commands: Option<Vec<Value>>,
    #[serde(default)]
    pub recovery_config: Option<Value>,
}

impl HeartbeatResponse {
    pub fn is_success(&self) -> bool {
        self.exitstatus.unwrap_or(0) == 0
    }

    /// Whether the server asked the agent to register again.
    ///
    /// `null` and an explicit `false` are ignored; any other value, including
    /// a command object, is a request.
    pub fn registration_requested(&self) -> bool {
        match &self.registration_command {
            None | Some(Value::Null) => false,
            Some(other) => value_as_bool(other).unwrap_or(true),
        }
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_agent.unwrap_or(false)
    }

    /// Absent means mapped.
    pub fn mapped_components(&self) -> bool {
        self.has_mapped_components.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub os: String,
    pub architecture: String,
    pub processorcount: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub hostname: String,
    pub public_hostname: String,
    pub current_ping_port: u16,
    pub agent_version: String,
    pub prefix: String,
    pub timestamp: i64,
    pub hardware_profile: HardwareProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub status: String,
    pub cause: String,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self {
            status: "HEALTHY".into(),
            cause: "NONE".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub response_id: i64,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub hostname: String,
    pub node_status: NodeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reports: Vec<CommandReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub component_status: Vec<ComponentStatusReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_report: Option<RecoveryReport>,
    #[serde(skip_serializing_if = "no_recovery_timestamp")]
    pub recovery_timestamp: i64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_recovery_timestamp(ts: &i64) -> bool {
    *ts == NO_RECOVERY_TIMESTAMP
}

impl HeartbeatRequest {
    pub fn new(response_id: i64, hostname: impl Into<String>) -> Self {
        Self {
            response_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            hostname: hostname.into(),
            node_status: NodeStatus::default(),
            reports: Vec::new(),
            component_status: Vec::new(),
            recovery_report: None,
            recovery_timestamp: NO_RECOVERY_TIMESTAMP,
        }
    }
}

/// `GET /agent/v1/components/{cluster}`: service -> component -> category.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentsResponse {
    #[serde(default)]
    pub components: BTreeMap<String, BTreeMap<String, String>>,
}
