//! Typed command model shared by the controller and the recovery manager.
//!
//! Server commands arrive as loosely-shaped JSON. They are validated once, at
//! decode time, into [`ExecutionCommand`] / [`StatusCommand`]; unknown fields
//! are preserved so a cached command can be replayed unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::ComponentState;

/// `hostLevelParams` key carrying the name of a custom command.
pub const CUSTOM_COMMAND_KEY: &str = "custom_command";
pub const CUSTOM_COMMAND_RESTART: &str = "RESTART";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("command is missing required field '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    ExecutionCommand,
    AutoExecutionCommand,
    StatusCommand,
    BackgroundExecutionCommand,
    #[serde(other)]
    Unknown,
}

impl CommandType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExecutionCommand => "EXECUTION_COMMAND",
            Self::AutoExecutionCommand => "AUTO_EXECUTION_COMMAND",
            Self::StatusCommand => "STATUS_COMMAND",
            Self::BackgroundExecutionCommand => "BACKGROUND_EXECUTION_COMMAND",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an execution command asks the component to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleCommand {
    Install,
    Start,
    Stop,
    /// `CUSTOM_COMMAND` with the name from `hostLevelParams.custom_command`.
    CustomCommand(String),
    /// Any other role command (SERVICE_CHECK, UPGRADE, ...), kept verbatim.
    Other(String),
}

impl RoleCommand {
    #[must_use]
    pub fn restart() -> Self {
        Self::CustomCommand(CUSTOM_COMMAND_RESTART.to_string())
    }

    /// Wire value of `roleCommand`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Install => "INSTALL",
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::CustomCommand(_) => "CUSTOM_COMMAND",
            Self::Other(other) => other,
        }
    }

    /// Name of the custom command, if this is one.
    #[must_use]
    pub fn custom_command(&self) -> Option<&str> {
        match self {
            Self::CustomCommand(name) => Some(name),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_restart(&self) -> bool {
        self.custom_command() == Some(CUSTOM_COMMAND_RESTART)
    }

    /// Build from the wire `roleCommand` and the optional custom command name.
    #[must_use]
    pub fn parse(role_command: &str, custom_command: Option<&str>) -> Self {
        match role_command {
            "INSTALL" => Self::Install,
            "START" => Self::Start,
            "STOP" => Self::Stop,
            "CUSTOM_COMMAND" => Self::CustomCommand(custom_command.unwrap_or_default().to_string()),
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomCommand(name) => write!(f, "CUSTOM_COMMAND({name})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Final status of an executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// An execution command, either received from the server or synthesized
/// for recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExecutionCommand", into = "RawExecutionCommand")]
pub struct ExecutionCommand {
    pub command_type: CommandType,
    pub task_id: Option<i64>,
    pub command_id: Option<String>,
    pub cluster_name: Option<String>,
    pub service_name: Option<String>,
    pub role: String,
    pub role_command: RoleCommand,
    pub configurations: Map<String, Value>,
    pub host_level_params: Map<String, Value>,
    pub command_params: Map<String, Value>,
    /// Fields the agent does not interpret, replayed as received.
    pub extra: Map<String, Value>,
}

impl ExecutionCommand {
    #[must_use]
    pub fn new(role: impl Into<String>, role_command: RoleCommand) -> Self {
        let mut command = Self {
            command_type: CommandType::ExecutionCommand,
            task_id: None,
            command_id: None,
            cluster_name: None,
            service_name: None,
            role: role.into(),
            role_command: RoleCommand::Other(String::new()),
            configurations: Map::new(),
            host_level_params: Map::new(),
            command_params: Map::new(),
            extra: Map::new(),
        };
        command.set_role_command(role_command);
        command
    }

    /// Replace the role command, keeping `hostLevelParams.custom_command` in step.
    pub fn set_role_command(&mut self, role_command: RoleCommand) {
        if let Some(name) = role_command.custom_command() {
            self.host_level_params
                .insert(CUSTOM_COMMAND_KEY.to_string(), Value::String(name.to_string()));
        }
        self.role_command = role_command;
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExecutionCommand {
    #[serde(default = "default_execution_type")]
    command_type: CommandType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cluster_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    role_command: Option<String>,
    #[serde(default)]
    configurations: Map<String, Value>,
    #[serde(default)]
    host_level_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    command_params: Map<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_execution_type() -> CommandType {
    CommandType::ExecutionCommand
}

impl TryFrom<RawExecutionCommand> for ExecutionCommand {
    type Error = CommandError;

    fn try_from(raw: RawExecutionCommand) -> Result<Self, Self::Error> {
        let role = raw
            .role
            .filter(|role| !role.trim().is_empty())
            .ok_or(CommandError::MissingField("role"))?;
        let role_command = raw
            .role_command
            .ok_or(CommandError::MissingField("roleCommand"))?;
        let role_command = RoleCommand::parse(
            &role_command,
            raw.host_level_params
                .get(CUSTOM_COMMAND_KEY)
                .and_then(Value::as_str),
        );

        Ok(Self {
            command_type: raw.command_type,
            task_id: raw.task_id,
            command_id: raw.command_id,
            cluster_name: raw.cluster_name,
            service_name: raw.service_name,
            role,
            role_command,
            configurations: raw.configurations,
            host_level_params: raw.host_level_params,
            command_params: raw.command_params,
            extra: raw.extra,
        })
    }
}

impl From<ExecutionCommand> for RawExecutionCommand {
    fn from(command: ExecutionCommand) -> Self {
        Self {
            command_type: command.command_type,
            task_id: command.task_id,
            command_id: command.command_id,
            cluster_name: command.cluster_name,
            service_name: command.service_name,
            role: Some(command.role),
            role_command: Some(command.role_command.as_str().to_string()),
            configurations: command.configurations,
            host_level_params: command.host_level_params,
            command_params: command.command_params,
            extra: command.extra,
        }
    }
}

/// How much of the execution context a status command carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadLevel {
    #[default]
    Default,
    Minimal,
    ExecutionCommand,
}

/// Periodic status check for one component, optionally carrying the full
/// execution command the recovery manager can replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCommand {
    #[serde(default = "default_status_type")]
    pub command_type: CommandType,
    #[serde(default)]
    pub payload_level: PayloadLevel,
    pub component_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<ComponentState>,
    #[serde(default)]
    pub has_stale_configs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_command_details: Option<ExecutionCommand>,
}

fn default_status_type() -> CommandType {
    CommandType::StatusCommand
}

impl StatusCommand {
    #[must_use]
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            command_type: CommandType::StatusCommand,
            payload_level: PayloadLevel::Default,
            component_name: component_name.into(),
            service_name: None,
            cluster_name: None,
            desired_state: None,
            has_stale_configs: false,
            execution_command_details: None,
        }
    }

    /// The replayable execution command, when the server sent one.
    #[must_use]
    pub fn replayable_command(&self) -> Option<&ExecutionCommand> {
        if self.payload_level == PayloadLevel::ExecutionCommand {
            self.execution_command_details.as_ref()
        } else {
            None
        }
    }
}
