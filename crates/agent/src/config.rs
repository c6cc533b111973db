//! Agent configuration.
//!
//! Loaded from a TOML file; every section and key is optional:
//!
//! ```toml
//! [server]
//! hostname = "ambari.example.com"
//! secured_url_port = 8441
//!
//! [heartbeat]
//! idle_interval_secs = 10
//!
//! [recovery]
//! type = "AUTO_START"
//! components = "DATANODE, NODEMANAGER"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use recovery::{ConfigUpdate, RecoveryType, DEFAULT_STALE_INTERVAL_SECS};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const REGISTER_PATH: &str = "/agent/v1/register/";
pub const HEARTBEAT_PATH: &str = "/agent/v1/heartbeat/";
pub const COMPONENTS_PATH: &str = "/agent/v1/components/";

/// Name of the file under the agent prefix holding the agent version.
pub const VERSION_FILE: &str = "version";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    pub agent: AgentSection,
    pub heartbeat: HeartbeatConfig,
    pub recovery: RecoverySection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub hostname: String,
    pub url_port: u16,
    pub secured_url_port: u16,
    pub use_https: bool,
    /// Extra PEM root certificate trusted for the server connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            url_port: 8440,
            secured_url_port: 8441,
            use_https: true,
            ca_cert: None,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Agent data directory; holds the `version` file.
    pub prefix: PathBuf,
    /// Host name reported to the server. Detected when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub current_ping_port: u16,
    /// Executable invoked for every command: `<role> <roleCommand> [custom]`.
    pub command_script: PathBuf,
    pub command_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from("/var/lib/host-agent/data"),
            hostname: None,
            current_ping_port: 8670,
            command_script: PathBuf::from("/var/lib/host-agent/bin/run-command"),
            command_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Sleep between heartbeats while the action queue is idle.
    pub idle_interval_secs: u64,
    /// Sleep between heartbeats while commands are running.
    pub minimum_interval_secs: u64,
    /// Upper bound of the randomized registration backoff.
    pub max_reconnect_retry_delay_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 10,
            minimum_interval_secs: 1,
            max_reconnect_retry_delay_secs: 30,
        }
    }
}

/// Recovery policy used until the server sends one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySection {
    #[serde(rename = "type")]
    pub recovery_type: RecoveryType,
    pub max_count: i64,
    pub window_in_minutes: i64,
    pub retry_gap: i64,
    pub max_lifetime_count: i64,
    pub components: String,
    pub stale_command_interval_secs: i64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        let defaults = ConfigUpdate::default();
        Self {
            recovery_type: RecoveryType::Default,
            max_count: defaults.max_count,
            window_in_minutes: defaults.window_in_minutes,
            retry_gap: defaults.retry_gap,
            max_lifetime_count: defaults.max_lifetime_count,
            components: String::new(),
            stale_command_interval_secs: DEFAULT_STALE_INTERVAL_SECS,
        }
    }
}

impl RecoverySection {
    pub fn to_update(&self) -> ConfigUpdate {
        ConfigUpdate {
            max_count: self.max_count,
            window_in_minutes: self.window_in_minutes,
            retry_gap: self.retry_gap,
            max_lifetime_count: self.max_lifetime_count,
            enabled_components: self.components.clone(),
            ..ConfigUpdate::for_type(self.recovery_type)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.hostname.trim().is_empty() {
            return Err(ConfigError::Invalid("server.hostname is empty".into()));
        }
        if self.heartbeat.idle_interval_secs < self.heartbeat.minimum_interval_secs {
            return Err(ConfigError::Invalid(
                "heartbeat.idle_interval_secs must not be below minimum_interval_secs".into(),
            ));
        }
        Ok(())
    }

    /// `https://{server}:{secured_port}` or `http://{server}:{url_port}`.
    pub fn server_base_url(&self) -> String {
        let server = &self.server;
        if server.use_https {
            format!("https://{}:{}", server.hostname, server.secured_url_port)
        } else {
            format!("http://{}:{}", server.hostname, server.url_port)
        }
    }

    pub fn register_url(&self, host: &str) -> String {
        format!("{}{REGISTER_PATH}{host}", self.server_base_url())
    }

    pub fn heartbeat_url(&self, host: &str) -> String {
        format!("{}{HEARTBEAT_PATH}{host}", self.server_base_url())
    }

    /// Prefix of the component catalog URL; the cluster name is appended.
    pub fn components_url(&self) -> String {
        format!("{}{COMPONENTS_PATH}", self.server_base_url())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

/// Read the agent version from `{prefix}/version`.
pub fn read_agent_version(prefix: &Path) -> Result<String, ConfigError> {
    let path = prefix.join(VERSION_FILE);
    let version = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    Ok(version.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.server.url_port, 8440);
        assert_eq!(config.server.secured_url_port, 8441);
        assert_eq!(config.agent.current_ping_port, 8670);
        assert_eq!(config.heartbeat.idle_interval_secs, 10);
        assert_eq!(config.recovery.stale_command_interval_secs, 600);
        assert!(!config.recovery.to_update().recovery_enabled);
    }

    #[test]
    fn test_urls() {
        let mut config = AgentConfig::default();
        config.server.hostname = "ambari.local".into();
        assert_eq!(
            config.register_url("h1"),
            "https://ambari.local:8441/agent/v1/register/h1"
        );
        assert_eq!(
            config.heartbeat_url("h1"),
            "https://ambari.local:8441/agent/v1/heartbeat/h1"
        );

        config.server.use_https = false;
        assert_eq!(
            config.components_url(),
            "http://ambari.local:8440/agent/v1/components/"
        );
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
hostname = "mgmt"

[recovery]
type = "AUTO_START"
max_count = 3
components = "DATANODE"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.server.hostname, "mgmt");
        assert_eq!(config.server.secured_url_port, 8441);
        assert_eq!(config.logging.format, LogFormat::Json);

        let update = config.recovery.to_update();
        assert!(update.recovery_enabled);
        assert!(update.auto_start_only);
        assert_eq!(update.max_count, 3);
        assert_eq!(update.window_in_minutes, 60);
        assert_eq!(update.enabled_components, "DATANODE");
    }

    #[test]
    fn test_load_errors() {
        let missing = AgentConfig::load(Path::new("/nonexistent/host-agent.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[heartbeat]\nidle_interval_secs = \"soon\"").unwrap();
        assert!(matches!(
            AgentConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[heartbeat]\nidle_interval_secs = 1\nminimum_interval_secs = 5"
        )
        .unwrap();
        assert!(matches!(
            AgentConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_read_agent_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(VERSION_FILE), "1.3.0\n").unwrap();
        assert_eq!(read_agent_version(dir.path()).unwrap(), "1.3.0");

        let empty = tempfile::tempdir().unwrap();
        assert!(read_agent_version(empty.path()).is_err());
    }

    #[test]
    fn test_show_config_round_trip() {
        let config = AgentConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: AgentConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
