//! Recovery policy and its server-side representation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::window::WindowLimits;

pub const DEFAULT_MAX_COUNT: u32 = 6;
pub const DEFAULT_WINDOW_IN_MINUTES: u32 = 60;
pub const DEFAULT_RETRY_GAP: u32 = 5;
pub const DEFAULT_MAX_LIFETIME_COUNT: u32 = 12;
pub const NO_RECOVERY_TIMESTAMP: i64 = -1;

/// Recovery flavour requested by the server in `recoveryConfig.type`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryType {
    /// Recovery disabled.
    #[default]
    Default,
    /// INSTALL, START, STOP and RESTART.
    Full,
    /// START only.
    AutoStart,
    /// INSTALL and START, no STOP or RESTART.
    AutoInstallStart,
}

impl RecoveryType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Full => "FULL",
            Self::AutoStart => "AUTO_START",
            Self::AutoInstallStart => "AUTO_INSTALL_START",
        }
    }

    /// Parse the wire name. Unrecognized names disable recovery.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "FULL" => Self::Full,
            "AUTO_START" => Self::AutoStart,
            "AUTO_INSTALL_START" => Self::AutoInstallStart,
            _ => Self::Default,
        }
    }
}

impl fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected recovery settings. Any of these leaves recovery disabled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryConfigError {
    #[error("max_count must be a positive number, got {0}")]
    MaxCount(i64),

    #[error("window_in_min must be a positive number, got {0}")]
    Window(i64),

    #[error("retry_gap must be at least 1, got {0}")]
    RetryGap(i64),

    #[error("retry_gap ({retry_gap}) must be smaller than window_in_min ({window_in_minutes})")]
    RetryGapExceedsWindow {
        retry_gap: i64,
        window_in_minutes: i64,
    },

    #[error("max_lifetime_count ({max_lifetime_count}) must be at least max_count ({max_count})")]
    LifetimeBelowMaxCount {
        max_lifetime_count: i64,
        max_count: i64,
    },
}

/// Raw recovery settings, in the order and units the server uses.
///
/// `window_in_minutes` and `retry_gap` are minutes. `enabled_components` is
/// the unparsed comma-separated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub max_count: i64,
    pub window_in_minutes: i64,
    pub retry_gap: i64,
    pub max_lifetime_count: i64,
    pub recovery_enabled: bool,
    pub auto_start_only: bool,
    pub auto_install_start: bool,
    pub enabled_components: String,
    pub recovery_timestamp: i64,
}

impl Default for ConfigUpdate {
    fn default() -> Self {
        Self {
            max_count: i64::from(DEFAULT_MAX_COUNT),
            window_in_minutes: i64::from(DEFAULT_WINDOW_IN_MINUTES),
            retry_gap: i64::from(DEFAULT_RETRY_GAP),
            max_lifetime_count: i64::from(DEFAULT_MAX_LIFETIME_COUNT),
            recovery_enabled: false,
            auto_start_only: false,
            auto_install_start: false,
            enabled_components: String::new(),
            recovery_timestamp: NO_RECOVERY_TIMESTAMP,
        }
    }
}

impl ConfigUpdate {
    /// Settings for a recovery type with default limits.
    #[must_use]
    pub fn for_type(recovery_type: RecoveryType) -> Self {
        Self {
            recovery_enabled: recovery_type != RecoveryType::Default,
            auto_start_only: recovery_type == RecoveryType::AutoStart,
            auto_install_start: recovery_type == RecoveryType::AutoInstallStart,
            ..Self::default()
        }
    }

    /// Translate the `recoveryConfig` block of a registration or heartbeat
    /// response. Missing or malformed fields keep their defaults.
    #[must_use]
    pub fn from_registration(response: Option<&Value>) -> Self {
        let Some(block) = response.and_then(|r| r.get("recoveryConfig")) else {
            return Self::default();
        };

        let recovery_type = block
            .get("type")
            .and_then(Value::as_str)
            .map_or(RecoveryType::Default, RecoveryType::parse);
        let defaults = Self::for_type(recovery_type);

        Self {
            max_count: read_int(block.get("maxCount"), defaults.max_count),
            window_in_minutes: read_int(block.get("windowInMinutes"), defaults.window_in_minutes),
            retry_gap: read_int(block.get("retryGap"), defaults.retry_gap),
            max_lifetime_count: read_int(
                block.get("maxLifetimeCount"),
                defaults.max_lifetime_count,
            ),
            enabled_components: block
                .get("components")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            recovery_timestamp: read_int(block.get("recoveryTimestamp"), NO_RECOVERY_TIMESTAMP),
            ..defaults
        }
    }
}

/// Accept JSON integers and integer strings, otherwise fall back.
fn read_int(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Validated recovery policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryConfig {
    pub max_count: u32,
    pub window_in_minutes: u32,
    pub retry_gap: u32,
    pub max_lifetime_count: u32,
    pub recovery_enabled: bool,
    pub auto_start_only: bool,
    pub auto_install_start: bool,
    pub enabled_components: BTreeSet<String>,
    pub recovery_timestamp: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_COUNT,
            window_in_minutes: DEFAULT_WINDOW_IN_MINUTES,
            retry_gap: DEFAULT_RETRY_GAP,
            max_lifetime_count: DEFAULT_MAX_LIFETIME_COUNT,
            recovery_enabled: false,
            auto_start_only: false,
            auto_install_start: false,
            enabled_components: BTreeSet::new(),
            recovery_timestamp: NO_RECOVERY_TIMESTAMP,
        }
    }
}

impl TryFrom<ConfigUpdate> for RecoveryConfig {
    type Error = RecoveryConfigError;

    fn try_from(update: ConfigUpdate) -> Result<Self, Self::Error> {
        let positive = |value: i64| u32::try_from(value).ok().filter(|v| *v > 0);

        let max_count =
            positive(update.max_count).ok_or(RecoveryConfigError::MaxCount(update.max_count))?;
        let window_in_minutes = positive(update.window_in_minutes)
            .ok_or(RecoveryConfigError::Window(update.window_in_minutes))?;
        let retry_gap =
            positive(update.retry_gap).ok_or(RecoveryConfigError::RetryGap(update.retry_gap))?;
        if retry_gap >= window_in_minutes {
            return Err(RecoveryConfigError::RetryGapExceedsWindow {
                retry_gap: update.retry_gap,
                window_in_minutes: update.window_in_minutes,
            });
        }
        let max_lifetime_count = u32::try_from(update.max_lifetime_count)
            .ok()
            .filter(|v| *v >= max_count)
            .ok_or(RecoveryConfigError::LifetimeBelowMaxCount {
                max_lifetime_count: update.max_lifetime_count,
                max_count: update.max_count,
            })?;

        Ok(Self {
            max_count,
            window_in_minutes,
            retry_gap,
            max_lifetime_count,
            recovery_enabled: update.recovery_enabled,
            auto_start_only: update.auto_start_only,
            auto_install_start: update.auto_install_start,
            enabled_components: parse_components(&update.enabled_components),
            recovery_timestamp: update.recovery_timestamp,
        })
    }
}

/// Split a comma-separated component list, dropping blanks.
#[must_use]
pub fn parse_components(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

impl RecoveryConfig {
    #[must_use]
    pub fn recovery_type(&self) -> RecoveryType {
        match (
            self.recovery_enabled,
            self.auto_start_only,
            self.auto_install_start,
        ) {
            (false, _, _) => RecoveryType::Default,
            (true, true, _) => RecoveryType::AutoStart,
            (true, false, true) => RecoveryType::AutoInstallStart,
            (true, false, false) => RecoveryType::Full,
        }
    }

    /// FULL mode: every transition of the recovery table is allowed.
    #[must_use]
    pub fn is_full(&self) -> bool {
        !self.auto_start_only && !self.auto_install_start
    }

    /// The retry gap is waived in AUTO_START mode.
    #[must_use]
    pub fn retry_gap_enforced(&self) -> bool {
        !self.auto_start_only
    }

    /// Recovery is on and `component` is in the enabled list, or the list is empty.
    #[must_use]
    pub fn configured_for_recovery(&self, component: &str) -> bool {
        self.recovery_enabled
            && (self.enabled_components.is_empty() || self.enabled_components.contains(component))
    }

    #[must_use]
    pub fn limits(&self) -> WindowLimits {
        let retry_gap_secs = if self.retry_gap_enforced() {
            i64::from(self.retry_gap) * 60
        } else {
            0
        };
        WindowLimits {
            max_count: self.max_count,
            window_secs: i64::from(self.window_in_minutes) * 60,
            retry_gap_secs,
            max_lifetime_count: self.max_lifetime_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update(max_count: i64, window: i64, gap: i64, lifetime: i64) -> ConfigUpdate {
        ConfigUpdate {
            max_count,
            window_in_minutes: window,
            retry_gap: gap,
            max_lifetime_count: lifetime,
            recovery_enabled: true,
            ..ConfigUpdate::default()
        }
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            RecoveryConfig::try_from(update(0, 60, 5, 12)),
            Err(RecoveryConfigError::MaxCount(0))
        );
        assert_eq!(
            RecoveryConfig::try_from(update(6, 0, 5, 12)),
            Err(RecoveryConfigError::Window(0))
        );
        assert_eq!(
            RecoveryConfig::try_from(update(6, 60, 0, 12)),
            Err(RecoveryConfigError::RetryGap(0))
        );
        assert!(matches!(
            RecoveryConfig::try_from(update(6, 60, 61, 12)),
            Err(RecoveryConfigError::RetryGapExceedsWindow { .. })
        ));
        assert!(matches!(
            RecoveryConfig::try_from(update(6, 60, 5, 4)),
            Err(RecoveryConfigError::LifetimeBelowMaxCount { .. })
        ));
        assert!(RecoveryConfig::try_from(update(6, 60, 1, 12)).is_ok());
    }

    #[test]
    fn test_limits_in_seconds() {
        let config = RecoveryConfig::try_from(update(2, 5, 1, 4)).unwrap();
        let limits = config.limits();
        assert_eq!(limits.window_secs, 300);
        assert_eq!(limits.retry_gap_secs, 60);

        let auto_start = RecoveryConfig::try_from(ConfigUpdate {
            auto_start_only: true,
            ..update(2, 5, 1, 4)
        })
        .unwrap();
        assert_eq!(auto_start.limits().retry_gap_secs, 0);
        assert_eq!(auto_start.recovery_type(), RecoveryType::AutoStart);
    }

    #[test]
    fn test_configured_for_recovery_parses_list() {
        let config = RecoveryConfig::try_from(ConfigUpdate {
            enabled_components: "A, D, F ".to_string(),
            ..update(5, 5, 1, 11)
        })
        .unwrap();

        assert!(config.configured_for_recovery("A"));
        assert!(!config.configured_for_recovery("B"));
        assert!(!config.configured_for_recovery("C"));
        assert!(config.configured_for_recovery("D"));
        assert!(!config.configured_for_recovery("E"));
        assert!(config.configured_for_recovery("F"));
    }

    #[test]
    fn test_empty_list_means_all_components() {
        let config = RecoveryConfig::try_from(update(5, 5, 1, 11)).unwrap();
        assert!(config.configured_for_recovery("ANYTHING"));

        let disabled = RecoveryConfig::default();
        assert!(!disabled.configured_for_recovery("ANYTHING"));
    }

    #[test]
    fn test_default_update_matches_default_config() {
        let converted = RecoveryConfig::try_from(ConfigUpdate::default()).unwrap();
        assert_eq!(converted, RecoveryConfig::default());
        assert_eq!(converted.max_count, DEFAULT_MAX_COUNT);
        assert_eq!(converted.window_in_minutes, DEFAULT_WINDOW_IN_MINUTES);
        assert_eq!(converted.retry_gap, DEFAULT_RETRY_GAP);
        assert_eq!(converted.max_lifetime_count, DEFAULT_MAX_LIFETIME_COUNT);
    }

    #[test]
    fn test_from_registration_defaults() {
        let expected = ConfigUpdate::default();
        assert_eq!(ConfigUpdate::from_registration(None), expected);
        assert_eq!(ConfigUpdate::from_registration(Some(&json!({}))), expected);
        assert_eq!(
            ConfigUpdate::from_registration(Some(&json!({"recoveryConfig": {"type": "DEFAULT"}}))),
            expected
        );
    }

    #[test]
    fn test_from_registration_types() {
        let full =
            ConfigUpdate::from_registration(Some(&json!({"recoveryConfig": {"type": "FULL"}})));
        assert!(full.recovery_enabled);
        assert!(!full.auto_start_only);
        assert!(!full.auto_install_start);

        let auto_start = ConfigUpdate::from_registration(Some(
            &json!({"recoveryConfig": {"type": "AUTO_START", "max_count": "med"}}),
        ));
        assert_eq!(
            auto_start,
            ConfigUpdate {
                recovery_enabled: true,
                auto_start_only: true,
                ..ConfigUpdate::default()
            }
        );

        let install_start = ConfigUpdate::from_registration(Some(
            &json!({"recoveryConfig": {"type": "AUTO_INSTALL_START", "maxCount": "med"}}),
        ));
        assert_eq!(install_start.max_count, i64::from(DEFAULT_MAX_COUNT));
        assert!(install_start.auto_install_start);
    }

    #[test]
    fn test_from_registration_reads_every_field() {
        let update = ConfigUpdate::from_registration(Some(&json!({
            "recoveryConfig": {
                "type": "AUTO_START",
                "maxCount": "5",
                "windowInMinutes": 20,
                "retryGap": 2,
                "maxLifetimeCount": 5,
                "components": " A,B",
                "recoveryTimestamp": 1
            }
        })));

        assert_eq!(
            update,
            ConfigUpdate {
                max_count: 5,
                window_in_minutes: 20,
                retry_gap: 2,
                max_lifetime_count: 5,
                recovery_enabled: true,
                auto_start_only: true,
                auto_install_start: false,
                enabled_components: " A,B".to_string(),
                recovery_timestamp: 1,
            }
        );
    }
}
