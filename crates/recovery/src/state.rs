//! Component lifecycle states as reported by the agent and requested by the server.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a host component.
///
/// Only the four states the recovery table reasons about get their own
/// variant. Anything else, including the empty string the server uses for
/// "no opinion", is carried opaquely in [`ComponentState::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComponentState {
    Init,
    Installed,
    InstallFailed,
    Started,
    Unknown(String),
}

impl ComponentState {
    /// State reported for a running component.
    pub const LIVE: Self = Self::Started;
    /// State reported for a stopped but installed component.
    pub const DEAD: Self = Self::Installed;

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "INIT",
            Self::Installed => "INSTALLED",
            Self::InstallFailed => "INSTALL_FAILED",
            Self::Started => "STARTED",
            Self::Unknown(other) => other,
        }
    }

    /// Whether this is one of the states the recovery table knows about.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl Default for ComponentState {
    fn default() -> Self {
        Self::Unknown(String::new())
    }
}

impl From<&str> for ComponentState {
    fn from(value: &str) -> Self {
        match value {
            "INIT" => Self::Init,
            "INSTALLED" => Self::Installed,
            "INSTALL_FAILED" => Self::InstallFailed,
            "STARTED" => Self::Started,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for ComponentState {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ComponentState> for String {
    fn from(value: ComponentState) -> Self {
        match value {
            ComponentState::Unknown(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reported vs. requested state of one component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub current: ComponentState,
    pub desired: ComponentState,
    pub stale_config: bool,
}
