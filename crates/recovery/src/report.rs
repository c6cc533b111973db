//! Operator-facing recovery summary sent with every heartbeat.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoverySummary {
    Disabled,
    Recoverable,
    PartiallyRecoverable,
    Unrecoverable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReport {
    pub name: String,
    pub num_attempts: u32,
    pub limit_reached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub summary: RecoverySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_reports: Option<Vec<ComponentReport>>,
}

impl RecoveryReport {
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            summary: RecoverySummary::Disabled,
            component_reports: None,
        }
    }

    /// Summarize per-component reports. No component at its limit is
    /// RECOVERABLE, all of them is UNRECOVERABLE, anything between is
    /// PARTIALLY_RECOVERABLE.
    #[must_use]
    pub fn from_components(reports: Vec<ComponentReport>) -> Self {
        let reached = reports.iter().filter(|r| r.limit_reached).count();
        let summary = if reached == 0 {
            RecoverySummary::Recoverable
        } else if reached == reports.len() {
            RecoverySummary::Unrecoverable
        } else {
            RecoverySummary::PartiallyRecoverable
        };

        Self {
            summary,
            component_reports: Some(reports),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, limit_reached: bool) -> ComponentReport {
        ComponentReport {
            name: name.to_string(),
            num_attempts: 1,
            limit_reached,
        }
    }

    #[test]
    fn test_summary() {
        assert_eq!(
            RecoveryReport::from_components(vec![]).summary,
            RecoverySummary::Recoverable
        );
        assert_eq!(
            RecoveryReport::from_components(vec![report("A", false), report("B", true)]).summary,
            RecoverySummary::PartiallyRecoverable
        );
        assert_eq!(
            RecoveryReport::from_components(vec![report("A", true), report("B", true)]).summary,
            RecoverySummary::Unrecoverable
        );
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(RecoveryReport::disabled()).unwrap();
        assert_eq!(json, serde_json::json!({"summary": "DISABLED"}));

        let json =
            serde_json::to_value(RecoveryReport::from_components(vec![report("PUMA", false)]))
                .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "summary": "RECOVERABLE",
                "componentReports": [{"name": "PUMA", "numAttempts": 1, "limitReached": false}]
            })
        );
    }
}
