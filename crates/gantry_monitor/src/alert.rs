//! Alerts and the rules that raise them.

use crate::event::{PerformanceIssue, ResourceWarningEvent, TestCompleted, TestStatus};
use gantry_core::{AlertId, MonitorConfig, TestId, Timestamp};
use serde::{Deserialize, Serialize};

/// What triggered an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// Test took longer than the slow threshold
    SlowTest,
    /// Test failed
    TestFailure,
    /// Test used more memory than the threshold
    HighMemory,
    /// Resource bucket above its warning ratio
    ResourceWarning,
    /// Performance issue reported by the executor
    PerformanceIssue,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Info,
    /// Needs attention
    Warning,
    /// Something broke
    Error,
}

/// An alert before it is numbered and stamped
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    /// Trigger
    pub kind: AlertKind,
    /// Severity
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// Test concerned
    pub test_id: Option<TestId>,
}

/// A raised alert. Only `resolved` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Monotonic id
    pub id: AlertId,
    /// Trigger
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Severity
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// Test concerned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestId>,
    /// When it was raised
    pub timestamp: Timestamp,
    /// Set by explicit resolution
    pub resolved: bool,
}

impl Alert {
    pub(crate) fn from_draft(id: AlertId, draft: AlertDraft) -> Self {
        Self {
            id,
            kind: draft.kind,
            severity: draft.severity,
            message: draft.message,
            test_id: draft.test_id,
            timestamp: Timestamp::now(),
            resolved: false,
        }
    }
}

/// Thresholds for test-completed alerts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertRules {
    /// Duration above which a test is slow
    pub slow_test_ms: u64,
    /// Memory above which a test is flagged
    pub high_memory_mb: f64,
}

impl Default for AlertRules {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl AlertRules {
    /// Rules from monitor configuration
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            slow_test_ms: config.slow_test_ms,
            high_memory_mb: config.high_memory_mb,
        }
    }

    /// Alerts for one completed test, at most one per rule
    #[must_use]
    pub fn evaluate(&self, event: &TestCompleted) -> Vec<AlertDraft> {
        let mut drafts = Vec::new();
        if event.duration_ms > self.slow_test_ms {
            drafts.push(AlertDraft {
                kind: AlertKind::SlowTest,
                severity: Severity::Warning,
                message: format!(
                    "Test {} took {} ms (threshold {} ms)",
                    event.test_id, event.duration_ms, self.slow_test_ms
                ),
                test_id: Some(event.test_id.clone()),
            });
        }
        if event.status == TestStatus::Failed {
            let reason = event.error.as_deref().unwrap_or("no error message");
            drafts.push(AlertDraft {
                kind: AlertKind::TestFailure,
                severity: Severity::Error,
                message: format!("Test {} failed: {}", event.test_id, reason),
                test_id: Some(event.test_id.clone()),
            });
        }
        if let Some(memory) = event.memory_mb.filter(|m| *m > self.high_memory_mb) {
            drafts.push(AlertDraft {
                kind: AlertKind::HighMemory,
                severity: Severity::Warning,
                message: format!(
                    "Test {} used {:.1} MB (threshold {:.1} MB)",
                    event.test_id, memory, self.high_memory_mb
                ),
                test_id: Some(event.test_id.clone()),
            });
        }
        drafts
    }
}

impl From<&ResourceWarningEvent> for AlertDraft {
    fn from(event: &ResourceWarningEvent) -> Self {
        Self {
            kind: AlertKind::ResourceWarning,
            severity: Severity::Warning,
            message: format!(
                "Resource {} at {:.0}% (threshold {:.0}%)",
                event.resource,
                event.ratio * 100.0,
                event.threshold * 100.0
            ),
            test_id: None,
        }
    }
}

impl From<&PerformanceIssue> for AlertDraft {
    fn from(event: &PerformanceIssue) -> Self {
        let subject = event
            .test_id
            .as_ref()
            .map_or_else(String::new, |id| format!(" in {}", id));
        Self {
            kind: AlertKind::PerformanceIssue,
            severity: Severity::Warning,
            message: format!(
                "Performance issue{}: {} = {} (threshold {})",
                subject, event.metric, event.value, event.threshold
            ),
            test_id: event.test_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slow_test_rule() {
        let rules = AlertRules::default();
        assert!(rules.evaluate(&TestCompleted::passed("t", 10_000)).is_empty());
        let drafts = rules.evaluate(&TestCompleted::passed("t", 10_001));
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, AlertKind::SlowTest);
        assert_eq!(drafts[0].severity, Severity::Warning);
    }

    #[test]
    fn test_failure_and_memory_rules() {
        let rules = AlertRules::default();
        let event = TestCompleted::failed("t", 10, "assertion").with_memory(150.0);
        let kinds: Vec<_> = rules.evaluate(&event).into_iter().map(|d| (d.kind, d.severity)).collect();
        assert_eq!(
            kinds,
            vec![(AlertKind::TestFailure, Severity::Error), (AlertKind::HighMemory, Severity::Warning)]
        );
    }

    #[test]
    fn test_resource_warning_draft() {
        let draft = AlertDraft::from(&ResourceWarningEvent::new("workers", 1.0, 0.9));
        assert_eq!(draft.kind, AlertKind::ResourceWarning);
        assert_eq!(draft.message, "Resource workers at 100% (threshold 90%)");
    }

    #[test]
    fn test_alert_json_shape() {
        let draft = AlertRules::default().evaluate(&TestCompleted::failed("t9", 1, "x")).remove(0);
        let alert = Alert::from_draft(AlertId::first(), draft);
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "test-failure");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["resolved"], false);
    }
}
