//! Monitoring report snapshot.

use crate::alert::{Alert, Severity};
use crate::analysis::{PerformanceAnalysis, Trend};
use crate::metrics::MetricsSummary;
use gantry_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Start and end of monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringWindow {
    /// When monitoring started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// When monitoring stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<Timestamp>,
    /// Elapsed ms, up to now while still running
    pub duration_ms: u64,
}

/// Everything the report renderer needs, frozen at generation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringReport {
    /// Generation time
    pub generated_at: Timestamp,
    /// Monitoring window
    pub monitoring: MonitoringWindow,
    /// Aggregated counts
    pub summary: MetricsSummary,
    /// Alerts not yet resolved
    pub alerts: Vec<Alert>,
    /// Alerts raised in total, resolved or not
    pub total_alerts: usize,
    /// Duration statistics and benchmarks
    pub performance: PerformanceAnalysis,
    /// Recent direction of durations
    pub trend: Trend,
}

impl MonitoringReport {
    /// Unresolved alerts at `severity`
    #[must_use]
    pub fn alerts_with(&self, severity: Severity) -> usize {
        self.alerts.iter().filter(|a| a.severity == severity).count()
    }

    /// No failed tests and no unresolved error alerts
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.summary.failed_tests == 0 && self.alerts_with(Severity::Error) == 0
    }
}
