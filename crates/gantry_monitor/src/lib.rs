//! gantry test monitor
//!
//! Collects test and phase lifecycle events from the executor, keeps running
//! metrics, raises alerts, appends JSON-lines logs and produces a monitoring
//! report with duration statistics, benchmark comparisons and a trend.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alert;
pub mod analysis;
pub mod benchmarks;
pub mod error;
pub mod event;
pub mod log;
pub mod metrics;
pub mod monitor;
pub mod report;

pub use alert::{Alert, AlertDraft, AlertKind, AlertRules, Severity};
pub use analysis::{
    BenchmarkComparison, DurationStats, PerformanceAnalysis, Trend, TrendClass, TrendRule,
    compare_benchmarks, median, percentile,
};
pub use benchmarks::{Benchmark, BenchmarkStore, RunStats};
pub use error::{MonitorError, MonitorResult};
pub use event::{
    MonitorEvent, PerformanceIssue, PhaseCompleted, ResourceWarningEvent, TestCompleted, TestStatus,
};
pub use log::JsonlLog;
pub use metrics::{DurationSample, MetricsAggregator, MetricsSummary, PhaseMetrics, SlowTest, TypeCounts};
pub use monitor::{ALERT_LOG, BENCHMARKS_FILE, PHASE_LOG, REPORT_FILE, TEST_LOG, TestMonitor};
pub use report::{MonitoringReport, MonitoringWindow};
