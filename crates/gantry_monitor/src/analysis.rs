//! Duration statistics and trend classification.

use crate::benchmarks::{Benchmark, BenchmarkStore, RunStats};
use crate::metrics::{DurationSample, SlowTest};
use gantry_core::{MonitorConfig, TestType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Nearest-rank percentile of sorted `values`, 0 when empty
#[must_use]
pub fn percentile(sorted: &[u64], pct: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len() as f64 / 100.0).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Median of sorted `values`, 0 when empty
#[must_use]
pub fn median(sorted: &[u64]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2] as f64,
        n => (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0,
    }
}

fn mean(values: impl Iterator<Item = u64>) -> f64 {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum as f64 / count as f64 }
}

/// Summary statistics over every observed duration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationStats {
    /// Observed durations
    pub count: usize,
    /// Mean in ms
    pub mean_ms: f64,
    /// Median in ms
    pub median_ms: f64,
    /// 95th percentile in ms
    pub p95_ms: u64,
    /// 99th percentile in ms
    pub p99_ms: u64,
}

impl DurationStats {
    /// Statistics over `durations` in any order
    #[must_use]
    pub fn of(durations: &[u64]) -> Self {
        let mut sorted = durations.to_vec();
        sorted.sort_unstable();
        Self {
            count: sorted.len(),
            mean_ms: mean(sorted.iter().copied()),
            median_ms: median(&sorted),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        }
    }
}

/// This run against the stored baseline for one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkComparison {
    /// This run
    pub current: RunStats,
    /// Stored baseline, none on the first run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<Benchmark>,
    /// Percent change of the mean against the baseline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_pct: Option<f64>,
    /// Current mean above baseline × regression ratio
    pub regression: bool,
}

/// Per-type comparisons for the run
#[must_use]
pub fn compare_benchmarks(
    by_type: &IndexMap<TestType, Vec<u64>>,
    store: &BenchmarkStore,
    regression_ratio: f64,
) -> IndexMap<TestType, BenchmarkComparison> {
    by_type
        .iter()
        .filter_map(|(test_type, durations)| {
            let current = RunStats::of(durations)?;
            let baseline = store.get(*test_type).copied();
            let change_pct = baseline
                .filter(|b| b.mean_ms > 0.0)
                .map(|b| (current.mean_ms - b.mean_ms) / b.mean_ms * 100.0);
            let regression = baseline.is_some_and(|b| current.mean_ms > b.mean_ms * regression_ratio);
            Some((
                *test_type,
                BenchmarkComparison {
                    current,
                    baseline,
                    change_pct,
                    regression,
                },
            ))
        })
        .collect()
}

/// Coarse direction of recent durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendClass {
    /// Within the threshold
    Stable,
    /// Getting slower
    Degrading,
    /// Getting faster
    Improving,
    /// Too few samples
    InsufficientData,
}

/// Trend over the last samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    /// Classification
    pub trend: TrendClass,
    /// Percent change of the second half mean over the first half, positive
    /// when slower
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    /// Samples considered
    pub samples: usize,
}

/// Window and threshold for trend classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendRule {
    /// Trailing samples considered
    pub window: usize,
    /// Minimum samples to classify
    pub min_samples: usize,
    /// Percent change needed to leave stable
    pub threshold_pct: f64,
}

impl TrendRule {
    /// Rule from monitor configuration
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            window: config.trend_window,
            min_samples: config.trend_min_samples,
            threshold_pct: config.trend_threshold_pct,
        }
    }

    /// Compare the mean of the first and second half of the trailing window
    #[must_use]
    pub fn classify(&self, history: &[DurationSample]) -> Trend {
        let start = history.len().saturating_sub(self.window);
        let window = &history[start..];
        if window.len() < self.min_samples.max(2) {
            return Trend {
                trend: TrendClass::InsufficientData,
                change: None,
                samples: window.len(),
            };
        }

        let (first, second) = window.split_at(window.len() / 2);
        let before = mean(first.iter().map(|s| s.duration_ms));
        let after = mean(second.iter().map(|s| s.duration_ms));
        let change = if before > 0.0 {
            (after - before) / before * 100.0
        } else if after > 0.0 {
            100.0
        } else {
            0.0
        };

        let trend = if change > self.threshold_pct {
            TrendClass::Degrading
        } else if change < -self.threshold_pct {
            TrendClass::Improving
        } else {
            TrendClass::Stable
        };
        Trend {
            trend,
            change: Some(change),
            samples: window.len(),
        }
    }
}

impl Default for TrendRule {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Derived performance figures for the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceAnalysis {
    /// Statistics over all durations
    pub durations: DurationStats,
    /// Slowest tests, slowest first
    pub slow_tests: Vec<SlowTest>,
    /// Per-type comparison with stored baselines
    pub benchmarks: IndexMap<TestType, BenchmarkComparison>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::Timestamp;

    fn samples(values: &[u64]) -> Vec<DurationSample> {
        values
            .iter()
            .map(|&duration_ms| DurationSample {
                timestamp: Timestamp::now(),
                duration_ms,
            })
            .collect()
    }

    #[test]
    fn test_percentiles() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 95.0), 95);
        assert_eq!(percentile(&sorted, 99.0), 99);
        assert_eq!(percentile(&[7], 99.0), 7);
        assert_eq!(percentile(&[], 50.0), 0);
        assert_eq!(median(&[1, 3]), 2.0);
        assert_eq!(median(&[1, 2, 9]), 2.0);
    }

    #[test]
    fn test_duration_stats_unsorted_input() {
        let stats = DurationStats::of(&[300, 100, 200]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean_ms, 200.0);
        assert_eq!(stats.median_ms, 200.0);
        assert_eq!(stats.p99_ms, 300);
    }

    #[test]
    fn test_trend_insufficient() {
        let trend = TrendRule::default().classify(&samples(&[100, 100, 100, 100]));
        assert_eq!(trend.trend, TrendClass::InsufficientData);
        assert_eq!(trend.change, None);
        assert_eq!(trend.samples, 4);
    }

    #[test]
    fn test_trend_degrading_improving_stable() {
        let rule = TrendRule::default();
        let degrading = rule.classify(&samples(&[100, 100, 100, 100, 100, 120, 120, 120, 120, 120]));
        assert_eq!(degrading.trend, TrendClass::Degrading);
        assert!((degrading.change.unwrap() - 20.0).abs() < 1e-9);

        let improving = rule.classify(&samples(&[100, 100, 100, 100, 100, 80, 80, 80, 80, 80]));
        assert_eq!(improving.trend, TrendClass::Improving);

        let stable = rule.classify(&samples(&[100, 100, 100, 100, 100, 104, 104, 104, 104, 104]));
        assert_eq!(stable.trend, TrendClass::Stable);
    }

    #[test]
    fn test_trend_uses_trailing_window() {
        // old fast samples fall out of the window
        let mut values = vec![1u64; 20];
        values.extend([200u64; 10]);
        let trend = TrendRule::default().classify(&samples(&values));
        assert_eq!(trend.trend, TrendClass::Stable);
        assert_eq!(trend.samples, 10);
    }

    #[test]
    fn test_compare_benchmarks_flags_regression() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BenchmarkStore::new(dir.path().join("b.json"));
        let mut baseline = IndexMap::new();
        baseline.insert(TestType::Unit, RunStats::of(&[100]).unwrap());
        baseline.insert(TestType::Api, RunStats::of(&[100]).unwrap());
        store.merge_run(&baseline);

        let mut by_type = IndexMap::new();
        by_type.insert(TestType::Unit, vec![130]);
        by_type.insert(TestType::Api, vec![110]);
        by_type.insert(TestType::E2e, vec![5_000]);

        let cmp = compare_benchmarks(&by_type, &store, 1.2);
        assert!(cmp[&TestType::Unit].regression);
        assert!(!cmp[&TestType::Api].regression);
        assert!((cmp[&TestType::Api].change_pct.unwrap() - 10.0).abs() < 1e-9);
        assert!(cmp[&TestType::E2e].baseline.is_none());
        assert!(!cmp[&TestType::E2e].regression);
    }
}
