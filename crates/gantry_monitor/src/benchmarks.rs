//! Per-type duration baselines persisted across runs in `benchmarks.json`.

use crate::error::{MonitorError, MonitorResult};
use gantry_core::{TestType, Timestamp};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Duration statistics of one run for one type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    /// Observed durations
    pub samples: u64,
    /// Mean in ms
    pub mean_ms: f64,
    /// Fastest in ms
    pub min_ms: u64,
    /// Slowest in ms
    pub max_ms: u64,
}

impl RunStats {
    /// Statistics over `durations`, `None` when empty
    #[must_use]
    pub fn of(durations: &[u64]) -> Option<Self> {
        let min_ms = *durations.iter().min()?;
        let max_ms = *durations.iter().max()?;
        let total: u64 = durations.iter().sum();
        Some(Self {
            samples: durations.len() as u64,
            mean_ms: total as f64 / durations.len() as f64,
            min_ms,
            max_ms,
        })
    }
}

/// Historical baseline for one type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    /// Runs folded into the baseline
    pub runs: u64,
    /// Durations folded into the baseline
    pub samples: u64,
    /// Sample-weighted mean in ms
    pub mean_ms: f64,
    /// Fastest ever in ms
    pub min_ms: u64,
    /// Slowest ever in ms
    pub max_ms: u64,
    /// Last merge
    pub updated_at: Timestamp,
}

impl Benchmark {
    fn from_run(stats: &RunStats) -> Self {
        Self {
            runs: 1,
            samples: stats.samples,
            mean_ms: stats.mean_ms,
            min_ms: stats.min_ms,
            max_ms: stats.max_ms,
            updated_at: Timestamp::now(),
        }
    }

    fn merge(&mut self, stats: &RunStats) {
        let samples = self.samples + stats.samples;
        if samples > 0 {
            self.mean_ms = (self.mean_ms * self.samples as f64 + stats.mean_ms * stats.samples as f64)
                / samples as f64;
        }
        self.runs += 1;
        self.samples = samples;
        self.min_ms = self.min_ms.min(stats.min_ms);
        self.max_ms = self.max_ms.max(stats.max_ms);
        self.updated_at = Timestamp::now();
    }
}

/// Baselines keyed by type, backed by a JSON file
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkStore {
    path: PathBuf,
    baselines: IndexMap<TestType, Benchmark>,
}

impl BenchmarkStore {
    /// Empty store writing to `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baselines: IndexMap::new(),
        }
    }

    /// Load `path`. A missing file gives an empty store.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> MonitorResult<Self> {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new(path)),
            Err(err) => return Err(MonitorError::io(&path, err)),
        };
        let baselines = serde_json::from_str(&raw).map_err(|e| MonitorError::encoding(&path, e))?;
        Ok(Self { path, baselines })
    }

    /// Load `path`, or start empty if it is unreadable
    #[must_use]
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::load(&path) {
            Ok(store) => store,
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable benchmarks");
                Self::new(path)
            }
        }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Baseline for a type
    #[must_use]
    pub fn get(&self, test_type: TestType) -> Option<&Benchmark> {
        self.baselines.get(&test_type)
    }

    /// All baselines
    #[must_use]
    pub fn baselines(&self) -> &IndexMap<TestType, Benchmark> {
        &self.baselines
    }

    /// Fold a run's statistics into the baselines
    pub fn merge_run(&mut self, run: &IndexMap<TestType, RunStats>) {
        for (test_type, stats) in run {
            match self.baselines.get_mut(test_type) {
                Some(baseline) => baseline.merge(stats),
                None => {
                    self.baselines.insert(*test_type, Benchmark::from_run(stats));
                }
            }
        }
    }

    /// Write the baselines, creating the parent directory
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self) -> MonitorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&self.baselines)
            .map_err(|e| MonitorError::encoding(&self.path, e))?;
        std::fs::write(&self.path, json).map_err(|e| MonitorError::io(&self.path, e))
    }
}
