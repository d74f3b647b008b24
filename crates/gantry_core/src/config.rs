//! Layered configuration: defaults, then an optional TOML file, then
//! `GANTRY_*` environment overrides.

use crate::{CoreError, CoreResult, TestType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    /// Planner settings
    pub planner: PlannerConfig,
    /// Resource budget settings
    pub resources: ResourceConfig,
    /// Monitor settings
    pub monitor: MonitorConfig,
    /// Phase executor settings
    pub executor: ExecutorConfig,
}

impl GantryConfig {
    /// Parse from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or values are out of range
    pub fn from_toml_str(raw: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, &e))?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Defaults, overlaid with `path` when given, overlaid with the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns error if the file or an override is invalid
    pub fn resolve(path: Option<&Path>) -> CoreResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GANTRY_*` overrides read through `lookup`
    ///
    /// # Errors
    ///
    /// Returns error if an override does not parse
    pub fn apply_env_with<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strategy) = lookup("GANTRY_STRATEGY") {
            self.planner.default_strategy = strategy;
        }
        if let Some(raw) = lookup("GANTRY_WORKERS_MAX") {
            self.resources.workers_max = raw
                .parse()
                .map_err(|_| CoreError::config("GANTRY_WORKERS_MAX", format!("not a number: {}", raw)))?;
        }
        if let Some(raw) = lookup("GANTRY_MEMORY_MAX_MB") {
            self.resources.memory_max_mb = raw
                .parse()
                .map_err(|_| CoreError::config("GANTRY_MEMORY_MAX_MB", format!("not a number: {}", raw)))?;
        }
        if let Some(dir) = lookup("GANTRY_OUTPUT_DIR") {
            self.monitor.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns the first out-of-range value found
    pub fn validate(&self) -> CoreResult<()> {
        let ratios = [
            ("resources.memory_warn_ratio", self.resources.memory_warn_ratio),
            ("resources.workers_warn_ratio", self.resources.workers_warn_ratio),
            ("resources.connection_warn_ratio", self.resources.connection_warn_ratio),
            ("resources.reclaim_ratio", self.resources.reclaim_ratio),
        ];
        for (field, ratio) in ratios {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(CoreError::config(field, format!("ratio {} outside (0, 1]", ratio)));
            }
        }
        if self.resources.workers_max == 0 {
            return Err(CoreError::config("resources.workers_max", "must be at least 1"));
        }
        if self.resources.sample_interval_ms == 0 {
            return Err(CoreError::config("resources.sample_interval_ms", "must be positive"));
        }
        let p = self.planner.smart_selection.inclusion_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(CoreError::config(
                "planner.smart_selection.inclusion_probability",
                format!("probability {} outside [0, 1]", p),
            ));
        }
        if self.monitor.trend_min_samples < 2 {
            return Err(CoreError::config("monitor.trend_min_samples", "must be at least 2"));
        }
        Ok(())
    }
}

/// Planner settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Strategy used when a caller does not name one
    pub default_strategy: String,
    /// File-name fragments identifying critical tests
    pub critical_tests: Vec<String>,
    /// Latency ceiling for the quick unit phase of the performance strategy
    pub quick_test_ceiling_ms: u64,
    /// Smart selection sampling
    pub smart_selection: SmartSelectionConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_strategy: "fast-feedback".to_string(),
            critical_tests: vec![
                "server.test".to_string(),
                "db.test".to_string(),
                "database.test".to_string(),
                "api-proxy.test".to_string(),
                "apiProxy.test".to_string(),
            ],
            quick_test_ceiling_ms: 1_000,
            smart_selection: SmartSelectionConfig::default(),
        }
    }
}

/// Smart selection sampling of tests unrelated to the change set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartSelectionConfig {
    /// Chance of including an unrelated test
    pub inclusion_probability: f64,
    /// Fixed seed for reproducible selection
    pub seed: Option<u64>,
}

impl Default for SmartSelectionConfig {
    fn default() -> Self {
        Self {
            inclusion_probability: 0.2,
            seed: None,
        }
    }
}

/// Resource budget settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Memory budget in MB
    pub memory_max_mb: u64,
    /// Memory utilization that raises a warning
    pub memory_warn_ratio: f64,
    /// Concurrent worker slots
    pub workers_max: usize,
    /// Worker utilization that raises a warning
    pub workers_warn_ratio: f64,
    /// Named connection pools and their capacity
    pub connections: IndexMap<String, u32>,
    /// Connection utilization that raises a warning
    pub connection_warn_ratio: f64,
    /// Memory utilization after release that requests reclamation
    pub reclaim_ratio: f64,
    /// Sampler period
    pub sample_interval_ms: u64,
    /// Samples kept in memory
    pub history_limit: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        let mut connections = IndexMap::new();
        connections.insert("database".to_string(), 5);
        connections.insert("http".to_string(), 20);
        Self {
            memory_max_mb: 2_048,
            memory_warn_ratio: 0.8,
            workers_max: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4),
            workers_warn_ratio: 0.9,
            connections,
            connection_warn_ratio: 0.8,
            reclaim_ratio: 0.7,
            sample_interval_ms: 1_000,
            history_limit: 100,
        }
    }
}

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directory for logs, benchmarks and reports
    pub output_dir: PathBuf,
    /// Duration above which a test is slow
    pub slow_test_ms: u64,
    /// Memory above which a test raises a high-memory alert
    pub high_memory_mb: f64,
    /// Slow tests kept in the aggregated list
    pub slow_test_limit: usize,
    /// Performance samples kept in memory
    pub history_limit: usize,
    /// Samples considered by trend classification
    pub trend_window: usize,
    /// Samples required before a trend is classified
    pub trend_min_samples: usize,
    /// Relative change (percent) needed to leave `stable`
    pub trend_threshold_pct: f64,
    /// Current/baseline mean ratio that flags a benchmark regression
    pub regression_ratio: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("test-results"),
            slow_test_ms: 10_000,
            high_memory_mb: 100.0,
            slow_test_limit: 10,
            history_limit: 100,
            trend_window: 10,
            trend_min_samples: 5,
            trend_threshold_pct: 5.0,
            regression_ratio: 1.2,
        }
    }
}

/// Resources reserved for one test of a given type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestProfile {
    /// Memory to reserve in MB
    pub memory_mb: u64,
    /// Connections to reserve by pool name
    pub connections: IndexMap<String, u32>,
}

impl RequestProfile {
    /// Profile reserving only memory
    #[must_use]
    pub fn memory(memory_mb: u64) -> Self {
        Self {
            memory_mb,
            connections: IndexMap::new(),
        }
    }

    /// Add a connection reservation
    #[must_use]
    pub fn with_connection(mut self, name: impl Into<String>, count: u32) -> Self {
        self.connections.insert(name.into(), count);
        self
    }
}

impl Default for RequestProfile {
    fn default() -> Self {
        Self::memory(100)
    }
}

/// Phase executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Reservation per test type, keyed by type name
    pub profiles: IndexMap<String, RequestProfile>,
    /// First back-off delay after a refusal
    pub backoff_initial_ms: u64,
    /// Upper bound of the back-off delay
    pub backoff_max_ms: u64,
    /// Give up on admission after this long
    pub admission_timeout_ms: u64,
}

impl ExecutorConfig {
    /// Profile for a test type, falling back to the default profile
    #[must_use]
    pub fn profile_for(&self, test_type: TestType) -> RequestProfile {
        self.profiles
            .get(test_type.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let mut profiles = IndexMap::new();
        profiles.insert(TestType::Unit.as_str().to_string(), RequestProfile::memory(64));
        profiles.insert(
            TestType::Integration.as_str().to_string(),
            RequestProfile::memory(128).with_connection("http", 1),
        );
        profiles.insert(
            TestType::Api.as_str().to_string(),
            RequestProfile::memory(128).with_connection("http", 1),
        );
        profiles.insert(
            TestType::E2e.as_str().to_string(),
            RequestProfile::memory(512).with_connection("http", 1),
        );
        profiles.insert(TestType::Performance.as_str().to_string(), RequestProfile::memory(256));
        profiles.insert(
            TestType::Database.as_str().to_string(),
            RequestProfile::memory(128).with_connection("database", 1),
        );
        profiles.insert(TestType::Smoke.as_str().to_string(), RequestProfile::memory(64));
        Self {
            profiles,
            backoff_initial_ms: 25,
            backoff_max_ms: 1_000,
            admission_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_validate() {
        let config = GantryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.planner.default_strategy, "fast-feedback");
        assert_eq!(config.resources.connections["database"], 5);
        assert!(config.resources.workers_max >= 1);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let raw = r#"
            [resources]
            workers_max = 2
            memory_warn_ratio = 0.5

            [resources.connections]
            database = 1

            [planner.smart_selection]
            seed = 7
        "#;
        let config = GantryConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.resources.workers_max, 2);
        assert_eq!(config.resources.memory_warn_ratio, 0.5);
        assert_eq!(config.resources.memory_max_mb, 2_048);
        assert_eq!(config.resources.connections.len(), 1);
        assert_eq!(config.planner.smart_selection.seed, Some(7));
        assert_eq!(config.planner.smart_selection.inclusion_probability, 0.2);
        assert_eq!(config.monitor.slow_test_ms, 10_000);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let raw = "[resources]\nmemory_warn_ratio = 1.5\n";
        let err = GantryConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, CoreError::Config { ref field, .. } if field == "resources.memory_warn_ratio"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let raw = "[resources]\nworkers_max = 0\n";
        assert!(GantryConfig::from_toml_str(raw).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GANTRY_STRATEGY", "smoke"),
            ("GANTRY_WORKERS_MAX", "3"),
            ("GANTRY_OUTPUT_DIR", "/tmp/out"),
        ]
        .into_iter()
        .collect();

        let mut config = GantryConfig::default();
        config
            .apply_env_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.planner.default_strategy, "smoke");
        assert_eq!(config.resources.workers_max, 3);
        assert_eq!(config.monitor.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_env_override_must_parse() {
        let mut config = GantryConfig::default();
        let err = config
            .apply_env_with(|key| (key == "GANTRY_MEMORY_MAX_MB").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config { .. }));
    }

    #[test]
    fn test_profile_lookup() {
        let config = ExecutorConfig::default();
        let db = config.profile_for(TestType::Database);
        assert_eq!(db.connections["database"], 1);

        let empty = ExecutorConfig {
            profiles: IndexMap::new(),
            ..ExecutorConfig::default()
        };
        assert_eq!(empty.profile_for(TestType::Unit), RequestProfile::memory(100));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gantry.toml");
        std::fs::write(&path, "[monitor]\nslow_test_ms = 500\n").unwrap();
        let config = GantryConfig::resolve(Some(&path)).unwrap();
        assert_eq!(config.monitor.slow_test_ms, 500);
    }
}
