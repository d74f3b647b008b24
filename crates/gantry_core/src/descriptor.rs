//! Test descriptors as handed over by test discovery.

use crate::{CoreError, TestId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Duration assumed for a test whose runtime is unknown
pub const DEFAULT_ESTIMATED_MS: u64 = 1_000;

/// Kind of test, as classified by discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    /// Isolated unit tests
    Unit,
    /// Cross-module integration tests
    Integration,
    /// HTTP API tests
    Api,
    /// Browser driven end-to-end tests
    E2e,
    /// Benchmarks and load tests
    Performance,
    /// Data layer tests
    Database,
    /// Smoke checks
    Smoke,
}

impl TestType {
    /// All test types in declaration order
    pub const ALL: [TestType; 7] = [
        TestType::Unit,
        TestType::Integration,
        TestType::Api,
        TestType::E2e,
        TestType::Performance,
        TestType::Database,
        TestType::Smoke,
    ];

    /// Position in the dependency chain database → api → unit →
    /// integration → e2e → performance. Smoke sits outside the chain.
    #[must_use]
    pub const fn canonical_rank(&self) -> Option<usize> {
        match self {
            Self::Database => Some(0),
            Self::Api => Some(1),
            Self::Unit => Some(2),
            Self::Integration => Some(3),
            Self::E2e => Some(4),
            Self::Performance => Some(5),
            Self::Smoke => None,
        }
    }

    /// Lowercase name used in configuration and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Integration => "integration",
            Self::Api => "api",
            Self::E2e => "e2e",
            Self::Performance => "performance",
            Self::Database => "database",
            Self::Smoke => "smoke",
        }
    }

    /// Human readable label ("Unit", "E2E", ...)
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unit => "Unit",
            Self::Integration => "Integration",
            Self::Api => "API",
            Self::E2e => "E2E",
            Self::Performance => "Performance",
            Self::Database => "Database",
            Self::Smoke => "Smoke",
        }
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit" => Ok(Self::Unit),
            "integration" => Ok(Self::Integration),
            "api" => Ok(Self::Api),
            "e2e" => Ok(Self::E2e),
            "performance" => Ok(Self::Performance),
            "database" => Ok(Self::Database),
            "smoke" => Ok(Self::Smoke),
            other => Err(CoreError::Validation {
                field: "type".to_string(),
                reason: format!("unknown test type '{}'", other),
            }),
        }
    }
}

/// A discovered test. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDescriptor {
    /// Discovery-assigned id
    pub id: TestId,
    /// Absolute path of the test file
    pub file: PathBuf,
    /// Path relative to the project root
    pub relative_path: String,
    /// Test classification
    #[serde(rename = "type")]
    pub test_type: TestType,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Estimated runtime in milliseconds
    #[serde(default, rename = "estimatedTime")]
    pub estimated_time_ms: Option<u64>,
}

impl TestDescriptor {
    /// Create a descriptor whose relative path equals its file path
    #[must_use]
    pub fn new(id: impl Into<TestId>, file: impl Into<PathBuf>, test_type: TestType) -> Self {
        let file = file.into();
        Self {
            id: id.into(),
            relative_path: file.display().to_string(),
            file,
            test_type,
            tags: Vec::new(),
            estimated_time_ms: None,
        }
    }

    /// Set relative path
    #[must_use]
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set estimated runtime
    #[must_use]
    pub fn with_estimated_ms(mut self, ms: u64) -> Self {
        self.estimated_time_ms = Some(ms);
        self
    }

    /// Estimated runtime, defaulting to [`DEFAULT_ESTIMATED_MS`]
    #[must_use]
    pub fn estimated_ms(&self) -> u64 {
        self.estimated_time_ms.unwrap_or(DEFAULT_ESTIMATED_MS)
    }

    /// File name component of the test file
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// File name without any extension (`api-proxy.test.js` → `api-proxy`)
    #[must_use]
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        name.split('.').next().unwrap_or(name)
    }

    /// Directory holding the test file
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.file.parent()
    }

    /// Whether the descriptor carries the given tag
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
