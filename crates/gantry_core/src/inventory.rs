//! Discovered test pool and dependency graph.

use crate::{CoreError, CoreResult, TestDescriptor, TestId};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// All discovered tests keyed by id, in discovery order
pub type TestPool = IndexMap<TestId, TestDescriptor>;

/// Mapping from test id to the ids it depends on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: IndexMap<TestId, IndexSet<TestId>>,
}

impl DependencyGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `test` depends on `dependency`
    pub fn add_dependency(&mut self, test: impl Into<TestId>, dependency: impl Into<TestId>) {
        self.edges
            .entry(test.into())
            .or_default()
            .insert(dependency.into());
    }

    /// Builder form of [`DependencyGraph::add_dependency`]
    #[must_use]
    pub fn with_dependency(mut self, test: impl Into<TestId>, dependency: impl Into<TestId>) -> Self {
        self.add_dependency(test, dependency);
        self
    }

    /// Dependencies declared by `test`
    #[must_use]
    pub fn dependencies_of(&self, test: &TestId) -> Vec<&TestId> {
        self.edges
            .get(test)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Whether `test` declares `dependency`
    #[must_use]
    pub fn depends_on(&self, test: &TestId, dependency: &TestId) -> bool {
        self.edges
            .get(test)
            .is_some_and(|deps| deps.contains(dependency))
    }

    /// Number of tests with at least one declared dependency
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether no dependencies are declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.values().all(IndexSet::is_empty)
    }
}

/// Document exchanged with test discovery: the tests plus their dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInventory {
    /// Discovered tests
    pub tests: Vec<TestDescriptor>,
    /// Declared dependencies
    #[serde(default)]
    pub dependencies: DependencyGraph,
}

impl TestInventory {
    /// Parse an inventory from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or ids are duplicated
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let inventory: Self = serde_json::from_str(json)?;
        inventory.check_unique()?;
        Ok(inventory)
    }

    /// Load an inventory file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, &e))?;
        let inventory = Self::from_json(&raw)?;
        tracing::debug!(
            path = %path.display(),
            tests = inventory.tests.len(),
            "loaded test inventory"
        );
        Ok(inventory)
    }

    fn check_unique(&self) -> CoreResult<()> {
        let mut seen = IndexSet::new();
        for test in &self.tests {
            if !seen.insert(&test.id) {
                return Err(CoreError::AlreadyExists {
                    kind: "Test".to_string(),
                    id: test.id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Tests keyed by id
    #[must_use]
    pub fn pool(&self) -> TestPool {
        self.tests
            .iter()
            .map(|test| (test.id.clone(), test.clone()))
            .collect()
    }
}
