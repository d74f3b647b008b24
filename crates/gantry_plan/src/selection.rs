//! Critical-test predicate and change-based test selection.

use gantry_core::{SmartSelectionConfig, TestDescriptor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};

/// Whether the test's file name contains one of the critical fragments
#[must_use]
pub fn is_critical(test: &TestDescriptor, critical: &[String]) -> bool {
    let name = test.file_name();
    critical.iter().any(|fragment| name.contains(fragment.as_str()))
}

/// Files touched by the change under test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    files: Vec<PathBuf>,
}

impl ChangeSet {
    /// Build from changed paths
    #[must_use]
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether nothing changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// A test is related to the change if its own file changed, a file in
    /// the same directory changed, or a changed file shares its stem
    /// (`routes/apod.js` relates to `apod.test.js`).
    #[must_use]
    pub fn touches(&self, test: &TestDescriptor) -> bool {
        let relative = Path::new(&test.relative_path);
        self.files.iter().any(|changed| {
            if changed == &test.file || changed == relative {
                return true;
            }
            let changed_dir = changed.parent().filter(|d| !d.as_os_str().is_empty());
            if let Some(dir) = changed_dir {
                if relative.parent() == Some(dir) || test.directory() == Some(dir) {
                    return true;
                }
            }
            changed
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.split('.').next())
                .is_some_and(|stem| !stem.is_empty() && stem == test.stem())
        })
    }
}

/// Smart selection: every critical test and every test related to the
/// change set, plus each remaining test with the configured probability.
pub struct SmartSelector<'a> {
    critical: &'a [String],
    config: &'a SmartSelectionConfig,
}

impl<'a> SmartSelector<'a> {
    /// Create a selector
    #[must_use]
    pub fn new(critical: &'a [String], config: &'a SmartSelectionConfig) -> Self {
        Self { critical, config }
    }

    /// Select from `tests`, keeping their order
    #[must_use]
    pub fn select(&self, tests: &[TestDescriptor], changes: &ChangeSet) -> Vec<TestDescriptor> {
        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let p = self.config.inclusion_probability.clamp(0.0, 1.0);

        let selected: Vec<_> = tests
            .iter()
            .filter(|test| {
                is_critical(test, self.critical) || changes.touches(test) || rng.gen_bool(p)
            })
            .cloned()
            .collect();

        tracing::debug!(
            candidates = tests.len(),
            selected = selected.len(),
            changed = changes.files.len(),
            "smart selection"
        );
        selected
    }
}
