//! Test filters.
//!
//! A filter is a conjunction of optional criteria. A list of filters is again
//! a conjunction: a test is kept only if every filter accepts it.

use crate::error::{PlanError, PlanResult};
use gantry_core::{TestDescriptor, TestPool, TestType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Criteria a test must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestFilter {
    /// Test type must be equal
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub test_type: Option<TestType>,
    /// Substring of the test path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Tags that must all be present
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Largest estimated runtime accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u64>,
}

impl TestFilter {
    /// Filter matching a single type
    #[must_use]
    pub fn of_type(test_type: TestType) -> Self {
        Self {
            test_type: Some(test_type),
            ..Self::default()
        }
    }

    /// Require a path substring
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Require a tag
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Cap estimated runtime
    #[must_use]
    pub fn with_max_duration(mut self, ms: u64) -> Self {
        self.max_duration = Some(ms);
        self
    }

    /// Whether `test` satisfies every criterion
    #[must_use]
    pub fn matches(&self, test: &TestDescriptor) -> bool {
        if let Some(test_type) = self.test_type {
            if test.test_type != test_type {
                return false;
            }
        }
        if let Some(pattern) = &self.pattern {
            let in_relative = test.relative_path.contains(pattern.as_str());
            let in_file = test.file.to_string_lossy().contains(pattern.as_str());
            if !in_relative && !in_file {
                return false;
            }
        }
        if !self.tags.iter().all(|tag| test.has_tag(tag)) {
            return false;
        }
        if let Some(max) = self.max_duration {
            if test.estimated_ms() > max {
                return false;
            }
        }
        true
    }
}

/// Parses either a bare type name (`unit`) or comma separated criteria
/// (`type=api,pattern=routes/,tag=fast,max-duration=5000`).
impl FromStr for TestFilter {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PlanError::InvalidFilter {
                reason: "empty filter".to_string(),
            });
        }
        if !s.contains('=') {
            return parse_type(s).map(Self::of_type);
        }

        let mut filter = Self::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| PlanError::InvalidFilter {
                reason: format!("expected key=value, got '{}'", part),
            })?;
            match key.trim() {
                "type" => filter.test_type = Some(parse_type(value)?),
                "pattern" => filter.pattern = Some(value.to_string()),
                "tag" | "tags" => filter
                    .tags
                    .extend(value.split('+').map(str::to_string)),
                "max-duration" | "maxDuration" => {
                    let ms = value.parse().map_err(|_| PlanError::InvalidFilter {
                        reason: format!("max-duration must be milliseconds, got '{}'", value),
                    })?;
                    filter.max_duration = Some(ms);
                }
                other => {
                    return Err(PlanError::InvalidFilter {
                        reason: format!("unknown filter key '{}'", other),
                    });
                }
            }
        }
        Ok(filter)
    }
}

fn parse_type(raw: &str) -> PlanResult<TestType> {
    raw.parse().map_err(|_| PlanError::InvalidFilter {
        reason: format!("unknown test type '{}'", raw),
    })
}

/// A filter as written by callers: a bare type name or full criteria
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    /// Shorthand for type equality
    Type(String),
    /// Full criteria
    Criteria(TestFilter),
}

impl FilterSpec {
    /// Resolve into criteria
    ///
    /// # Errors
    ///
    /// Returns error if the shorthand names an unknown type
    pub fn resolve(&self) -> PlanResult<TestFilter> {
        match self {
            Self::Type(name) => parse_type(name).map(TestFilter::of_type),
            Self::Criteria(filter) => Ok(filter.clone()),
        }
    }
}

impl From<TestFilter> for FilterSpec {
    fn from(filter: TestFilter) -> Self {
        Self::Criteria(filter)
    }
}

impl From<TestType> for FilterSpec {
    fn from(test_type: TestType) -> Self {
        Self::Criteria(TestFilter::of_type(test_type))
    }
}

/// Tests in `pool` accepted by every filter, in pool order
#[must_use]
pub fn filter_tests(pool: &TestPool, filters: &[TestFilter]) -> Vec<TestDescriptor> {
    pool.values()
        .filter(|test| filters.iter().all(|f| f.matches(test)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::TestId;

    fn pool() -> TestPool {
        let tests = vec![
            TestDescriptor::new("u1", "tests/unit/math.test.js", TestType::Unit)
                .with_tag("fast")
                .with_estimated_ms(200),
            TestDescriptor::new("u2", "tests/unit/routes/apod.test.js", TestType::Unit)
                .with_tag("fast")
                .with_tag("routes")
                .with_estimated_ms(4_000),
            TestDescriptor::new("a1", "tests/api/routes/neo.test.js", TestType::Api).with_tag("routes"),
            TestDescriptor::new("e1", "tests/e2e/home.spec.js", TestType::E2e).with_estimated_ms(9_000),
        ];
        tests.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    fn ids(tests: &[TestDescriptor]) -> Vec<&str> {
        tests.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_no_filters_keeps_all() {
        assert_eq!(filter_tests(&pool(), &[]).len(), 4);
    }

    #[test]
    fn test_type_filter() {
        let got = filter_tests(&pool(), &[TestFilter::of_type(TestType::Unit)]);
        assert_eq!(ids(&got), vec!["u1", "u2"]);
    }

    #[test]
    fn test_pattern_and_tags() {
        let filter = TestFilter::default().with_pattern("routes/").with_tag("routes");
        assert_eq!(ids(&filter_tests(&pool(), &[filter])), vec!["u2", "a1"]);

        let both = TestFilter::default().with_tag("fast").with_tag("routes");
        assert_eq!(ids(&filter_tests(&pool(), &[both])), vec!["u2"]);
    }

    #[test]
    fn test_max_duration_uses_default_estimate() {
        let filter = TestFilter::default().with_max_duration(1_000);
        // a1 has no estimate and counts as 1000 ms
        assert_eq!(ids(&filter_tests(&pool(), &[filter])), vec!["u1", "a1"]);
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let filters = [
            TestFilter::of_type(TestType::Unit),
            TestFilter::default().with_max_duration(1_000),
        ];
        assert_eq!(ids(&filter_tests(&pool(), &filters)), vec!["u1"]);
    }

    #[test]
    fn test_parse_shorthand() {
        assert_eq!("e2e".parse::<TestFilter>().unwrap(), TestFilter::of_type(TestType::E2e));
        assert!("nonsense".parse::<TestFilter>().is_err());
        assert!("".parse::<TestFilter>().is_err());
    }

    #[test]
    fn test_parse_criteria() {
        let filter: TestFilter = "type=unit, pattern=routes/, tag=fast+routes, max-duration=5000"
            .parse()
            .unwrap();
        assert_eq!(filter.test_type, Some(TestType::Unit));
        assert_eq!(filter.pattern.as_deref(), Some("routes/"));
        assert_eq!(filter.tags, vec!["fast", "routes"]);
        assert_eq!(filter.max_duration, Some(5_000));

        assert!("colour=red".parse::<TestFilter>().is_err());
        assert!("max-duration=soon".parse::<TestFilter>().is_err());
    }

    #[test]
    fn test_filter_spec_json() {
        let specs: Vec<FilterSpec> =
            serde_json::from_str(r#"["unit", {"pattern": "routes", "maxDuration": 100}]"#).unwrap();
        let resolved: Vec<_> = specs.iter().map(|s| s.resolve().unwrap()).collect();
        assert_eq!(resolved[0], TestFilter::of_type(TestType::Unit));
        assert_eq!(resolved[1].pattern.as_deref(), Some("routes"));
        assert_eq!(resolved[1].max_duration, Some(100));

        let bad = FilterSpec::Type("desktop".to_string());
        assert!(matches!(bad.resolve(), Err(PlanError::InvalidFilter { .. })));
    }

    #[test]
    fn test_matches_single() {
        let test = TestDescriptor::new(TestId::new("x"), "/abs/tests/x.test.js", TestType::Smoke)
            .with_relative_path("tests/x.test.js");
        assert!(TestFilter::default().with_pattern("/abs/").matches(&test));
        assert!(!TestFilter::of_type(TestType::Unit).matches(&test));
    }
}
