//! Phase duration estimation.
//!
//! Estimates are derived from test metadata, never measured. A phase costs
//! the sum of its tests' estimates scaled by a parallel-savings factor, plus a
//! fixed setup overhead.

use gantry_core::TestDescriptor;

/// Fixed setup cost added to every phase
pub const PHASE_OVERHEAD_MS: u64 = 1_000;

/// Savings per additional test in a phase
pub const SAVINGS_PER_TEST: f64 = 0.05;

/// Lowest scaling factor, however many tests a phase has
pub const PARALLEL_FLOOR: f64 = 0.3;

/// `max(0.3, 1 - test_count * 0.05)`
#[must_use]
pub fn parallel_factor(test_count: usize) -> f64 {
    (1.0 - test_count as f64 * SAVINGS_PER_TEST).max(PARALLEL_FLOOR)
}

/// Sum of estimated test times
#[must_use]
pub fn serial_cost_ms(tests: &[TestDescriptor]) -> u64 {
    tests.iter().map(TestDescriptor::estimated_ms).sum()
}

/// Estimated wall time of a phase holding `tests`
#[must_use]
pub fn estimate_phase_ms(tests: &[TestDescriptor]) -> u64 {
    let scaled = serial_cost_ms(tests) as f64 * parallel_factor(tests.len());
    scaled.round() as u64 + PHASE_OVERHEAD_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::TestType;

    fn tests_of(n: usize, ms: u64) -> Vec<TestDescriptor> {
        (0..n)
            .map(|i| TestDescriptor::new(format!("t{}", i), format!("t{}.test.js", i), TestType::Unit).with_estimated_ms(ms))
            .collect()
    }

    #[test]
    fn test_parallel_factor() {
        assert_eq!(parallel_factor(0), 1.0);
        assert!((parallel_factor(5) - 0.75).abs() < 1e-9);
        assert!((parallel_factor(14) - 0.3).abs() < 1e-9);
        assert_eq!(parallel_factor(100), PARALLEL_FLOOR);
    }

    #[test]
    fn test_estimate_unit_phase() {
        // 5 × 500 ms × 0.75 + 1000
        assert_eq!(estimate_phase_ms(&tests_of(5, 500)), 2_875);
    }

    #[test]
    fn test_estimate_two_slow_tests() {
        // 2 × 8000 ms × 0.9 + 1000
        assert_eq!(estimate_phase_ms(&tests_of(2, 8_000)), 15_400);
    }

    #[test]
    fn test_unknown_estimate_defaults() {
        let tests = vec![TestDescriptor::new("x", "x.test.js", TestType::Unit)];
        assert_eq!(serial_cost_ms(&tests), 1_000);
        assert_eq!(estimate_phase_ms(&tests), 1_950);
    }
}
