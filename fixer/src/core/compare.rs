//! Regression snapshot comparison.
//!
//! Pure count-based comparison of two suite runs. Two different failing tests
//! with equal failure counts read as "no new failures"; the engine compares
//! counts, not failing-test identity.

use crate::core::types::{Comparison, RegressionSnapshot};

/// Compare a baseline snapshot against a post-fix snapshot.
///
/// `new_failures = max(0, after.failed - baseline.failed)`;
/// `improved` iff the post-fix run has strictly fewer failures.
pub fn compare(baseline: &RegressionSnapshot, after: &RegressionSnapshot) -> Comparison {
    Comparison {
        new_failures: after.failed.saturating_sub(baseline.failed),
        improved: after.failed < baseline.failed,
        baseline_passed: baseline.passed,
        baseline_failed: baseline.failed,
        after_passed: after.passed,
        after_failed: after.failed,
    }
}
