//! Escalation priority computation.
//!
//! Both call sites that need a priority — the controller when it escalates
//! directly with a known severity, and the queue when `add` receives an item
//! without one — go through [`compute_priority`] so the weighting lives in
//! one place and the `[0, 1]` clamp cannot drift between them.

use chrono::{DateTime, Utc};

use crate::core::types::Severity;

/// Feature keywords that mark a critical user path.
const CRITICAL_PATH_KEYWORDS: &[&str] = &[
    "auth", "login", "payment", "checkout", "signup", "billing",
];

/// Compute an escalation priority in `[0, 1]`.
///
/// With a severity (controller call site): severity base plus an attempts
/// bonus capped at 0.3. Without one (queue-default call site): attempts capped
/// at 0.4, plus 0.3 for a critical-path feature keyword, plus age capped at
/// 0.3 over 24 hours.
pub fn compute_priority(
    severity: Option<Severity>,
    attempts: u32,
    feature_text: &str,
    created_at: Option<DateTime<Utc>>,
) -> f64 {
    let score = match severity {
        Some(severity) => severity_base(severity) + attempts_score(attempts, 0.3),
        None => {
            attempts_score(attempts, 0.4)
                + critical_path_score(feature_text)
                + age_score(created_at)
        }
    };
    score.clamp(0.0, 1.0)
}

fn severity_base(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.1,
        Severity::Medium => 0.3,
        Severity::High => 0.5,
        Severity::Critical => 0.7,
    }
}

fn attempts_score(attempts: u32, cap: f64) -> f64 {
    (f64::from(attempts) / 10.0).min(cap)
}

fn critical_path_score(feature_text: &str) -> f64 {
    let text = feature_text.to_lowercase();
    if CRITICAL_PATH_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        0.3
    } else {
        0.0
    }
}

fn age_score(created_at: Option<DateTime<Utc>>) -> f64 {
    let Some(created_at) = created_at else {
        return 0.0;
    };
    let hours = (Utc::now() - created_at).num_minutes() as f64 / 60.0;
    (hours.max(0.0) / 24.0).min(0.3)
}
