//! Shared data model for the fix engine.
//!
//! These types define stable contracts between components. They carry no
//! behavior beyond construction helpers and must remain deterministic to
//! serialize (stable field order, explicit serde renames).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity attached to an escalation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Why a task was handed to the human-review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    MaxRetriesExceeded,
    LowConfidence,
    RegressionDetected,
}

impl EscalationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationReason::MaxRetriesExceeded => "max_retries_exceeded",
            EscalationReason::LowConfidence => "low_confidence",
            EscalationReason::RegressionDetected => "regression_detected",
        }
    }
}

/// Pass/fail snapshot of one regression-suite run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionSnapshot {
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
    pub errors: Vec<String>,
    pub raw_output: String,
    pub timed_out: bool,
}

/// Candidate fix produced by the proposal generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixProposal {
    /// One-line explanation of what the generator believes is wrong.
    pub diagnosis: String,
    /// Generator-declared confidence in `[0, 1]`.
    pub confidence: f64,
    /// Complete replacement content for the failing test file.
    pub fixed_content: String,
}

/// Derived comparison of two regression snapshots. Counts only; failing-test
/// identity is deliberately not diffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub new_failures: u32,
    pub improved: bool,
    pub baseline_passed: u32,
    pub baseline_failed: u32,
    pub after_passed: u32,
    pub after_failed: u32,
}

/// One attempt-history entry for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed attempt number within the TTL window.
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
    pub test_path: String,
}

/// Human-authored resolution notes attached to a resolved escalation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub root_cause_category: String,
    pub fix_strategy: String,
    pub severity: Severity,
    pub human_notes: String,
    pub patch_diff: Option<String>,
}

/// An item awaiting (or having received) human review.
///
/// `priority` and `created_at` may be absent on a freshly constructed item;
/// the escalation queue assigns both on `add`, so stored items always carry
/// them. Items are never physically deleted; `resolve` only removes them from
/// the active priority index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationItem {
    pub task_id: String,
    /// Feature description used for priority keywords and learning retrieval.
    pub feature: String,
    pub code_path: String,
    pub logs_path: Option<String>,
    pub screenshots: Vec<String>,
    pub attempts: u32,
    pub last_error: String,
    pub priority: Option<f64>,
    pub severity: Severity,
    pub escalation_reason: EscalationReason,
    pub ai_diagnosis: Option<String>,
    pub ai_confidence: Option<f64>,
    pub artifacts: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub annotation: Option<Annotation>,
}

impl EscalationItem {
    /// Minimal item with everything optional left empty.
    pub fn new(task_id: &str, feature: &str, code_path: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            feature: feature.to_string(),
            code_path: code_path.to_string(),
            logs_path: None,
            screenshots: Vec::new(),
            attempts: 0,
            last_error: String::new(),
            priority: None,
            severity: Severity::Medium,
            escalation_reason: EscalationReason::LowConfidence,
            ai_diagnosis: None,
            ai_confidence: None,
            artifacts: Vec::new(),
            created_at: None,
            resolved: false,
            resolved_at: None,
            annotation: None,
        }
    }
}
