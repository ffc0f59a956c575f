//! Durable audit artifacts for fix passes.
//!
//! On success and on regression-triggered rollback the controller emits a
//! unified diff plus a structured audit record under `.fixer/artifacts/`.
//! Artifacts are write-once and timestamp-named; nothing in control flow
//! reads them back.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::types::{Comparison, RegressionSnapshot};

/// Trimmed snapshot view persisted in the audit record (the full raw output
/// is deliberately not persisted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
    pub timed_out: bool,
}

impl From<&RegressionSnapshot> for SnapshotSummary {
    fn from(snapshot: &RegressionSnapshot) -> Self {
        Self {
            passed: snapshot.passed,
            failed: snapshot.failed,
            total: snapshot.total,
            timed_out: snapshot.timed_out,
        }
    }
}

/// Structured audit record written beside the diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub task_id: String,
    pub test_path: String,
    pub diagnosis: String,
    pub baseline: SnapshotSummary,
    pub after_fix: SnapshotSummary,
    pub comparison: Comparison,
    /// Whether the candidate edit remained in place after the pass.
    pub fix_applied: bool,
    /// Whether the zero-new-failures invariant held for the candidate.
    pub invariant_honored: bool,
    /// SHA-256 of the pre-fix file content, so byte-exact rollback is
    /// externally checkable.
    pub original_sha256: String,
}

/// Everything needed to emit one artifact pair.
#[derive(Debug)]
pub struct ArtifactRequest<'a> {
    pub task_id: &'a str,
    pub test_path: &'a str,
    pub diagnosis: &'a str,
    pub diff: &'a str,
    pub baseline: &'a RegressionSnapshot,
    pub after_fix: &'a RegressionSnapshot,
    pub comparison: Comparison,
    pub fix_applied: bool,
    pub original_content: &'a str,
}

/// Paths of one emitted artifact pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixArtifactPaths {
    pub diff_path: PathBuf,
    pub audit_path: PathBuf,
}

impl FixArtifactPaths {
    pub fn as_strings(&self) -> Vec<String> {
        vec![
            self.diff_path.display().to_string(),
            self.audit_path.display().to_string(),
        ]
    }
}

/// Write the diff and audit record for one pass.
pub fn write_fix_artifacts(root: &Path, request: &ArtifactRequest<'_>) -> Result<FixArtifactPaths> {
    let dir = root.join(".fixer").join("artifacts");
    fs::create_dir_all(&dir).with_context(|| format!("create artifact dir {}", dir.display()))?;

    let now = Utc::now();
    let stem = format!(
        "fix-{}-{}",
        now.format("%Y%m%dT%H%M%S%3f"),
        sanitize(request.task_id)
    );
    let paths = FixArtifactPaths {
        diff_path: dir.join(format!("{stem}.diff")),
        audit_path: dir.join(format!("{stem}.json")),
    };

    let mut hasher = Sha256::new();
    hasher.update(request.original_content.as_bytes());
    let original_sha256 = hex::encode(hasher.finalize());

    let record = AuditRecord {
        timestamp: now.to_rfc3339(),
        task_id: request.task_id.to_string(),
        test_path: request.test_path.to_string(),
        diagnosis: request.diagnosis.to_string(),
        baseline: request.baseline.into(),
        after_fix: request.after_fix.into(),
        comparison: request.comparison,
        fix_applied: request.fix_applied,
        invariant_honored: request.comparison.new_failures == 0,
        original_sha256,
    };

    fs::write(&paths.diff_path, request.diff)
        .with_context(|| format!("write diff {}", paths.diff_path.display()))?;
    let mut buf = serde_json::to_string_pretty(&record)?;
    buf.push('\n');
    fs::write(&paths.audit_path, buf)
        .with_context(|| format!("write audit record {}", paths.audit_path.display()))?;

    debug!(diff = %paths.diff_path.display(), audit = %paths.audit_path.display(), "artifacts written");
    Ok(paths)
}

fn sanitize(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compare::compare;

    fn snapshot(passed: u32, failed: u32) -> RegressionSnapshot {
        RegressionSnapshot {
            passed,
            failed,
            total: passed + failed,
            errors: Vec::new(),
            raw_output: "raw".to_string(),
            timed_out: false,
        }
    }

    #[test]
    fn writes_diff_and_parseable_audit_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let baseline = snapshot(2, 0);
        let after = snapshot(2, 0);
        let comparison = compare(&baseline, &after);

        let paths = write_fix_artifacts(
            temp.path(),
            &ArtifactRequest {
                task_id: "fix-login",
                test_path: "tests/login.spec.ts",
                diagnosis: "renamed selector",
                diff: "--- a/x\n+++ b/x\n",
                baseline: &baseline,
                after_fix: &after,
                comparison,
                fix_applied: true,
                original_content: "old content",
            },
        )
        .expect("write artifacts");

        assert!(paths.diff_path.is_file());
        assert!(paths.audit_path.is_file());

        let record: AuditRecord =
            serde_json::from_str(&fs::read_to_string(&paths.audit_path).expect("read"))
                .expect("parse");
        assert_eq!(record.task_id, "fix-login");
        assert!(record.fix_applied);
        assert!(record.invariant_honored);
        assert_eq!(record.baseline.passed, 2);
        assert_eq!(record.original_sha256.len(), 64);
    }

    #[test]
    fn regression_pass_records_violated_invariant() {
        let temp = tempfile::tempdir().expect("tempdir");
        let baseline = snapshot(2, 0);
        let after = snapshot(1, 1);
        let comparison = compare(&baseline, &after);

        let paths = write_fix_artifacts(
            temp.path(),
            &ArtifactRequest {
                task_id: "fix-checkout",
                test_path: "tests/checkout.spec.ts",
                diagnosis: "wrong wait",
                diff: "",
                baseline: &baseline,
                after_fix: &after,
                comparison,
                fix_applied: false,
                original_content: "old",
            },
        )
        .expect("write artifacts");

        let record: AuditRecord =
            serde_json::from_str(&fs::read_to_string(&paths.audit_path).expect("read"))
                .expect("parse");
        assert!(!record.fix_applied);
        assert!(!record.invariant_honored);
        assert_eq!(record.comparison.new_failures, 1);
    }

    #[test]
    fn artifact_names_carry_task_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let baseline = snapshot(1, 0);
        let comparison = compare(&baseline, &baseline);
        let paths = write_fix_artifacts(
            temp.path(),
            &ArtifactRequest {
                task_id: "fix/odd id",
                test_path: "t",
                diagnosis: "d",
                diff: "",
                baseline: &baseline,
                after_fix: &baseline,
                comparison,
                fix_applied: true,
                original_content: "",
            },
        )
        .expect("write artifacts");
        let name = paths.diff_path.file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.contains("fix_odd_id"));
        assert!(name.ends_with(".diff"));
    }
}
