//! Orchestration for a single fix-attempt pass.
//!
//! One invocation walks the full state machine: attempt check, baseline
//! capture, proposal generation, confidence gate, apply, post-fix regression,
//! comparison. Every terminal outcome carries the incurred generation cost,
//! including escalations and aborts. The engine assumes exclusive ownership
//! of the test file for the duration of one pass; callers running concurrent
//! attempts against the same file must serialize them.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::compare::compare;
use crate::core::diff::render_unified_diff;
use crate::core::priority::compute_priority;
use crate::core::proposal::parse_proposal;
use crate::core::types::{
    Comparison, EscalationItem, EscalationReason, FixProposal, Severity,
};
use crate::io::artifact::{ArtifactRequest, FixArtifactPaths, write_fix_artifacts};
use crate::io::attempts::AttemptTracker;
use crate::io::config::FixerConfig;
use crate::io::generator::{ProposalContext, ProposalGenerator};
use crate::io::hints::selector_hints;
use crate::io::learning::LearningStore;
use crate::io::queue::EscalationQueue;
use crate::io::regression::RegressionRunner;
use crate::io::store::KvStore;

/// Attempts beyond this count short-circuit to escalation.
pub const MAX_RETRIES: u32 = 3;

/// Proposals below this confidence are escalated instead of applied.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

const HINT_LIMIT: usize = 8;

/// Whether low-confidence proposals may be escalated. Disabled for
/// unattended runs, where the engine logs and applies anyway.
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    pub enabled: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// One fix request from the caller.
#[derive(Debug, Clone)]
pub struct FixRequest {
    pub test_path: PathBuf,
    pub error_message: String,
    /// Stable identity for attempt tracking; derived from the test path when
    /// absent.
    pub task_id: Option<String>,
    /// Feature description used for escalation priority and learning
    /// retrieval; falls back to the test path.
    pub feature: Option<String>,
}

/// Terminal outcome of one pass.
#[derive(Debug, Clone)]
pub enum FixOutcome {
    /// Fix applied and verified against the baseline.
    Success {
        diagnosis: String,
        comparison: Comparison,
        artifacts: FixArtifactPaths,
    },
    /// Handed to the human-review queue.
    Escalated {
        reason: EscalationReason,
        severity: Severity,
        item: Box<EscalationItem>,
    },
    /// Local failure; nothing queued for a human.
    Aborted { error: String },
}

/// Terminal result of one pass, cost included on every path.
#[derive(Debug, Clone)]
pub struct FixResult {
    pub outcome: FixOutcome,
    pub cost: f64,
}

/// The fix engine: collaborators wired together for one or more passes.
pub struct FixEngine<'a, R, G, S, L> {
    pub root: &'a Path,
    pub runner: &'a R,
    pub generator: &'a G,
    pub store: &'a S,
    pub learning: &'a L,
    pub cfg: &'a FixerConfig,
    pub policy: EscalationPolicy,
}

impl<R, G, S, L> FixEngine<'_, R, G, S, L>
where
    R: RegressionRunner,
    G: ProposalGenerator,
    S: KvStore,
    L: LearningStore,
{
    /// Execute one fix-attempt pass.
    #[instrument(skip_all, fields(test_path = %request.test_path.display()))]
    pub fn attempt_fix(&self, request: &FixRequest) -> Result<FixResult> {
        let task_id = request
            .task_id
            .clone()
            .unwrap_or_else(|| derive_task_id(&request.test_path));
        let feature = request
            .feature
            .clone()
            .unwrap_or_else(|| request.test_path.display().to_string());
        let tracker = AttemptTracker::new(self.store, self.cfg.attempt_ttl());
        let queue = EscalationQueue::new(self.store, self.learning, self.cfg.queue_ttl());

        // AttemptCheck. Store unavailability is fatal for the pass.
        let attempts = tracker.increment(&task_id, &request.test_path.display().to_string())?;
        info!(task_id, attempts, "fix attempt started");
        if attempts > MAX_RETRIES {
            warn!(task_id, attempts, "max retries exceeded, escalating");
            let item = self.escalate(
                &queue,
                EscalationInput {
                    task_id: &task_id,
                    feature: &feature,
                    request,
                    attempts,
                    reason: EscalationReason::MaxRetriesExceeded,
                    severity: Severity::High,
                    proposal: None,
                    artifacts: Vec::new(),
                },
            )?;
            return Ok(FixResult {
                outcome: FixOutcome::Escalated {
                    reason: EscalationReason::MaxRetriesExceeded,
                    severity: Severity::High,
                    item: Box::new(item),
                },
                cost: 0.0,
            });
        }

        let original = fs::read_to_string(&request.test_path)
            .with_context(|| format!("read test file {}", request.test_path.display()))?;

        // BaselineCapture. Without a trustworthy baseline there is nothing to
        // compare against, so failures here abort instead of escalating.
        let baseline = match self.runner.run(&self.cfg.baseline_suite) {
            Ok(snapshot) if snapshot.timed_out => {
                return Ok(abort("baseline regression run timed out".to_string(), 0.0));
            }
            Ok(snapshot) => snapshot,
            Err(err) => return Ok(abort(format!("baseline capture failed: {err:#}"), 0.0)),
        };
        info!(passed = baseline.passed, failed = baseline.failed, "baseline captured");

        // ProposalGeneration.
        let hints = selector_hints(&request.test_path, &request.error_message, HINT_LIMIT);
        let response = match self.generator.propose(&ProposalContext {
            file_content: original.clone(),
            error_message: request.error_message.clone(),
            hints,
        }) {
            Ok(response) => response,
            Err(err) => return Ok(abort(format!("proposal generation failed: {err:#}"), 0.0)),
        };
        let cost = response.cost;
        let proposal = match parse_proposal(&response.raw_text) {
            Ok(proposal) => proposal,
            Err(err) => return Ok(abort(format!("proposal parse failed: {err:#}"), cost)),
        };
        info!(confidence = proposal.confidence, diagnosis = %proposal.diagnosis, "proposal parsed");

        // ConfidenceGate.
        if proposal.confidence < CONFIDENCE_THRESHOLD {
            if self.policy.enabled {
                let item = self.escalate(
                    &queue,
                    EscalationInput {
                        task_id: &task_id,
                        feature: &feature,
                        request,
                        attempts,
                        reason: EscalationReason::LowConfidence,
                        severity: Severity::Medium,
                        proposal: Some(&proposal),
                        artifacts: Vec::new(),
                    },
                )?;
                return Ok(FixResult {
                    outcome: FixOutcome::Escalated {
                        reason: EscalationReason::LowConfidence,
                        severity: Severity::Medium,
                        item: Box::new(item),
                    },
                    cost,
                });
            }
            warn!(
                confidence = proposal.confidence,
                threshold = CONFIDENCE_THRESHOLD,
                "low confidence but escalation disabled, applying anyway"
            );
        }

        // Apply. The diff is computed first so the audit artifact reflects the
        // edit even when it is later rolled back.
        let test_path_label = request.test_path.display().to_string();
        let diff = render_unified_diff(&test_path_label, &original, &proposal.fixed_content);
        fs::write(&request.test_path, &proposal.fixed_content)
            .with_context(|| format!("apply fix to {}", request.test_path.display()))?;

        // PostFixRegression. A run that fails or times out here leaves no
        // trustworthy comparison, so the edit is reverted before aborting.
        let after = match self.runner.run(&self.cfg.baseline_suite) {
            Ok(snapshot) if snapshot.timed_out => {
                restore(&request.test_path, &original)?;
                return Ok(abort("post-fix regression run timed out".to_string(), cost));
            }
            Ok(snapshot) => snapshot,
            Err(err) => {
                restore(&request.test_path, &original)?;
                return Ok(abort(format!("post-fix regression run failed: {err:#}"), cost));
            }
        };

        // Compare.
        let comparison = compare(&baseline, &after);
        if comparison.new_failures > 0 {
            warn!(
                new_failures = comparison.new_failures,
                "fix introduced regressions, rolling back"
            );
            restore(&request.test_path, &original)?;
            let artifacts = write_fix_artifacts(
                self.root,
                &ArtifactRequest {
                    task_id: &task_id,
                    test_path: &test_path_label,
                    diagnosis: &proposal.diagnosis,
                    diff: &diff,
                    baseline: &baseline,
                    after_fix: &after,
                    comparison,
                    fix_applied: false,
                    original_content: &original,
                },
            )?;
            let item = self.escalate(
                &queue,
                EscalationInput {
                    task_id: &task_id,
                    feature: &feature,
                    request,
                    attempts,
                    reason: EscalationReason::RegressionDetected,
                    severity: Severity::High,
                    proposal: Some(&proposal),
                    artifacts: artifacts.as_strings(),
                },
            )?;
            return Ok(FixResult {
                outcome: FixOutcome::Escalated {
                    reason: EscalationReason::RegressionDetected,
                    severity: Severity::High,
                    item: Box::new(item),
                },
                cost,
            });
        }

        let artifacts = write_fix_artifacts(
            self.root,
            &ArtifactRequest {
                task_id: &task_id,
                test_path: &test_path_label,
                diagnosis: &proposal.diagnosis,
                diff: &diff,
                baseline: &baseline,
                after_fix: &after,
                comparison,
                fix_applied: true,
                original_content: &original,
            },
        )?;
        info!(task_id, "fix applied and verified");
        Ok(FixResult {
            outcome: FixOutcome::Success {
                diagnosis: proposal.diagnosis,
                comparison,
                artifacts,
            },
            cost,
        })
    }

    fn escalate(
        &self,
        queue: &EscalationQueue<'_, S, L>,
        input: EscalationInput<'_>,
    ) -> Result<EscalationItem> {
        let mut item = EscalationItem::new(
            input.task_id,
            input.feature,
            &input.request.test_path.display().to_string(),
        );
        item.attempts = input.attempts;
        item.last_error = input.request.error_message.clone();
        item.severity = input.severity;
        item.escalation_reason = input.reason;
        item.priority = Some(compute_priority(
            Some(input.severity),
            input.attempts,
            input.feature,
            None,
        ));
        item.ai_diagnosis = input.proposal.map(|p| p.diagnosis.clone());
        item.ai_confidence = input.proposal.map(|p| p.confidence);
        item.artifacts = input.artifacts;

        queue.add(item.clone())?;
        // Return the stored form so the caller sees the assigned created_at.
        Ok(queue.get(input.task_id)?.unwrap_or(item))
    }
}

struct EscalationInput<'a> {
    task_id: &'a str,
    feature: &'a str,
    request: &'a FixRequest,
    attempts: u32,
    reason: EscalationReason,
    severity: Severity,
    proposal: Option<&'a FixProposal>,
    artifacts: Vec<String>,
}

fn abort(error: String, cost: f64) -> FixResult {
    warn!(error = %error, "fix attempt aborted");
    FixResult {
        outcome: FixOutcome::Aborted { error },
        cost,
    }
}

fn restore(path: &Path, original: &str) -> Result<()> {
    fs::write(path, original).with_context(|| format!("restore original {}", path.display()))
}

fn derive_task_id(test_path: &Path) -> String {
    let safe: String = test_path
        .display()
        .to_string()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("fix-{safe}")
}
