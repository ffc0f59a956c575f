//! End-to-end controller passes with scripted runner and generator.

use std::fs;
use std::path::{Path, PathBuf};

use fixer::controller::{
    CONFIDENCE_THRESHOLD, EscalationPolicy, FixEngine, FixOutcome, FixRequest, MAX_RETRIES,
};
use fixer::core::types::{Annotation, EscalationReason, Severity};
use fixer::io::artifact::AuditRecord;
use fixer::io::config::FixerConfig;
use fixer::io::learning::FileLearningStore;
use fixer::io::queue::EscalationQueue;
use fixer::io::store::FileKvStore;
use fixer::test_support::{
    ScriptedGenerator, ScriptedRunner, proposal_text, snapshot, temp_workspace,
};

const ORIGINAL: &str = "test('pays', async ({ page }) => {\n  await page.click('#pay');\n});\n";
const FIXED: &str = "test('pays', async ({ page }) => {\n  await page.click('#pay-btn');\n});\n";

struct Harness {
    temp: tempfile::TempDir,
    test_path: PathBuf,
    cfg: FixerConfig,
    store: FileKvStore,
    learning: FileLearningStore,
}

impl Harness {
    fn new() -> Self {
        let (temp, test_path) = temp_workspace("checkout.spec.ts", ORIGINAL);
        let cfg = FixerConfig {
            baseline_suite: vec!["tests/smoke.spec.ts".to_string()],
            ..FixerConfig::default()
        };
        let store = FileKvStore::new(temp.path().join(".fixer/store"));
        let learning = FileLearningStore::new(temp.path().join(".fixer/learning"));
        Self { temp, test_path, cfg, store, learning }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn request(&self) -> FixRequest {
        FixRequest {
            test_path: self.test_path.clone(),
            error_message: "locator '#pay' not found".to_string(),
            task_id: Some("task-checkout".to_string()),
            feature: Some("checkout flow".to_string()),
        }
    }

    fn run(
        &self,
        runner: &ScriptedRunner,
        generator: &ScriptedGenerator,
    ) -> fixer::controller::FixResult {
        let engine = FixEngine {
            root: self.root(),
            runner,
            generator,
            store: &self.store,
            learning: &self.learning,
            cfg: &self.cfg,
            policy: EscalationPolicy::default(),
        };
        engine.attempt_fix(&self.request()).expect("attempt_fix")
    }

    fn queue(&self) -> EscalationQueue<'_, FileKvStore, FileLearningStore> {
        EscalationQueue::new(&self.store, &self.learning, self.cfg.queue_ttl())
    }
}

fn good_proposal(confidence: f64) -> String {
    proposal_text("selector '#pay' was renamed to '#pay-btn'", confidence, FIXED)
}

#[test]
fn verified_fix_is_kept_and_audited() {
    let harness = Harness::new();
    let runner = ScriptedRunner::new(vec![snapshot(5, 1), snapshot(6, 0)]);
    let generator = ScriptedGenerator::succeeding(good_proposal(0.9), 0.03);

    let result = harness.run(&runner, &generator);

    let FixOutcome::Success { diagnosis, comparison, artifacts } = &result.outcome else {
        panic!("expected success, got {:?}", result.outcome);
    };
    assert!(diagnosis.contains("#pay-btn"));
    assert_eq!(comparison.new_failures, 0);
    assert!(comparison.improved);
    assert!((result.cost - 0.03).abs() < 1e-9);

    // Edit kept on disk, both regression runs happened.
    assert_eq!(fs::read_to_string(&harness.test_path).expect("read"), FIXED);
    assert_eq!(runner.calls(), 2);

    let audit: AuditRecord = serde_json::from_str(
        &fs::read_to_string(&artifacts.audit_path).expect("read audit"),
    )
    .expect("parse audit");
    assert!(audit.fix_applied);
    assert!(audit.invariant_honored);
    assert_eq!(audit.baseline.failed, 1);
    assert_eq!(audit.after_fix.failed, 0);

    let diff = fs::read_to_string(&artifacts.diff_path).expect("read diff");
    assert!(diff.contains("-  await page.click('#pay');"));
    assert!(diff.contains("+  await page.click('#pay-btn');"));
}

#[test]
fn regression_rolls_back_byte_exact_and_escalates() {
    let harness = Harness::new();
    // The candidate fixes the target but breaks two other tests.
    let runner = ScriptedRunner::new(vec![snapshot(5, 1), snapshot(4, 3)]);
    let generator = ScriptedGenerator::succeeding(good_proposal(0.9), 0.03);

    let result = harness.run(&runner, &generator);

    let FixOutcome::Escalated { reason, severity, item } = &result.outcome else {
        panic!("expected escalation, got {:?}", result.outcome);
    };
    assert_eq!(*reason, EscalationReason::RegressionDetected);
    assert_eq!(*severity, Severity::High);
    assert!((result.cost - 0.03).abs() < 1e-9);

    // Byte-exact rollback.
    assert_eq!(fs::read_to_string(&harness.test_path).expect("read"), ORIGINAL);

    // The rejected candidate is still auditable.
    assert_eq!(item.artifacts.len(), 2);
    let audit_path = item
        .artifacts
        .iter()
        .find(|path| path.ends_with(".json"))
        .expect("audit artifact listed");
    let audit: AuditRecord =
        serde_json::from_str(&fs::read_to_string(audit_path).expect("read audit"))
            .expect("parse audit");
    assert!(!audit.fix_applied);
    assert!(!audit.invariant_honored);
    assert_eq!(audit.comparison.new_failures, 2);

    // Queued for review with the generator's diagnosis attached.
    let stored = harness.queue().get("task-checkout").expect("get").expect("queued");
    assert!(!stored.resolved);
    assert_eq!(stored.ai_confidence, Some(0.9));
    assert!(stored.created_at.is_some());
}

#[test]
fn max_retries_escalates_without_touching_runner_or_generator() {
    let harness = Harness::new();
    let generator = ScriptedGenerator::succeeding(good_proposal(0.9), 0.03);

    // Burn through the retry budget with failing generations.
    for _ in 0..MAX_RETRIES {
        let runner = ScriptedRunner::new(vec![snapshot(5, 1)]);
        let failing = ScriptedGenerator::failing();
        let result = harness.run(&runner, &failing);
        assert!(matches!(result.outcome, FixOutcome::Aborted { .. }));
    }

    let runner = ScriptedRunner::new(vec![snapshot(5, 1), snapshot(6, 0)]);
    let result = harness.run(&runner, &generator);

    let FixOutcome::Escalated { reason, severity, item } = &result.outcome else {
        panic!("expected escalation, got {:?}", result.outcome);
    };
    assert_eq!(*reason, EscalationReason::MaxRetriesExceeded);
    assert_eq!(*severity, Severity::High);
    assert_eq!(item.attempts, MAX_RETRIES + 1);
    assert_eq!(result.cost, 0.0);

    // Short-circuited before any run or generation.
    assert_eq!(runner.calls(), 0);
    assert_eq!(generator.calls(), 0);
    assert_eq!(fs::read_to_string(&harness.test_path).expect("read"), ORIGINAL);
}

#[test]
fn low_confidence_escalates_without_applying() {
    let harness = Harness::new();
    let runner = ScriptedRunner::new(vec![snapshot(5, 1)]);
    let generator = ScriptedGenerator::succeeding(good_proposal(0.4), 0.02);

    let result = harness.run(&runner, &generator);

    let FixOutcome::Escalated { reason, severity, item } = &result.outcome else {
        panic!("expected escalation, got {:?}", result.outcome);
    };
    assert_eq!(*reason, EscalationReason::LowConfidence);
    assert_eq!(*severity, Severity::Medium);
    assert!(item.ai_confidence.expect("confidence") < CONFIDENCE_THRESHOLD);
    assert!(item.ai_diagnosis.as_deref().expect("diagnosis").contains("#pay-btn"));
    assert!((result.cost - 0.02).abs() < 1e-9);

    // File untouched, only the baseline run happened.
    assert_eq!(fs::read_to_string(&harness.test_path).expect("read"), ORIGINAL);
    assert_eq!(runner.calls(), 1);
}

#[test]
fn escalated_item_can_be_resolved_into_learning() {
    let harness = Harness::new();
    let runner = ScriptedRunner::new(vec![snapshot(5, 1)]);
    let generator = ScriptedGenerator::succeeding(good_proposal(0.3), 0.02);
    let result = harness.run(&runner, &generator);
    assert!(matches!(result.outcome, FixOutcome::Escalated { .. }));

    let queue = harness.queue();
    let annotation = Annotation {
        root_cause_category: "selector_drift".to_string(),
        fix_strategy: "update_selector".to_string(),
        severity: Severity::Low,
        human_notes: "button id changed in last release".to_string(),
        patch_diff: None,
    };
    assert!(queue.resolve("task-checkout", &annotation).expect("resolve"));

    let resolved = queue.get("task-checkout").expect("get").expect("present");
    assert!(resolved.resolved);
    assert_eq!(resolved.severity, Severity::Low);
    assert_eq!(resolved.annotation, Some(annotation));

    let stats = queue.stats().expect("stats");
    assert_eq!(stats.total_count, 1);
    assert_eq!(stats.active_count, 0);
    assert_eq!(stats.resolved_count, 1);

    // The annotation reached the learning store.
    let learned: Vec<_> = fs::read_dir(harness.root().join(".fixer/learning"))
        .expect("read learning dir")
        .collect();
    assert_eq!(learned.len(), 1);
}

#[test]
fn attempt_counts_accumulate_across_passes() {
    let harness = Harness::new();

    for expected in 1..=2u32 {
        let runner = ScriptedRunner::new(vec![snapshot(5, 1), snapshot(6, 0)]);
        let generator = ScriptedGenerator::succeeding(good_proposal(0.9), 0.01);
        let result = harness.run(&runner, &generator);
        assert!(matches!(result.outcome, FixOutcome::Success { .. }));
        // Each pass restores the fixture so the next one starts identically.
        fs::write(&harness.test_path, ORIGINAL).expect("reset fixture");

        let tracker = fixer::io::attempts::AttemptTracker::new(
            &harness.store,
            harness.cfg.attempt_ttl(),
        );
        assert_eq!(tracker.get("task-checkout").expect("get"), expected);
    }
}
