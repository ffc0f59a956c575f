//! Test-only scripted collaborators for exercising the fix controller.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};

use crate::core::types::RegressionSnapshot;
use crate::io::generator::{GeneratorResponse, ProposalContext, ProposalGenerator};
use crate::io::regression::RegressionRunner;

/// Temp workspace holding one test file with the given content.
pub fn temp_workspace(file_name: &str, content: &str) -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let test_path = temp.path().join(file_name);
    fs::write(&test_path, content).expect("write test file");
    (temp, test_path)
}

/// Deterministic snapshot with the given counts and no errors.
pub fn snapshot(passed: u32, failed: u32) -> RegressionSnapshot {
    RegressionSnapshot {
        passed,
        failed,
        total: passed + failed,
        errors: Vec::new(),
        raw_output: format!("{passed} passed, {failed} failed"),
        timed_out: false,
    }
}

/// Generator reply in the expected marker format.
pub fn proposal_text(diagnosis: &str, confidence: f64, content: &str) -> String {
    format!("DIAGNOSIS: {diagnosis}\nCONFIDENCE: {confidence}\n\n```\n{content}```\n")
}

/// Runner that replays a scripted sequence of snapshots.
pub struct ScriptedRunner {
    snapshots: Mutex<Vec<RegressionSnapshot>>,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(snapshots: Vec<RegressionSnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegressionRunner for ScriptedRunner {
    fn run(&self, _suite: &[String]) -> Result<RegressionSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut snapshots = self.snapshots.lock().expect("lock");
        if snapshots.is_empty() {
            return Err(anyhow!("scripted runner exhausted"));
        }
        Ok(snapshots.remove(0))
    }
}

/// Generator that returns a fixed response (or a fixed error) without
/// spawning processes.
pub struct ScriptedGenerator {
    response: Option<String>,
    cost: f64,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn succeeding(raw_text: String, cost: f64) -> Self {
        Self {
            response: Some(raw_text),
            cost,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            cost: 0.0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProposalGenerator for ScriptedGenerator {
    fn propose(&self, _input: &ProposalContext) -> Result<GeneratorResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(raw_text) => Ok(GeneratorResponse {
                raw_text: raw_text.clone(),
                cost: self.cost,
            }),
            None => Err(anyhow!("scripted generator failure")),
        }
    }
}
