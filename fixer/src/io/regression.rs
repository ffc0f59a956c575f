//! Regression runner adapter.
//!
//! The [`RegressionRunner`] trait decouples the controller from the actual
//! test runner (a Playwright-style CLI by default). Tests use scripted
//! runners that return predetermined snapshots without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::core::types::RegressionSnapshot;
use crate::io::process::run_command_with_timeout;

/// Cap on per-test failure lines carried in a snapshot.
const MAX_ERROR_LINES: usize = 50;

static PASSED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s+passed\b").expect("passed regex"));
static FAILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s+failed\b").expect("failed regex"));
static ERROR_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:✘|✗|×|FAIL\b)\s*(.+)$").expect("error line regex"));

/// Abstraction over regression-suite execution backends.
pub trait RegressionRunner {
    /// Run the given suite and return its pass/fail snapshot.
    fn run(&self, suite: &[String]) -> Result<RegressionSnapshot>;
}

/// Runner that spawns the configured test command with the suite files
/// appended as trailing arguments.
pub struct CommandRegressionRunner {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl RegressionRunner for CommandRegressionRunner {
    #[instrument(skip_all, fields(suite_len = suite.len(), timeout_secs = self.timeout.as_secs()))]
    fn run(&self, suite: &[String]) -> Result<RegressionSnapshot> {
        info!(command = %self.command.join(" "), "running regression suite");
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .args(suite)
            .current_dir(&self.workdir);

        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .context("run regression command")?;

        let mut raw_output = output.stdout_lossy();
        let stderr = output.stderr_lossy();
        if !stderr.trim().is_empty() {
            raw_output.push_str("\n=== stderr ===\n");
            raw_output.push_str(&stderr);
        }

        let snapshot = parse_runner_output(&raw_output, output.timed_out);
        debug!(
            passed = snapshot.passed,
            failed = snapshot.failed,
            timed_out = snapshot.timed_out,
            "regression run finished"
        );
        Ok(snapshot)
    }
}

/// Extract pass/fail counts and per-test failure lines from runner output.
pub fn parse_runner_output(raw_output: &str, timed_out: bool) -> RegressionSnapshot {
    let passed = capture_count(&PASSED_RE, raw_output);
    let failed = capture_count(&FAILED_RE, raw_output);
    let errors: Vec<String> = ERROR_LINE_RE
        .captures_iter(raw_output)
        .take(MAX_ERROR_LINES)
        .map(|caps| caps[1].trim().to_string())
        .collect();

    RegressionSnapshot {
        passed,
        failed,
        total: passed + failed,
        errors,
        raw_output: raw_output.to_string(),
        timed_out,
    }
}

fn capture_count(re: &Regex, haystack: &str) -> u32 {
    re.captures(haystack)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}
