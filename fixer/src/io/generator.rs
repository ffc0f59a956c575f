//! Proposal generator adapter.
//!
//! The [`ProposalGenerator`] trait decouples the controller from the
//! generative backend (an agent CLI by default). The backend receives a
//! rendered prompt over stdin and replies with free text; marker extraction
//! lives in `core::proposal`. Tests use scripted generators that return
//! predetermined responses without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

const FIX_TEMPLATE: &str = include_str!("prompts/fix.md");

/// Approximate bytes per token for cost estimation.
const BYTES_PER_TOKEN: f64 = 4.0;
const INPUT_COST_PER_MTOK: f64 = 3.0;
const OUTPUT_COST_PER_MTOK: f64 = 15.0;

/// Inputs for one proposal call.
#[derive(Debug, Clone)]
pub struct ProposalContext {
    /// Current content of the failing test file.
    pub file_content: String,
    /// Error description from the failed run.
    pub error_message: String,
    /// Best-effort selector-usage hints from sibling tests.
    pub hints: Vec<String>,
}

/// Raw generator reply plus the cost incurred producing it.
#[derive(Debug, Clone)]
pub struct GeneratorResponse {
    pub raw_text: String,
    pub cost: f64,
}

/// Abstraction over proposal generation backends.
pub trait ProposalGenerator {
    fn propose(&self, input: &ProposalContext) -> Result<GeneratorResponse>;
}

/// Generator that spawns the configured agent CLI and feeds the rendered
/// prompt over stdin.
pub struct CliProposalGenerator {
    pub command: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ProposalGenerator for CliProposalGenerator {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn propose(&self, input: &ProposalContext) -> Result<GeneratorResponse> {
        let prompt = render_prompt(input)?;
        info!(command = %self.command.join(" "), prompt_bytes = prompt.len(), "requesting fix proposal");

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).current_dir(&self.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run proposal generator")?;

        let raw_text = output.stdout_lossy();
        let cost = estimate_cost(prompt.len(), raw_text.len());

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "proposal generator timed out");
            return Err(anyhow!(
                "proposal generator timed out after {:?}",
                self.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "proposal generator failed");
            return Err(anyhow!(
                "proposal generator failed with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }

        debug!(response_bytes = raw_text.len(), cost, "proposal received");
        Ok(GeneratorResponse { raw_text, cost })
    }
}

/// Render the fix prompt from its template.
pub fn render_prompt(input: &ProposalContext) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("fix", FIX_TEMPLATE)
        .context("fix template should be valid")?;
    let template = env.get_template("fix")?;
    let rendered = template.render(context! {
        file_content => input.file_content,
        error_message => input.error_message.trim(),
        hints => (!input.hints.is_empty()).then_some(&input.hints),
    })?;
    Ok(rendered)
}

/// Estimate dollar cost from prompt/response sizes.
pub fn estimate_cost(prompt_bytes: usize, response_bytes: usize) -> f64 {
    let input_tokens = prompt_bytes as f64 / BYTES_PER_TOKEN;
    let output_tokens = response_bytes as f64 / BYTES_PER_TOKEN;
    (input_tokens * INPUT_COST_PER_MTOK + output_tokens * OUTPUT_COST_PER_MTOK) / 1_000_000.0
}
