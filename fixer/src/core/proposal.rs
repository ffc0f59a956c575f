//! Marker-based parsing of generator responses.
//!
//! The proposal generator returns free text carrying three semi-structured
//! markers: a `DIAGNOSIS:` line, a `CONFIDENCE:` value, and a fenced code
//! block holding the complete replacement file. Input is untrusted; a missing
//! diagnosis or code block fails the parse.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;

use crate::core::types::FixProposal;

/// Confidence assumed when the marker is missing or unparseable.
///
/// Deliberately below the escalation threshold: a generator that cannot state
/// its confidence is routed to human review rather than trusted by default.
pub const UNPARSED_CONFIDENCE: f64 = 0.5;

static DIAGNOSIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*DIAGNOSIS:\s*(\S.*)$").expect("diagnosis regex"));
static CONFIDENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*CONFIDENCE:\s*([0-9]*\.?[0-9]+)").expect("confidence regex"));
static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z0-9_+-]*\r?\n(.*?)```").expect("code block regex"));

/// Parse a raw generator response into a [`FixProposal`].
pub fn parse_proposal(raw: &str) -> Result<FixProposal> {
    let diagnosis = DIAGNOSIS_RE
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
        .ok_or_else(|| anyhow!("proposal missing DIAGNOSIS marker"))?;

    let confidence = CONFIDENCE_RE
        .captures(raw)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|value| value.clamp(0.0, 1.0))
        .unwrap_or(UNPARSED_CONFIDENCE);

    let fixed_content = CODE_BLOCK_RE
        .captures(raw)
        .map(|caps| caps[1].to_string())
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| anyhow!("proposal missing fenced code block with replacement file"))?;

    Ok(FixProposal {
        diagnosis,
        confidence,
        fixed_content,
    })
}
