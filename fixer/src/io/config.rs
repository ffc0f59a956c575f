//! Engine configuration stored under `.fixer/config.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Fix engine configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FixerConfig {
    /// Fixed regression baseline: critical-path test files run before and
    /// after every candidate fix.
    pub baseline_suite: Vec<String>,

    /// Command that runs the regression suite; suite files are appended as
    /// trailing arguments (e.g. `["npx","playwright","test"]`).
    pub regression_command: Vec<String>,

    /// Wall-clock bound for one regression run in seconds.
    pub regression_timeout_secs: u64,

    /// Command that produces fix proposals; the prompt is fed over stdin.
    pub generator_command: Vec<String>,

    /// Wall-clock bound for one generator call in seconds.
    pub generator_timeout_secs: u64,

    /// TTL for attempt counters and attempt history, in hours.
    pub attempt_ttl_hours: u64,

    /// TTL for escalation queue records, in days.
    pub queue_ttl_days: u64,

    /// Whether low-confidence proposals escalate. Disabled for unattended
    /// runs, where the engine logs and proceeds instead.
    pub escalation_enabled: bool,

    /// Truncate captured child-process stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            baseline_suite: Vec::new(),
            regression_command: vec![
                "npx".to_string(),
                "playwright".to_string(),
                "test".to_string(),
            ],
            regression_timeout_secs: 120,
            generator_command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            generator_timeout_secs: 10 * 60,
            attempt_ttl_hours: 24,
            queue_ttl_days: 7,
            escalation_enabled: true,
            output_limit_bytes: 100_000,
        }
    }
}

impl FixerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.regression_timeout_secs == 0 {
            return Err(anyhow!("regression_timeout_secs must be > 0"));
        }
        if self.generator_timeout_secs == 0 {
            return Err(anyhow!("generator_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.regression_command.is_empty() || self.regression_command[0].trim().is_empty() {
            return Err(anyhow!("regression_command must be a non-empty array"));
        }
        if self.generator_command.is_empty() || self.generator_command[0].trim().is_empty() {
            return Err(anyhow!("generator_command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn regression_timeout(&self) -> Duration {
        Duration::from_secs(self.regression_timeout_secs)
    }

    pub fn generator_timeout(&self) -> Duration {
        Duration::from_secs(self.generator_timeout_secs)
    }

    pub fn attempt_ttl(&self) -> Duration {
        Duration::from_secs(self.attempt_ttl_hours * 60 * 60)
    }

    pub fn queue_ttl(&self) -> Duration {
        Duration::from_secs(self.queue_ttl_days * 24 * 60 * 60)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FixerConfig::default()`.
pub fn load_config(path: &Path) -> Result<FixerConfig> {
    if !path.exists() {
        let cfg = FixerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FixerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FixerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
