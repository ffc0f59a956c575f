//! Autonomous fix-and-regression-safety engine for automated UI tests.
//!
//! `fixer fix` attempts one self-healing pass against a failing test file;
//! `fixer queue` inspects and resolves the human-review escalation queue.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use fixer::controller::{EscalationPolicy, FixEngine, FixOutcome, FixRequest};
use fixer::core::types::{Annotation, Severity};
use fixer::exit_codes;
use fixer::io::config::{FixerConfig, load_config, write_config};
use fixer::io::generator::CliProposalGenerator;
use fixer::io::learning::FileLearningStore;
use fixer::io::queue::EscalationQueue;
use fixer::io::regression::CommandRegressionRunner;
use fixer::io::store::FileKvStore;
use fixer::logging;

const CONFIG_PATH: &str = ".fixer/config.toml";

#[derive(Parser)]
#[command(
    name = "fixer",
    version,
    about = "Autonomous fix-and-regression-safety engine for automated UI tests"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.fixer/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run one fix-attempt pass against a failing test file.
    Fix {
        /// Path to the failing test file.
        test_path: PathBuf,
        /// Error message from the failed run.
        #[arg(long)]
        error: String,
        /// Stable task id for attempt tracking (derived from the path if omitted).
        #[arg(long)]
        task_id: Option<String>,
        /// Feature description for escalation priority.
        #[arg(long)]
        feature: Option<String>,
        /// Apply low-confidence proposals instead of escalating them.
        #[arg(long)]
        unattended: bool,
    },
    /// Inspect and resolve the human-review escalation queue.
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List items in descending priority order.
    List {
        /// Include resolved items.
        #[arg(long)]
        all: bool,
        /// Cap the number of items shown.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print one item as JSON.
    Show { task_id: String },
    /// Attach a resolution annotation and retire the item.
    Resolve {
        task_id: String,
        /// Root-cause category (e.g. selector_drift, timing, env).
        #[arg(long)]
        root_cause: String,
        /// Fix strategy applied by the reviewer.
        #[arg(long)]
        strategy: String,
        /// Severity: low, medium, high, critical.
        #[arg(long)]
        severity: String,
        /// Free-form reviewer notes.
        #[arg(long, default_value = "")]
        notes: String,
        /// Path to a patch file to attach.
        #[arg(long)]
        patch_file: Option<PathBuf>,
    },
    /// Print aggregate queue counters.
    Stats,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILURE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Fix {
            test_path,
            error,
            task_id,
            feature,
            unattended,
        } => cmd_fix(test_path, error, task_id, feature, unattended),
        Command::Queue { command } => cmd_queue(command),
    }
}

fn cmd_init(force: bool) -> Result<i32> {
    let path = Path::new(CONFIG_PATH);
    if path.exists() && !force {
        println!("{CONFIG_PATH} already exists (use --force to overwrite)");
        return Ok(exit_codes::OK);
    }
    write_config(path, &FixerConfig::default())?;
    println!("wrote {CONFIG_PATH}");
    Ok(exit_codes::OK)
}

fn cmd_fix(
    test_path: PathBuf,
    error: String,
    task_id: Option<String>,
    feature: Option<String>,
    unattended: bool,
) -> Result<i32> {
    let root = env::current_dir().context("resolve working directory")?;
    let cfg = load_config(Path::new(CONFIG_PATH))?;

    let store = FileKvStore::new(root.join(".fixer/store"));
    let learning = FileLearningStore::new(root.join(".fixer/learning"));
    let runner = CommandRegressionRunner {
        command: cfg.regression_command.clone(),
        workdir: root.clone(),
        timeout: cfg.regression_timeout(),
        output_limit_bytes: cfg.output_limit_bytes,
    };
    let generator = CliProposalGenerator {
        command: cfg.generator_command.clone(),
        workdir: root.clone(),
        timeout: cfg.generator_timeout(),
        output_limit_bytes: cfg.output_limit_bytes,
    };
    let engine = FixEngine {
        root: &root,
        runner: &runner,
        generator: &generator,
        store: &store,
        learning: &learning,
        cfg: &cfg,
        policy: EscalationPolicy {
            enabled: cfg.escalation_enabled && !unattended,
        },
    };
    let request = FixRequest {
        test_path,
        error_message: error,
        task_id,
        feature,
    };

    let result = engine.attempt_fix(&request)?;

    match &result.outcome {
        FixOutcome::Success {
            diagnosis,
            comparison,
            artifacts,
        } => {
            println!("fixed: {diagnosis}");
            println!(
                "regression: {} passed / {} failed (was {} / {})",
                comparison.after_passed,
                comparison.after_failed,
                comparison.baseline_passed,
                comparison.baseline_failed
            );
            println!("artifacts: {}", artifacts.diff_path.display());
            println!("cost: ${:.4}", result.cost);
            Ok(exit_codes::OK)
        }
        FixOutcome::Escalated {
            reason,
            severity,
            item,
        } => {
            println!(
                "escalated: {} (severity {}, priority {:.2})",
                reason.as_str(),
                severity.as_str(),
                item.priority.unwrap_or(0.0)
            );
            println!("task: {}", item.task_id);
            println!("cost: ${:.4}", result.cost);
            Ok(exit_codes::ESCALATED)
        }
        FixOutcome::Aborted { error } => {
            eprintln!("aborted: {error}");
            eprintln!("cost: ${:.4}", result.cost);
            Ok(exit_codes::FAILURE)
        }
    }
}

fn cmd_queue(command: QueueCommand) -> Result<i32> {
    let root = env::current_dir().context("resolve working directory")?;
    let cfg = load_config(Path::new(CONFIG_PATH))?;
    let store = FileKvStore::new(root.join(".fixer/store"));
    let learning = FileLearningStore::new(root.join(".fixer/learning"));
    let queue = EscalationQueue::new(&store, &learning, cfg.queue_ttl());

    match command {
        QueueCommand::List { all, limit } => {
            let items = queue.list(all, limit)?;
            if items.is_empty() {
                println!("queue empty");
                return Ok(exit_codes::OK);
            }
            for item in items {
                println!(
                    "{:.2}  {:8}  {:22}  {}  {}{}",
                    item.priority.unwrap_or(0.0),
                    item.severity.as_str(),
                    item.escalation_reason.as_str(),
                    item.task_id,
                    item.feature,
                    if item.resolved { "  [resolved]" } else { "" }
                );
            }
            Ok(exit_codes::OK)
        }
        QueueCommand::Show { task_id } => {
            let item = queue
                .get(&task_id)?
                .with_context(|| format!("no escalation item for task {task_id}"))?;
            println!("{}", serde_json::to_string_pretty(&item)?);
            Ok(exit_codes::OK)
        }
        QueueCommand::Resolve {
            task_id,
            root_cause,
            strategy,
            severity,
            notes,
            patch_file,
        } => {
            let patch_diff = patch_file
                .map(|path| {
                    fs::read_to_string(&path)
                        .with_context(|| format!("read patch file {}", path.display()))
                })
                .transpose()?;
            let annotation = Annotation {
                root_cause_category: root_cause,
                fix_strategy: strategy,
                severity: parse_severity(&severity)?,
                human_notes: notes,
                patch_diff,
            };
            if queue.resolve(&task_id, &annotation)? {
                println!("resolved {task_id}");
                Ok(exit_codes::OK)
            } else {
                eprintln!("no escalation item for task {task_id}");
                Ok(exit_codes::FAILURE)
            }
        }
        QueueCommand::Stats => {
            let stats = queue.stats()?;
            println!("total:          {}", stats.total_count);
            println!("active:         {}", stats.active_count);
            println!("resolved:       {}", stats.resolved_count);
            println!("avg priority:   {:.2}", stats.avg_priority);
            println!("high priority:  {}", stats.high_priority_count);
            Ok(exit_codes::OK)
        }
    }
}

fn parse_severity(raw: &str) -> Result<Severity> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        "critical" => Ok(Severity::Critical),
        other => Err(anyhow!(
            "unknown severity {other:?} (expected low, medium, high, or critical)"
        )),
    }
}
