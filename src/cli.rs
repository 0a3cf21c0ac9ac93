//! Command-line interface
//!
//! `run()` owns all terminal output: command handlers print results to
//! stdout, errors are reported to stderr, and `main.rs` only exits with
//! the returned code. `status` and `view` are read-only and take no
//! lock, so they work from another terminal while a run is active.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use crate::classifier;
use crate::config::{Config, ConfigSource, EscalationMode, WorkerTimeout};
use crate::error::{ConfigError, PipewrightError};
use crate::escalation::{
    ConsoleEscalation, EscalationDecision, EscalationHandler, PolicyEscalation,
};
use crate::exit_codes::ExitCode;
use crate::lock::RunLock;
use crate::logging;
use crate::paths;
use crate::pipeline::Pipeline;
use crate::runner::{RunOutcome, Runner};
use crate::store::RunStore;
use crate::types::{PhaseId, PhaseStatus, RunSummaryJsonOutput, StatusJsonOutput};
use crate::worker::{CommandWorker, WorkerBackend};

/// pipewright - phase pipeline orchestrator
#[derive(Parser)]
#[command(name = "pipewright")]
#[command(about = "Sequences pipeline phases through an external worker with validation gates")]
#[command(long_about = r#"
pipewright sequences the phases of a delivery pipeline through an external
text-in/text-out worker command, validates every response against a
per-role output contract, retries with corrective feedback, and records
progress in a resumable run document.

EXAMPLES:
  # Execute a pipeline definition
  pipewright run pipelines/checkout.toml

  # Unattended run that skips any phase that exhausts its retries
  pipewright run pipelines/checkout.toml --escalation skip

  # Check progress from another terminal
  pipewright status checkout-flow-20260825143000

  # Full run document, including history and notes
  pipewright view checkout-flow-20260825143000 --json

  # Continue an interrupted run
  pipewright resume checkout-flow-20260825143000

CONFIGURATION:
  Settings are loaded with precedence: CLI flags > config file > defaults.
  The config file is discovered by searching upward from the working
  directory for .pipewright/config.toml, stopping at the repository root.

RUN STATE:
  Run state lives under $PIPEWRIGHT_HOME (default: .pipewright/) in
  runs/<run-id>/run.json. `run` and `resume` hold the run lock for the
  duration; `status` and `view` only read.
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Retry budget per phase (overrides config)
    #[arg(long, global = true)]
    pub max_attempts: Option<u32>,

    /// Worker timeout in seconds (overrides config; min: 5)
    #[arg(long, global = true)]
    pub worker_timeout: Option<u64>,

    /// Escalation mode when a phase exhausts its retries
    #[arg(long, global = true, value_parser = ["prompt", "retry", "skip", "abort"])]
    pub escalation: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Execute a pipeline definition from the beginning
    ///
    /// Creates a new run document, walks the schedule in order, and
    /// exits 0 when every phase reaches a terminal status. An `abort`
    /// escalation decision pauses the run and exits 75; the run can be
    /// continued later with `resume`.
    ///
    /// EXAMPLES:
    ///   pipewright run pipelines/checkout.toml
    ///   pipewright run pipelines/checkout.toml --run-id checkout-rc1
    ///   pipewright run pipelines/checkout.toml --escalation skip --json
    ///   pipewright run pipelines/checkout.toml --dry-run
    Run {
        /// Path to the pipeline definition (TOML)
        pipeline: Utf8PathBuf,

        /// Run identifier (default: <pipeline-id>-<timestamp>)
        #[arg(long)]
        run_id: Option<String>,

        /// Load, validate, and classify, then print the plan without
        /// executing or writing anything
        #[arg(long)]
        dry_run: bool,

        /// Emit the final run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Continue an interrupted run
    ///
    /// Re-opens the run document and executes only the phases that are
    /// not yet terminal. Phases left in_progress by a crash or abort run
    /// again from scratch; completed work is never repeated.
    ///
    /// EXAMPLES:
    ///   pipewright resume checkout-flow-20260825143000
    ///   pipewright resume checkout-flow-20260825143000 --escalation retry
    Resume {
        /// Run identifier to resume
        run_id: String,

        /// Pipeline definition path (default: the path recorded in the run)
        #[arg(long)]
        pipeline: Option<Utf8PathBuf>,

        /// Emit the final run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show progress for a run
    ///
    /// Reads the persisted run document and prints per-phase statuses
    /// and the derived progress snapshot. Exits 1 when the run does not
    /// exist or its document cannot be read.
    ///
    /// EXAMPLES:
    ///   pipewright status checkout-flow-20260825143000
    ///   pipewright status checkout-flow-20260825143000 --json
    Status {
        /// Run identifier to inspect
        run_id: String,

        /// Output status as JSON (status.v1 schema)
        #[arg(long)]
        json: bool,
    },

    /// Show the full run document, including history and notes
    ///
    /// EXAMPLES:
    ///   pipewright view checkout-flow-20260825143000
    ///   pipewright view checkout-flow-20260825143000 --json
    View {
        /// Run identifier to inspect
        run_id: String,

        /// Output the raw run document as JSON (run.v1 schema)
        #[arg(long)]
        json: bool,
    },
}

/// Main CLI execution function.
///
/// Handles all output including errors and returns the exit code for
/// `main.rs` to pass to `std::process::exit`. A paused run is not an
/// error: it maps to the dedicated escalation-halt code so scripts can
/// tell "resumable" from "broken".
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(cli.verbose) {
        eprintln!("warning: failed to initialize logging: {e}");
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("✗ {err}");
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                pipeline,
                run_id,
                dry_run,
                json,
            } => execute_run(&pipeline, run_id.as_deref(), dry_run, json, &config).await,
            Commands::Resume {
                run_id,
                pipeline,
                json,
            } => execute_resume(&run_id, pipeline.as_deref(), json, &config).await,
            Commands::Status { run_id, json } => execute_status(&run_id, json),
            Commands::View { run_id, json } => execute_view(&run_id, json),
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => {
            if let Some(app_error) = error.downcast_ref::<PipewrightError>() {
                eprintln!("✗ {app_error}");
                Err(app_error.to_exit_code())
            } else {
                eprintln!("✗ Unexpected error: {error:#}");
                Err(ExitCode::INTERNAL)
            }
        }
    }
}

async fn execute_run(
    pipeline_path: &Utf8Path,
    run_id_override: Option<&str>,
    dry_run: bool,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let pipeline = Arc::new(Pipeline::load(pipeline_path)?);
    if dry_run {
        print_plan(&pipeline);
        return Ok(ExitCode::SUCCESS);
    }

    let run_id = match run_id_override {
        Some(id) => id.to_string(),
        None => generate_run_id(&pipeline.id),
    };

    let home = paths::home_dir();
    let run_dir = paths::run_dir(&home, &run_id);
    let _lock = RunLock::acquire(&run_dir, &run_id).map_err(PipewrightError::Lock)?;

    let mut store = RunStore::create(&run_dir, &run_id, &pipeline, pipeline_path.as_str())
        .map_err(PipewrightError::Store)?;
    info!(run_id = %run_id, document = %store.document_path(), "run created");

    let runner = build_runner(pipeline, config)?;
    let outcome = runner.run(&mut store).await?;
    report_outcome(&store, outcome, json)?;
    Ok(outcome_exit_code(outcome))
}

async fn execute_resume(
    run_id: &str,
    pipeline_override: Option<&Utf8Path>,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let home = paths::home_dir();
    let run_dir = paths::run_dir(&home, run_id);
    let _lock = RunLock::acquire(&run_dir, run_id).map_err(PipewrightError::Lock)?;

    let mut store = RunStore::open(&run_dir, run_id).map_err(PipewrightError::Store)?;

    let pipeline_path = match pipeline_override {
        Some(path) => path.to_path_buf(),
        None => Utf8PathBuf::from(store.document().pipeline_path.clone()),
    };
    let pipeline = Arc::new(Pipeline::load(&pipeline_path)?);

    // Stored phase state wins over a drifted definition; resume never
    // re-plans completed work.
    let loaded_checksum = format!("blake3:{}", pipeline.source_checksum);
    if store.document().pipeline_checksum != loaded_checksum {
        warn!(
            run_id = %run_id,
            recorded = %store.document().pipeline_checksum,
            loaded = %loaded_checksum,
            "pipeline definition changed since this run was created"
        );
    }

    let runner = build_runner(pipeline, config)?;
    let outcome = runner.run(&mut store).await?;
    report_outcome(&store, outcome, json)?;
    Ok(outcome_exit_code(outcome))
}

fn execute_status(run_id: &str, json: bool) -> Result<ExitCode> {
    let home = paths::home_dir();
    let run_dir = paths::run_dir(&home, run_id);
    let store = RunStore::open(&run_dir, run_id).map_err(PipewrightError::Store)?;

    if json {
        let output = status_json(&store);
        let rendered =
            serde_json::to_string_pretty(&output).context("failed to render status JSON")?;
        println!("{rendered}");
    } else {
        print_status(&store);
    }
    Ok(ExitCode::SUCCESS)
}

fn execute_view(run_id: &str, json: bool) -> Result<ExitCode> {
    let home = paths::home_dir();
    let run_dir = paths::run_dir(&home, run_id);
    let store = RunStore::open(&run_dir, run_id).map_err(PipewrightError::Store)?;

    if json {
        let rendered = serde_json::to_string_pretty(store.document())
            .context("failed to render run document")?;
        println!("{rendered}");
    } else {
        print_status(&store);
        print_history(&store);
        print_notes(&store);
    }
    Ok(ExitCode::SUCCESS)
}

/// Resolve the effective configuration: file (explicit or discovered),
/// then CLI flag overrides.
fn load_config(cli: &Cli) -> Result<Config, PipewrightError> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).map_err(PipewrightError::Config)?,
        None => Config::discover()?,
    };

    if let Some(max_attempts) = cli.max_attempts {
        if max_attempts == 0 {
            return Err(PipewrightError::Config(ConfigError::InvalidValue {
                key: "max-attempts".to_string(),
                value: "0".to_string(),
            }));
        }
        config.max_attempts = max_attempts;
        config.sources.max_attempts = ConfigSource::Cli;
    }
    if let Some(secs) = cli.worker_timeout {
        config.worker_timeout = WorkerTimeout::from_secs(secs);
        config.sources.worker_timeout = ConfigSource::Cli;
    }
    if let Some(mode) = &cli.escalation {
        config.escalation = EscalationMode::parse(mode).ok_or_else(|| {
            PipewrightError::Config(ConfigError::InvalidValue {
                key: "escalation".to_string(),
                value: mode.clone(),
            })
        })?;
        config.sources.escalation = ConfigSource::Cli;
    }

    debug!(
        worker_command = config.sources.worker_command.as_str(),
        worker_timeout = config.sources.worker_timeout.as_str(),
        max_attempts = config.sources.max_attempts.as_str(),
        escalation = config.sources.escalation.as_str(),
        "configuration sources"
    );
    Ok(config)
}

fn build_runner(pipeline: Arc<Pipeline>, config: &Config) -> Result<Runner, PipewrightError> {
    let backend: Arc<dyn WorkerBackend> = Arc::new(
        CommandWorker::new(config.worker_command.clone(), config.worker_timeout.duration)
            .map_err(PipewrightError::Worker)?,
    );
    let escalation = escalation_handler(config.escalation);
    Ok(Runner::new(
        pipeline,
        backend,
        escalation,
        config.max_attempts,
    ))
}

fn escalation_handler(mode: EscalationMode) -> Arc<dyn EscalationHandler> {
    match mode {
        EscalationMode::Prompt => Arc::new(ConsoleEscalation),
        EscalationMode::Retry => Arc::new(PolicyEscalation(EscalationDecision::Retry)),
        EscalationMode::Skip => Arc::new(PolicyEscalation(EscalationDecision::Skip)),
        EscalationMode::Abort => Arc::new(PolicyEscalation(EscalationDecision::Abort)),
    }
}

fn generate_run_id(pipeline_id: &str) -> String {
    format!("{}-{}", pipeline_id, Utc::now().format("%Y%m%d%H%M%S"))
}

const fn outcome_exit_code(outcome: RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Paused => ExitCode::ESCALATION_HALT,
    }
}

fn status_json(store: &RunStore) -> StatusJsonOutput {
    let doc = store.document();
    StatusJsonOutput {
        schema_version: "status.v1".to_string(),
        emitted_at: Utc::now(),
        run_id: store.run_id().to_string(),
        pipeline_id: doc.pipeline_id.clone(),
        phases: store.phase_status_list(),
        snapshot: store.snapshot(),
        current_phase_id: doc.current_phase_id.clone(),
        ready_to_archive: doc.ready_to_archive,
    }
}

/// Render the `--dry-run` plan: declaration order, classified workflow
/// mode per phase, explicit ordering shown where declared.
fn print_plan(pipeline: &Pipeline) {
    println!(
        "Plan: {} ({} phases, {} min estimated)",
        pipeline.id,
        pipeline.phases().len(),
        pipeline.total_estimated_minutes()
    );
    for (index, phase) in pipeline.phases().iter().enumerate() {
        let classification =
            classifier::classify(phase.role, &phase.task_description, phase.estimated_minutes);
        let ordering = match (&phase.depends_on, &phase.parallel_group) {
            (Some(deps), _) if !deps.is_empty() => {
                let names: Vec<&str> = deps.iter().map(PhaseId::as_str).collect();
                format!("  (after: {})", names.join(", "))
            }
            (_, Some(group)) => format!("  (group: {group})"),
            _ => String::new(),
        };
        println!(
            "  {:>2}. {:<24} {:<22} {:>4} min  [{}]{}",
            index + 1,
            phase.id.as_str(),
            phase.role.as_str(),
            phase.estimated_minutes,
            classification.workflow_mode,
            ordering
        );
    }
}

fn print_status(store: &RunStore) {
    let doc = store.document();
    let snapshot = store.snapshot();

    println!("Run: {}", store.run_id());
    println!("  Pipeline: {} ({})", doc.pipeline_id, doc.pipeline_path);
    println!(
        "  Progress: {}/{} phases ({}%)",
        snapshot.completed_count, snapshot.total_count, snapshot.percentage
    );
    println!(
        "  Time: {:.1} min spent, {} min estimated total, {} min estimated remaining",
        snapshot.actual_minutes_spent,
        snapshot.estimated_minutes_total,
        snapshot.remaining_minutes_estimate
    );
    if let Some(efficiency) = snapshot.efficiency_percent {
        println!("  Efficiency: {efficiency}%");
    }
    match &doc.current_phase_id {
        Some(id) => println!("  Current phase: {id}"),
        None => println!("  Current phase: none"),
    }
    println!(
        "  Ready to archive: {}",
        if doc.ready_to_archive { "yes" } else { "no" }
    );

    println!();
    println!("  Phases:");
    for info in store.phase_status_list() {
        let minutes = info
            .actual_minutes
            .map_or_else(String::new, |m| format!("  {m:.1} min"));
        let mode = info
            .workflow_mode
            .map_or_else(String::new, |m| format!("  [{m}]"));
        println!(
            "    {} {:<24} {:<12}{}{}",
            status_glyph(info.status),
            info.phase_id.as_str(),
            info.status.as_str(),
            minutes,
            mode
        );
    }
}

fn print_history(store: &RunStore) {
    let history = &store.document().history;
    if history.is_empty() {
        return;
    }
    println!();
    println!("  History:");
    for event in history {
        let duration = event
            .duration_minutes
            .map_or_else(String::new, |m| format!(" ({m:.1} min)"));
        println!(
            "    {} {:<10} {}{}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.event_type.as_str(),
            event.phase_id,
            duration
        );
    }
}

fn print_notes(store: &RunStore) {
    let doc = store.document();
    let mut header_printed = false;
    for id in &doc.phase_order {
        if let Some(record) = doc.phases.get(id)
            && !record.notes.is_empty()
        {
            if !header_printed {
                println!();
                println!("  Notes:");
                header_printed = true;
            }
            for line in record.notes.lines() {
                println!("    {id}: {line}");
            }
        }
    }
}

const fn status_glyph(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::Pending => "·",
        PhaseStatus::InProgress => "▸",
        PhaseStatus::Completed => "✓",
        PhaseStatus::Skipped => "~",
        PhaseStatus::Blocked => "✗",
    }
}

fn report_outcome(store: &RunStore, outcome: RunOutcome, json: bool) -> Result<()> {
    if json {
        let summary = RunSummaryJsonOutput {
            schema_version: "run-summary.v1".to_string(),
            run_id: store.run_id().to_string(),
            pipeline_id: store.document().pipeline_id.clone(),
            outcome: outcome.as_str().to_string(),
            snapshot: store.snapshot(),
        };
        let rendered =
            serde_json::to_string_pretty(&summary).context("failed to render run summary")?;
        println!("{rendered}");
        return Ok(());
    }

    let snapshot = store.snapshot();
    match outcome {
        RunOutcome::Completed => {
            println!(
                "Run {} completed: {}/{} phases ({}%)",
                store.run_id(),
                snapshot.completed_count,
                snapshot.total_count,
                snapshot.percentage
            );
        }
        RunOutcome::Paused => {
            println!(
                "Run {} paused: {}/{} phases ({}%)",
                store.run_id(),
                snapshot.completed_count,
                snapshot.total_count,
                snapshot.percentage
            );
            println!("Resume with: pipewright resume {}", store.run_id());
        }
    }
    Ok(())
}
