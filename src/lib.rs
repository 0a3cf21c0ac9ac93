//! pipewright - Pipeline orchestration over an external worker command
//!
//! This crate sequences the phases of a delivery pipeline through an external
//! text-in/text-out worker, validates every response against a per-role output
//! contract, retries with corrective feedback, and records progress in a
//! resumable, queryable run document.
//!
//! pipewright can be used in two ways:
//! - **CLI**: Install via `cargo install pipewright` and run from command line
//! - **Library**: Add as a dependency and drive [`Runner`] directly
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Execute a pipeline definition
//! pipewright run pipelines/checkout.toml
//!
//! # Check progress from another terminal
//! pipewright status checkout-flow-20260825143000 --json
//!
//! # Continue an interrupted run
//! pipewright resume checkout-flow-20260825143000
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use camino::Utf8Path;
//! use pipewright::escalation::{EscalationDecision, PolicyEscalation};
//! use pipewright::worker::CommandWorker;
//! use pipewright::{Pipeline, RunStore, Runner};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Arc::new(Pipeline::load(Utf8Path::new("pipelines/checkout.toml"))?);
//! let backend = Arc::new(CommandWorker::new(
//!     vec!["claude".into(), "-p".into()],
//!     Duration::from_secs(600),
//! )?);
//! let escalation = Arc::new(PolicyEscalation(EscalationDecision::Skip));
//!
//! let mut store = RunStore::create(
//!     Utf8Path::new(".pipewright/runs/demo"),
//!     "demo",
//!     &pipeline,
//!     "pipelines/checkout.toml",
//! )?;
//! let runner = Runner::new(pipeline, backend, escalation, 3);
//! let outcome = runner.run(&mut store).await?;
//! println!("run finished: {outcome}");
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Contracts
//!
//! pipewright persists and emits camelCase JSON with explicit schema versions:
//!
//! - Run document: `run.v1` (the file at `runs/<run-id>/run.json`)
//! - Status output: `status.v1` (`pipewright status --json`)
//! - Run summary: `run-summary.v1` (`pipewright run --json` / `resume --json`)
//!
//! The run document's `history` array is append-only, so external tools can
//! tail it as an audit log.

// ============================================================================
// Stable public API
// ============================================================================

/// Pipeline definition loaded from TOML: validated phases plus the derived
/// execution schedule.
pub use pipeline::Pipeline;

/// Phase identifier, unique within one pipeline.
pub use types::PhaseId;

/// Effective configuration with discovery and precedence:
/// CLI arguments > config file > built-in defaults.
pub use config::Config;

/// Library-level error type.
///
/// Library code returns `PipewrightError` and does NOT call
/// `std::process::exit()`; the CLI maps errors to exit codes at the boundary.
pub use error::PipewrightError;

/// Exit codes matching the documented exit code table.
///
/// Use named constants (e.g. [`ExitCode::SUCCESS`],
/// [`ExitCode::ESCALATION_HALT`]) or [`as_i32()`](ExitCode::as_i32) to get the
/// numeric value.
pub use exit_codes::ExitCode;

/// Drives one run: walks the schedule, dispatches phases to the worker, and
/// commits outcomes to the run document.
pub use runner::{RunOutcome, Runner};

/// Handle over one run's persisted document.
pub use store::RunStore;

/// Derived progress totals, embedded in every persisted document and status
/// output.
pub use types::ProgressSnapshot;

// ============================================================================
// Modules
// ============================================================================

pub mod atomic;
pub mod classifier;
pub mod config;
pub mod contracts;
pub mod controller;
pub mod error;
pub mod escalation;
pub mod exit_codes;
pub mod extraction;
pub mod gate;
pub mod lock;
pub mod logging;
pub mod metrics;
pub mod paths;
pub mod pipeline;
pub mod runner;
pub mod store;
pub mod types;
pub mod worker;

// CLI module - internal implementation detail, not part of stable public API
// Exported with #[doc(hidden)] to allow white-box testing of CLI flag parsing
#[doc(hidden)]
pub mod cli;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_support;
