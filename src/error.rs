//! Library-level error taxonomy for pipewright
//!
//! `PipewrightError` is the primary error type returned by library
//! operations. Recoverable conditions (validation failures, worker timeouts)
//! are absorbed by the retry controller and never reach this type; what
//! surfaces here is fatal for the current command and maps to a process exit
//! code via `exit_codes::error_to_exit_code_and_kind`.
//!
//! Escalation is deliberately NOT an error: exhausting the retry budget
//! produces a `PhaseOutcome::Escalated` control result, never an `Err`.

use std::io;
use thiserror::Error;

use crate::lock::LockError;
use crate::worker::WorkerError;

/// Top-level error type for pipewright library operations.
///
/// Library code returns `PipewrightError` and does NOT call
/// `std::process::exit()`; the CLI maps errors to exit codes.
#[derive(Error, Debug)]
pub enum PipewrightError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline definition error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Unknown worker role: {role}")]
    UnknownRole { role: String },

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker invocation error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Run lock error: {0}")]
    Lock(#[from] LockError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file {path}: {reason}")]
    InvalidFile { path: String, reason: String },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Pipeline definition load/validation errors.
///
/// All of these are fatal at load time; a run is never created from a
/// definition that fails validation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Pipeline defines no phases")]
    Empty,

    #[error("Pipeline id is empty")]
    MissingId,

    #[error("Duplicate phase id: {id}")]
    DuplicatePhase { id: String },

    #[error("Phase {phase} has unknown role: {role}")]
    UnknownRole { phase: String, role: String },

    #[error("Phase {phase} depends on undeclared phase: {dependency}")]
    UnknownDependency { phase: String, dependency: String },

    #[error("Phase {phase} depends on itself")]
    SelfDependency { phase: String },

    #[error("Phase {phase} declares both depends_on and parallel_group")]
    ConflictingDeclarations { phase: String },

    #[error("Parallel group {group} is declared in non-consecutive positions")]
    GroupNotContiguous { group: String },

    #[error("Phase {phase} has estimated_minutes = 0")]
    ZeroEstimate { phase: String },

    #[error("Dependency cycle involving phase {phase}")]
    CycleDetected { phase: String },
}

/// Progress state store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Run {run_id} not found at {path}")]
    NotFound { run_id: String, path: String },

    #[error("State document at {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Unknown phase id: {phase}")]
    UnknownPhase { phase: String },

    #[error("Invalid status transition for phase {phase}: {from} -> {to}")]
    InvalidTransition {
        phase: String,
        from: String,
        to: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
