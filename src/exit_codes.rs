//! Exit code constants and error kind mapping for pipewright
//!
//! This module defines standardized exit codes for different failure modes
//! and provides mapping from `PipewrightError` to exit codes and error kinds.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General failure (run not found, corrupt document, IO) |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `PIPELINE_INVALID` | Malformed pipeline definition or unknown role |
//! | 9 | `LOCK_HELD` | Another process holds the run lock |
//! | 10 | `WORKER_TIMEOUT` | Worker invocation timed out (fatal context) |
//! | 70 | `WORKER_FAILURE` | Worker transport/invocation failed (fatal context) |
//! | 75 | `ESCALATION_HALT` | Run paused by an escalation `abort` decision |
//!
//! `ESCALATION_HALT` is produced from the `Paused` run outcome, not from an
//! error: an aborted run is resumable and the state document is intact.

use crate::error::{PipewrightError, PipelineError, StoreError};
use crate::types::ErrorKind;
use crate::worker::WorkerError;

/// Exit code constants for pipewright
pub mod codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;

    /// General failure - run not found, unreadable document, IO errors
    pub const INTERNAL: i32 = 1;

    /// CLI arguments error - invalid or missing command-line arguments
    pub const CLI_ARGS: i32 = 2;

    /// Pipeline invalid - definition failed validation or names an unknown role
    pub const PIPELINE_INVALID: i32 = 3;

    /// Lock held - another process is already working on the same run
    pub const LOCK_HELD: i32 = 9;

    /// Worker timeout - invocation exceeded the configured timeout
    pub const WORKER_TIMEOUT: i32 = 10;

    /// Worker failure - worker process could not be spawned or exited nonzero
    pub const WORKER_FAILURE: i32 = 70;

    /// Escalation halt - operator chose `abort` at an escalation point
    pub const ESCALATION_HALT: i32 = 75;
}

/// Exit codes matching the documented exit code table.
///
/// `ExitCode` provides type-safe exit code handling. Use the named constants
/// for common exit codes, or [`as_i32()`](Self::as_i32) to get the numeric
/// value for `std::process::exit()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - operation completed successfully
    pub const SUCCESS: ExitCode = ExitCode(codes::SUCCESS);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(codes::INTERNAL);

    /// CLI arguments error - invalid or missing command-line arguments
    pub const CLI_ARGS: ExitCode = ExitCode(codes::CLI_ARGS);

    /// Pipeline invalid - definition failed validation or names an unknown role
    pub const PIPELINE_INVALID: ExitCode = ExitCode(codes::PIPELINE_INVALID);

    /// Lock held - another process is already working on the same run
    pub const LOCK_HELD: ExitCode = ExitCode(codes::LOCK_HELD);

    /// Worker timeout - invocation exceeded the configured timeout
    pub const WORKER_TIMEOUT: ExitCode = ExitCode(codes::WORKER_TIMEOUT);

    /// Worker failure - worker process could not be spawned or exited nonzero
    pub const WORKER_FAILURE: ExitCode = ExitCode(codes::WORKER_FAILURE);

    /// Escalation halt - operator chose `abort` at an escalation point
    pub const ESCALATION_HALT: ExitCode = ExitCode(codes::ESCALATION_HALT);

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an `ExitCode` from a raw i32 value.
    ///
    /// Prefer using the named constants when possible.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

/// Convert `PipewrightError` to (`exit_code`, `error_kind`) tuple
#[must_use]
pub fn error_to_exit_code_and_kind(error: &PipewrightError) -> (ExitCode, ErrorKind) {
    match error {
        // Configuration errors map to CLI_ARGS
        PipewrightError::Config(_) => (ExitCode::CLI_ARGS, ErrorKind::CliArgs),

        // Definition problems are fatal at load time
        PipewrightError::Pipeline(pipeline_err) => match pipeline_err {
            PipelineError::UnknownRole { .. } => {
                (ExitCode::PIPELINE_INVALID, ErrorKind::UnknownRole)
            }
            _ => (ExitCode::PIPELINE_INVALID, ErrorKind::MalformedPipeline),
        },
        PipewrightError::UnknownRole { .. } => {
            (ExitCode::PIPELINE_INVALID, ErrorKind::UnknownRole)
        }

        // Store errors: the status contract requires exit 1 for both a
        // missing run and an unreadable document
        PipewrightError::Store(store_err) => match store_err {
            StoreError::Corrupt { .. } => (ExitCode::INTERNAL, ErrorKind::StateCorrupt),
            _ => (ExitCode::INTERNAL, ErrorKind::Unknown),
        },

        // Worker errors that reach the top level (the controller normally
        // absorbs them into the retry budget)
        PipewrightError::Worker(worker_err) => match worker_err {
            WorkerError::Timeout { .. } => (ExitCode::WORKER_TIMEOUT, ErrorKind::WorkerTimeout),
            WorkerError::Unavailable { .. } | WorkerError::Failed { .. } => {
                (ExitCode::WORKER_FAILURE, ErrorKind::WorkerFailure)
            }
        },

        // Concurrent execution / lock held
        PipewrightError::Lock(_) => (ExitCode::LOCK_HELD, ErrorKind::LockHeld),

        // All other errors default to exit code 1 with Unknown kind
        PipewrightError::Io(_) => (ExitCode::INTERNAL, ErrorKind::Unknown),
    }
}

impl PipewrightError {
    /// Map this error to its CLI exit code
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        error_to_exit_code_and_kind(self).0
    }

    /// Map this error to its wire-format error kind
    #[must_use]
    pub fn to_error_kind(&self) -> ErrorKind {
        error_to_exit_code_and_kind(self).1
    }
}

impl From<&PipewrightError> for (ExitCode, ErrorKind) {
    fn from(err: &PipewrightError) -> (ExitCode, ErrorKind) {
        error_to_exit_code_and_kind(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::lock::LockError;

    #[test]
    fn test_exit_code_constants() {
        assert_eq!(codes::SUCCESS, 0);
        assert_eq!(codes::INTERNAL, 1);
        assert_eq!(codes::CLI_ARGS, 2);
        assert_eq!(codes::PIPELINE_INVALID, 3);
        assert_eq!(codes::LOCK_HELD, 9);
        assert_eq!(codes::WORKER_TIMEOUT, 10);
        assert_eq!(codes::WORKER_FAILURE, 70);
        assert_eq!(codes::ESCALATION_HALT, 75);
    }

    #[test]
    fn test_config_error_mapping() {
        let err = PipewrightError::Config(ConfigError::InvalidValue {
            key: "worker.timeout_secs".to_string(),
            value: "abc".to_string(),
        });
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::CLI_ARGS);
        assert_eq!(kind, ErrorKind::CliArgs);
    }

    #[test]
    fn test_malformed_pipeline_mapping() {
        let err = PipewrightError::Pipeline(PipelineError::Empty);
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::PIPELINE_INVALID);
        assert_eq!(kind, ErrorKind::MalformedPipeline);
    }

    #[test]
    fn test_unknown_role_mapping() {
        let err = PipewrightError::Pipeline(PipelineError::UnknownRole {
            phase: "impl".to_string(),
            role: "wizardry".to_string(),
        });
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::PIPELINE_INVALID);
        assert_eq!(kind, ErrorKind::UnknownRole);

        let err = PipewrightError::UnknownRole {
            role: "wizardry".to_string(),
        };
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::PIPELINE_INVALID);
        assert_eq!(kind, ErrorKind::UnknownRole);
    }

    #[test]
    fn test_corrupt_document_mapping() {
        // The status contract requires exit 1 for unreadable documents;
        // the kind still distinguishes corruption from a missing run.
        let err = PipewrightError::Store(StoreError::Corrupt {
            path: ".pipewright/runs/r1/run.json".to_string(),
            reason: "expected value at line 1".to_string(),
        });
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::INTERNAL);
        assert_eq!(kind, ErrorKind::StateCorrupt);
    }

    #[test]
    fn test_run_not_found_mapping() {
        let err = PipewrightError::Store(StoreError::NotFound {
            run_id: "r1".to_string(),
            path: ".pipewright/runs/r1/run.json".to_string(),
        });
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::INTERNAL);
        assert_eq!(kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_worker_timeout_mapping() {
        let err = PipewrightError::Worker(WorkerError::Timeout { seconds: 600 });
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::WORKER_TIMEOUT);
        assert_eq!(kind, ErrorKind::WorkerTimeout);
    }

    #[test]
    fn test_worker_failure_mapping() {
        let err = PipewrightError::Worker(WorkerError::Unavailable {
            reason: "command not found".to_string(),
        });
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::WORKER_FAILURE);
        assert_eq!(kind, ErrorKind::WorkerFailure);

        let err = PipewrightError::Worker(WorkerError::Failed {
            status: 3,
            stderr_tail: "boom".to_string(),
        });
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::WORKER_FAILURE);
        assert_eq!(kind, ErrorKind::WorkerFailure);
    }

    #[test]
    fn test_lock_error_mapping() {
        let lock_err = LockError::Held {
            run_id: "r1".to_string(),
            pid: 12345,
            created_ago: "5m".to_string(),
        };
        let err = PipewrightError::Lock(lock_err);
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::LOCK_HELD);
        assert_eq!(kind, ErrorKind::LockHeld);
    }

    #[test]
    fn test_io_error_mapping() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = PipewrightError::Io(io_err);
        let (code, kind) = (&err).into();
        assert_eq!(code, ExitCode::INTERNAL);
        assert_eq!(kind, ErrorKind::Unknown);
    }
}
