//! Logging initialization for pipewright
//!
//! Structured logging via `tracing`, configurable with `RUST_LOG`. Output
//! goes to stderr so `--json` results on stdout stay machine-readable.

use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the tracing subscriber.
///
/// Verbose mode lowers the default filter to debug and reports span close
/// events with timings.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("pipewright=debug,info")
            } else {
                EnvFilter::try_new("pipewright=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_target(verbose)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .compact();
    let layer = if verbose {
        layer.with_span_events(FmtSpan::CLOSE)
    } else {
        layer
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()?;

    Ok(())
}

/// Span covering one phase's execution, retries included
pub fn phase_span(run_id: &str, phase: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "phase_execution",
        run_id = %run_id,
        phase = %phase,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_tolerant_of_double_initialization() {
        // Another test (or harness) may have installed a subscriber already
        let first = init_tracing(false);
        let second = init_tracing(true);
        assert!(first.is_ok() || second.is_err());
    }

    #[test]
    fn test_phase_span_creation() {
        let span = phase_span("checkout-1", "schema");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "phase_execution");
        }
    }
}
