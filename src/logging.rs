//! Tracing setup for the binaries, and the per-run span the engine and
//! its workers log under.

use tracing::{info_span, Span};
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{EngineError, Result};

/// Installs the process-wide subscriber. An explicit `RUST_LOG` wins;
/// `fallback` covers running the CLI or a demo without one.
pub fn init_logging(fallback: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(fallback).map_err(|e| {
            EngineError::InvalidArgument(format!("bad log filter `{fallback}`: {e}"))
        })?,
    };
    fmt()
        .compact()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| EngineError::InvalidArgument(format!("tracing subscriber already set: {e}")))
}

/// Span covering one `start()` call. Worker threads enter a clone of it,
/// so per-vertex events carry the run they belong to.
pub(crate) fn engine_run_span(vertices: usize, workers: usize) -> Span {
    info_span!("engine_run", vertices, workers)
}
