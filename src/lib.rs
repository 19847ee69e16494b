#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod io;
pub mod logging;
pub mod metrics;
pub mod program;
pub mod programs;
pub mod spm;
pub mod types;

mod cache;

pub use crate::config::EngineConfig;
pub use crate::engine::AsyncEngine;
pub use crate::error::{EngineError, Result};
pub use crate::graph::Graph;
pub use crate::metrics::MetricsSnapshot;
pub use crate::program::{Context, VertexProgram};
pub use crate::types::{EdgeDir, EdgeId, SpmWord, VertexId};
