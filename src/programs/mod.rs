//! Ready-made vertex programs, mainly used as conformance examples.

mod pagerank;
mod sssp;

pub use pagerank::{PageRank, DAMPING, SIGNAL_TOLERANCE};
pub use sssp::{MinDistance, ShortestPaths};
