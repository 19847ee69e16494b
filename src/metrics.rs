use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters updated by the workers while a run is in flight.
#[derive(Default)]
pub(crate) struct EngineMetrics {
    spm_hits: AtomicU64,
    spm_misses: AtomicU64,
    residency_probes: AtomicU64,
    vertex_runs: AtomicU64,
}

impl EngineMetrics {
    pub fn record_probe(&self, hit: bool) {
        self.residency_probes.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.spm_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.spm_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_vertex_run(&self) {
        self.vertex_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn spm_hits(&self) -> u64 {
        self.spm_hits.load(Ordering::Relaxed)
    }

    pub fn spm_misses(&self) -> u64 {
        self.spm_misses.load(Ordering::Relaxed)
    }

    pub fn residency_probes(&self) -> u64 {
        self.residency_probes.load(Ordering::Relaxed)
    }

    pub fn vertex_runs(&self) -> u64 {
        self.vertex_runs.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the engine counters.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Residency probes that found their datum staged.
    pub spm_hits: u64,
    /// Residency probes that missed.
    pub spm_misses: u64,
    /// Total residency probes issued; always `spm_hits + spm_misses`.
    pub residency_probes: u64,
    /// Vertex-program executions completed.
    pub vertex_runs: u64,
    /// Staging loads rejected because no scratchpad space could be made.
    pub failed_spm_loads: u64,
}

impl MetricsSnapshot {
    pub fn spm_hit_rate(&self) -> f64 {
        let total = self.spm_hits + self.spm_misses;
        if total == 0 {
            0.0
        } else {
            self.spm_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_counts_stay_consistent() {
        let metrics = EngineMetrics::default();
        metrics.record_probe(true);
        metrics.record_probe(false);
        metrics.record_probe(false);
        assert_eq!(metrics.spm_hits(), 1);
        assert_eq!(metrics.spm_misses(), 2);
        assert_eq!(
            metrics.residency_probes(),
            metrics.spm_hits() + metrics.spm_misses()
        );
    }

    #[test]
    fn hit_rate_handles_empty_counters() {
        let snapshot = MetricsSnapshot::default();
        assert_eq!(snapshot.spm_hit_rate(), 0.0);
    }
}
