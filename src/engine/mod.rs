//! The asynchronous engine: worker pool, execution driver and the staging
//! policy woven through the gather and scatter phases.

mod scheduler;

use std::thread;

use tracing::{debug, info, trace};

use crate::cache::GatherCache;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::graph::{EdgeHandle, Graph, VertexHandle};
use crate::metrics::{EngineMetrics, MetricsSnapshot};
use crate::program::{Context, VertexProgram};
use crate::spm::SpmStaging;
use crate::types::{EdgeDir, SpmWord, VertexId};

use self::scheduler::Scheduler;

/// Executes a vertex program over a graph until no vertex remains active.
///
/// Workers pop vertices from the active set, lock the closed neighbourhood,
/// run gather-apply-scatter, and release. Between two programs whose
/// neighbourhoods intersect, one happens before the other in its entirety;
/// disjoint neighbourhoods run in parallel.
pub struct AsyncEngine<'g, P: VertexProgram> {
    graph: &'g Graph<P::VertexData, P::EdgeData>,
    config: EngineConfig,
    scheduler: Scheduler,
    cache: GatherCache<P::Gather>,
    staging: SpmStaging,
    metrics: EngineMetrics,
    /// Closed neighbourhood of every vertex, sorted and deduplicated.
    neighbourhoods: Vec<Vec<VertexId>>,
}

impl<'g, P: VertexProgram> AsyncEngine<'g, P> {
    pub fn new(graph: &'g Graph<P::VertexData, P::EdgeData>, config: EngineConfig) -> Result<Self> {
        if config.num_threads == 0 {
            return Err(EngineError::InvalidArgument(
                "engine needs at least one worker thread".into(),
            ));
        }
        let num_vertices = graph.num_vertices();
        let neighbourhoods = (0..num_vertices)
            .map(|i| {
                let vertex = graph.vertex(VertexId(i as u32));
                let mut ids = vec![vertex.id()];
                ids.extend(vertex.in_edges().map(|e| e.source().id()));
                ids.extend(vertex.out_edges().map(|e| e.target().id()));
                ids.sort_unstable();
                ids.dedup();
                ids
            })
            .collect();
        Ok(Self {
            graph,
            config,
            scheduler: Scheduler::new(num_vertices, config.num_threads),
            cache: GatherCache::new(num_vertices, config.enable_gather_cache),
            staging: SpmStaging::new(),
            metrics: EngineMetrics::default(),
            neighbourhoods,
        })
    }

    /// Seeds every vertex into the active set. Call before [`start`], never
    /// from a vertex program.
    ///
    /// [`start`]: AsyncEngine::start
    pub fn signal_all(&self) {
        self.scheduler.signal_all(self.graph.num_vertices());
    }

    /// Schedules one vertex. Usable both for seeding and, through the
    /// context, from running programs.
    pub fn signal(&self, vid: VertexId) {
        self.scheduler.signal(vid);
    }

    /// Runs the worker pool until no vertex remains active and no
    /// activation is deferred. Blocks the caller.
    pub fn start(&self) {
        let span =
            crate::logging::engine_run_span(self.graph.num_vertices(), self.config.num_threads);
        let _guard = span.enter();
        info!(caching = self.cache.enabled(), "engine starting");
        self.scheduler.prepare_run();
        thread::scope(|scope| {
            for worker in 0..self.config.num_threads {
                let span = span.clone();
                scope.spawn(move || {
                    let _guard = span.enter();
                    self.run_worker(worker);
                });
            }
        });
        self.scheduler.assert_quiescent();
        info!(
            vertex_runs = self.metrics.vertex_runs(),
            spm_hits = self.metrics.spm_hits(),
            spm_misses = self.metrics.spm_misses(),
            "engine converged"
        );
    }

    /// Drops the cached gather accumulator of `vid`.
    pub fn clear_gather_cache(&self, vid: VertexId) {
        self.cache.clear(vid);
    }

    pub fn spm_hits(&self) -> u64 {
        self.metrics.spm_hits()
    }

    pub fn spm_misses(&self) -> u64 {
        self.metrics.spm_misses()
    }

    pub fn failed_spm_loads(&self) -> u64 {
        self.staging.failed_loads()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            spm_hits: self.metrics.spm_hits(),
            spm_misses: self.metrics.spm_misses(),
            residency_probes: self.metrics.residency_probes(),
            vertex_runs: self.metrics.vertex_runs(),
            failed_spm_loads: self.staging.failed_loads(),
        }
    }

    pub(crate) fn internal_signal(&self, vid: VertexId) {
        self.scheduler.signal(vid);
    }

    pub(crate) fn internal_post_delta(&self, vid: VertexId, delta: P::Gather) {
        self.cache.post_delta(vid, delta);
    }

    pub(crate) fn internal_clear_gather_cache(&self, vid: VertexId) {
        self.cache.clear(vid);
    }

    fn run_worker(&self, worker: usize) {
        debug!(worker, "worker started");
        while let Some(vid) = self.scheduler.next_job() {
            let neighbourhood = &self.neighbourhoods[vid.index()];
            self.scheduler.acquire(vid, neighbourhood);
            self.preload(&self.graph.vertex(vid));
            self.run_vertex(vid);
            self.scheduler.release(vid, neighbourhood);
        }
        debug!(worker, "worker finished");
    }

    /// Stages the first `load_ahead_distance` edge/vertex pairs before the
    /// program starts: in-edges with their sources first, then out-edges
    /// with their targets for whatever budget remains. Most programs
    /// gather over in-edges and scatter over out-edges.
    fn preload(&self, vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>) {
        let d = self.config.load_ahead_distance;
        let n_in = vertex.num_in_edges();
        for i in 0..d.min(n_in) {
            let edge = vertex.in_edge(i);
            self.stage_edge(&edge);
            self.stage_vertex(&edge.source());
        }
        let spill = d.saturating_sub(n_in);
        for i in 0..spill.min(vertex.num_out_edges()) {
            let edge = vertex.out_edge(i);
            self.stage_edge(&edge);
            self.stage_vertex(&edge.target());
        }
        self.staging.barrier();
    }

    fn run_vertex(&self, vid: VertexId) {
        let mut program = P::default();
        let vertex = self.graph.vertex(vid);
        let ctx = Context::new(self);
        let d = self.config.load_ahead_distance;
        let n_in = vertex.num_in_edges();
        let n_out = vertex.num_out_edges();
        trace!(vertex = vid.0, "executing vertex program");

        // ----- gather -----
        let mut accum: Option<P::Gather> = None;
        let mut deferred_evictions: Vec<VertexId> = Vec::new();

        if let Some(cached) = self.cache.lookup(vid) {
            accum = Some(cached);
            // the gather loops are skipped entirely, so drop the preloaded
            // in-edge block the same way an excluded gather direction does
            self.evict_preloaded_in_block(&vertex, d);
        } else {
            let gather_dir = program.gather_edges(&ctx, &vertex);
            if gather_dir.includes_in() {
                for i in 0..n_in {
                    if i + d < n_in {
                        let ahead = vertex.in_edge(i + d);
                        self.stage_edge(&ahead);
                        self.stage_vertex(&ahead.source());
                    } else if i + d - n_in < n_out {
                        // spill the remaining budget onto out-edges; even an
                        // in-only gather is usually followed by an out scatter
                        let ahead = vertex.out_edge(i + d - n_in);
                        self.stage_edge(&ahead);
                        self.stage_vertex(&ahead.target());
                    }
                    let edge = vertex.in_edge(i);
                    let source = edge.source();
                    self.probe_spm(&edge, &source);
                    let value = program.gather(&ctx, &vertex, &edge);
                    match accum.as_mut() {
                        Some(total) => *total += value,
                        None => accum = Some(value),
                    }
                    self.evict_edge(&edge);
                    if edge.has_opposite() {
                        // the neighbour may come back as a scatter target;
                        // keep it staged until the program ends
                        deferred_evictions.push(source.id());
                    } else {
                        self.evict_vertex(&source);
                    }
                }
            } else {
                self.evict_preloaded_in_block(&vertex, d);
            }
            if gather_dir.includes_out() {
                for i in 0..n_out {
                    if i + d < n_out {
                        let ahead = vertex.out_edge(i + d);
                        self.stage_edge(&ahead);
                        self.stage_vertex(&ahead.target());
                    }
                    let edge = vertex.out_edge(i);
                    let target = edge.target();
                    self.probe_spm(&edge, &target);
                    let value = program.gather(&ctx, &vertex, &edge);
                    match accum.as_mut() {
                        Some(total) => *total += value,
                        None => accum = Some(value),
                    }
                    // the first load-ahead block stays staged for scatter
                    if i >= d {
                        self.evict_edge(&edge);
                        self.evict_vertex(&target);
                    }
                }
            }
            if let Some(total) = accum.as_ref() {
                self.cache.store(vid, total.clone());
            }
        }

        // ----- apply -----
        let total = accum.unwrap_or_default();
        program.apply(&ctx, &vertex, &total);

        // ----- scatter -----
        let scatter_dir = program.scatter_edges(&ctx, &vertex);
        if scatter_dir.includes_out() {
            for i in 0..n_out {
                if i + d < n_out {
                    let ahead = vertex.out_edge(i + d);
                    self.stage_edge(&ahead);
                    self.stage_vertex(&ahead.target());
                } else if scatter_dir == EdgeDir::All && i + d - n_out < n_in {
                    let ahead = vertex.in_edge(i + d - n_out);
                    self.stage_edge(&ahead);
                    self.stage_vertex(&ahead.source());
                }
                let edge = vertex.out_edge(i);
                let target = edge.target();
                self.probe_spm(&edge, &target);
                program.scatter(&ctx, &vertex, &edge);
                self.evict_edge(&edge);
                self.evict_vertex(&target);
            }
        } else {
            // scatter skips out-edges; drop the block preloaded for them
            for i in 0..d.min(n_out) {
                let edge = vertex.out_edge(i);
                self.evict_edge(&edge);
                self.evict_vertex(&edge.target());
            }
        }
        if scatter_dir.includes_in() {
            for i in 0..n_in {
                if i + d < n_in {
                    let ahead = vertex.in_edge(i + d);
                    self.stage_edge(&ahead);
                    self.stage_vertex(&ahead.source());
                }
                let edge = vertex.in_edge(i);
                let source = edge.source();
                self.probe_spm(&edge, &source);
                program.scatter(&ctx, &vertex, &edge);
                self.evict_edge(&edge);
                self.evict_vertex(&source);
            }
        }

        for id in deferred_evictions {
            self.evict_vertex(&self.graph.vertex(id));
        }
        self.metrics.record_vertex_run();
    }

    fn evict_preloaded_in_block(
        &self,
        vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>,
        d: usize,
    ) {
        for i in 0..d.min(vertex.num_in_edges()) {
            let edge = vertex.in_edge(i);
            self.evict_edge(&edge);
            self.evict_vertex(&edge.source());
        }
    }

    /// Counts a residency probe per non-empty datum kind. The driver reads
    /// from main memory either way; the probes only measure what a real
    /// scratchpad would have answered.
    fn probe_spm(
        &self,
        edge: &EdgeHandle<'_, P::VertexData, P::EdgeData>,
        vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>,
    ) {
        if !P::EdgeData::IS_EMPTY {
            self.metrics
                .record_probe(self.staging.read_edata(edge.id()).is_some());
        }
        if !P::VertexData::IS_EMPTY {
            self.metrics
                .record_probe(self.staging.read_vdata(vertex.id()).is_some());
        }
    }

    fn stage_edge(&self, edge: &EdgeHandle<'_, P::VertexData, P::EdgeData>) {
        if P::EdgeData::IS_EMPTY {
            return;
        }
        self.staging.load_edata(edge.id(), edge.data().to_word());
    }

    fn stage_vertex(&self, vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>) {
        if P::VertexData::IS_EMPTY {
            return;
        }
        self.staging.load_vdata(vertex.id(), vertex.data().to_word());
    }

    fn evict_edge(&self, edge: &EdgeHandle<'_, P::VertexData, P::EdgeData>) {
        if P::EdgeData::IS_EMPTY {
            return;
        }
        if let Some(word) = self.staging.remove_edata(edge.id()) {
            edge.set_data(P::EdgeData::from_word(word));
        }
    }

    fn evict_vertex(&self, vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>) {
        if P::VertexData::IS_EMPTY {
            return;
        }
        if let Some(word) = self.staging.remove_vdata(vertex.id()) {
            vertex.set_data(P::VertexData::from_word(word));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::PageRank;
    use crate::types::VertexId;

    #[test]
    fn zero_workers_is_rejected_at_construction() {
        let mut graph: Graph<f64, ()> = Graph::new();
        graph.add_vertex(VertexId(0), 1.0);
        let config = EngineConfig {
            num_threads: 0,
            ..EngineConfig::default()
        };
        assert!(AsyncEngine::<PageRank>::new(&graph, config).is_err());
    }

    #[test]
    fn start_without_signals_terminates() {
        let mut graph: Graph<f64, ()> = Graph::new();
        graph.add_vertex(VertexId(0), 1.0);
        let engine = AsyncEngine::<PageRank>::new(&graph, EngineConfig::default()).unwrap();
        engine.start();
        assert_eq!(engine.metrics().vertex_runs, 0);
    }

    #[test]
    fn engine_runs_back_to_back() {
        let mut graph: Graph<f64, ()> = Graph::new();
        graph.add_vertex(VertexId(0), 1.0);
        graph.add_vertex(VertexId(1), 1.0);
        graph.add_edge(VertexId(0), VertexId(1), ());
        let engine = AsyncEngine::<PageRank>::new(&graph, EngineConfig::default()).unwrap();
        engine.signal_all();
        engine.start();
        let first = engine.metrics().vertex_runs;
        assert!(first >= 2);
        engine.signal_all();
        engine.start();
        assert!(engine.metrics().vertex_runs > first);
    }
}
