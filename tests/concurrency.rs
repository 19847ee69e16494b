//! Neighbourhood exclusion and scheduling laws observed from the outside.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use grafito::program::{Context, VertexProgram};
use grafito::{AsyncEngine, EngineConfig, EdgeDir, Graph, VertexId};

type Handle<'g> = grafito::graph::VertexHandle<'g, i64, i64>;

static INTERVALS: Mutex<Vec<(u32, Instant, Instant)>> = Mutex::new(Vec::new());

/// Sleeps in apply and records when the vertex held its neighbourhood.
#[derive(Default)]
struct SleepProbe;

impl VertexProgram for SleepProbe {
    type VertexData = i64;
    type EdgeData = i64;
    type Gather = i64;
    type Message = ();

    fn gather_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>) -> EdgeDir {
        EdgeDir::None
    }

    fn apply(&mut self, _ctx: &Context<'_, '_, Self>, vertex: &Handle<'_>, _total: &i64) {
        let start = Instant::now();
        thread::sleep(Duration::from_millis(150));
        INTERVALS
            .lock()
            .unwrap()
            .push((vertex.id().0, start, Instant::now()));
    }

    fn scatter_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>) -> EdgeDir {
        EdgeDir::None
    }
}

fn interval_of(vid: u32) -> (Instant, Instant) {
    let intervals = INTERVALS.lock().unwrap();
    let (_, start, end) = intervals
        .iter()
        .find(|(id, _, _)| *id == vid)
        .copied()
        .unwrap_or_else(|| panic!("vertex {vid} never ran"));
    (start, end)
}

#[test]
fn disjoint_neighbourhoods_run_in_parallel() {
    let mut graph: Graph<i64, i64> = Graph::new();
    for id in 0..4 {
        graph.add_vertex(VertexId(id), 0);
    }
    graph.add_edge(VertexId(0), VertexId(1), 1);
    graph.add_edge(VertexId(2), VertexId(3), 1);

    let config = EngineConfig {
        load_ahead_distance: 0,
        num_threads: 2,
        enable_gather_cache: false,
    };
    let engine = AsyncEngine::<SleepProbe>::new(&graph, config).unwrap();
    engine.signal(VertexId(0));
    engine.signal(VertexId(2));
    engine.start();

    let (start_a, end_a) = interval_of(0);
    let (start_c, end_c) = interval_of(2);
    assert!(
        start_a < end_c && start_c < end_a,
        "two workers on disjoint neighbourhoods should overlap in time"
    );
}

#[test]
fn a_shared_neighbour_serialises_the_endpoints() {
    let mut graph: Graph<i64, i64> = Graph::new();
    for id in 10..13 {
        graph.add_vertex(VertexId(id), 0);
    }
    graph.add_edge(VertexId(10), VertexId(11), 1);
    graph.add_edge(VertexId(11), VertexId(12), 1);

    let config = EngineConfig {
        load_ahead_distance: 0,
        num_threads: 2,
        enable_gather_cache: false,
    };
    let engine = AsyncEngine::<SleepProbe>::new(&graph, config).unwrap();
    engine.signal(VertexId(10));
    engine.signal(VertexId(12));
    engine.start();

    let (start_a, end_a) = interval_of(10);
    let (start_c, end_c) = interval_of(12);
    assert!(
        end_a <= start_c || end_c <= start_a,
        "programs sharing vertex 11 must not hold their locks concurrently"
    );
}

/// Bumps its vertex datum every run and signals itself exactly once.
#[derive(Default)]
struct SelfSignal;

impl VertexProgram for SelfSignal {
    type VertexData = i64;
    type EdgeData = i64;
    type Gather = i64;
    type Message = ();

    fn gather_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>) -> EdgeDir {
        EdgeDir::None
    }

    fn apply(&mut self, _ctx: &Context<'_, '_, Self>, vertex: &Handle<'_>, _total: &i64) {
        vertex.set_data(vertex.data() + 1);
    }

    fn scatter_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>) -> EdgeDir {
        EdgeDir::Out
    }

    fn scatter(
        &self,
        ctx: &Context<'_, '_, Self>,
        vertex: &Handle<'_>,
        _edge: &grafito::graph::EdgeHandle<'_, i64, i64>,
    ) {
        if vertex.data() == 1 {
            ctx.signal(vertex);
        }
    }
}

#[test]
fn signalling_a_running_vertex_schedules_exactly_one_replay() {
    let mut graph: Graph<i64, i64> = Graph::new();
    graph.add_vertex(VertexId(0), 0);
    graph.add_vertex(VertexId(1), 0);
    graph.add_edge(VertexId(0), VertexId(1), 1);

    let config = EngineConfig {
        load_ahead_distance: 1,
        num_threads: 1,
        enable_gather_cache: false,
    };
    let engine = AsyncEngine::<SelfSignal>::new(&graph, config).unwrap();
    engine.signal(VertexId(0));
    engine.start();

    assert_eq!(graph.vertex(VertexId(0)).data(), 2);
    assert_eq!(graph.vertex(VertexId(1)).data(), 0);
    assert_eq!(engine.metrics().vertex_runs, 2);
}

/// Counts executions through the vertex datum; never scatters.
#[derive(Default)]
struct CountRuns;

impl VertexProgram for CountRuns {
    type VertexData = i64;
    type EdgeData = i64;
    type Gather = i64;
    type Message = ();

    fn gather_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>) -> EdgeDir {
        EdgeDir::None
    }

    fn apply(&mut self, _ctx: &Context<'_, '_, Self>, vertex: &Handle<'_>, _total: &i64) {
        vertex.set_data(vertex.data() + 1);
    }

    fn scatter_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>) -> EdgeDir {
        EdgeDir::None
    }
}

#[test]
fn signalling_an_active_vertex_is_a_no_op() {
    let mut graph: Graph<i64, i64> = Graph::new();
    graph.add_vertex(VertexId(0), 0);

    let config = EngineConfig {
        num_threads: 1,
        ..EngineConfig::default()
    };
    let engine = AsyncEngine::<CountRuns>::new(&graph, config).unwrap();
    engine.signal(VertexId(0));
    engine.signal(VertexId(0));
    engine.start();

    assert_eq!(graph.vertex(VertexId(0)).data(), 1);
    assert_eq!(engine.metrics().vertex_runs, 1);
}

#[test]
fn a_larger_pool_than_graph_still_terminates() {
    let mut graph: Graph<i64, i64> = Graph::new();
    graph.add_vertex(VertexId(0), 0);
    graph.add_vertex(VertexId(1), 0);
    graph.add_edge(VertexId(0), VertexId(1), 1);

    let config = EngineConfig {
        num_threads: 8,
        ..EngineConfig::default()
    };
    let engine = AsyncEngine::<CountRuns>::new(&graph, config).unwrap();
    engine.signal_all();
    engine.start();

    assert_eq!(graph.vertex(VertexId(0)).data(), 1);
    assert_eq!(graph.vertex(VertexId(1)).data(), 1);
}
