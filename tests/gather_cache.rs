//! Gather-cache consistency observed through full engine runs.

use grafito::program::{Context, VertexProgram};
use grafito::{AsyncEngine, EngineConfig, EdgeDir, Graph, VertexId};

type Handle<'g> = grafito::graph::VertexHandle<'g, f64, ()>;
type Edge<'g> = grafito::graph::EdgeHandle<'g, f64, ()>;

/// Sums in-neighbour data into the vertex datum; never scatters, so runs
/// are driven purely by explicit signals.
#[derive(Default)]
struct SumInputs;

impl VertexProgram for SumInputs {
    type VertexData = f64;
    type EdgeData = ();
    type Gather = f64;
    type Message = ();

    fn gather(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>, edge: &Edge<'_>) -> f64 {
        edge.source().data()
    }

    fn apply(&mut self, _ctx: &Context<'_, '_, Self>, vertex: &Handle<'_>, total: &f64) {
        if vertex.num_in_edges() > 0 {
            vertex.set_data(*total);
        }
    }

    fn scatter_edges(&self, _ctx: &Context<'_, '_, Self>, _vertex: &Handle<'_>) -> EdgeDir {
        EdgeDir::None
    }
}

fn fan_in_graph() -> Graph<f64, ()> {
    let mut graph: Graph<f64, ()> = Graph::new();
    graph.add_vertex(VertexId(0), 10.0);
    graph.add_vertex(VertexId(1), 20.0);
    graph.add_vertex(VertexId(2), 0.0);
    graph.add_edge(VertexId(0), VertexId(2), ());
    graph.add_edge(VertexId(1), VertexId(2), ());
    graph
}

#[test]
fn a_cached_gather_is_reused_until_cleared() {
    let graph = fan_in_graph();
    let config = EngineConfig {
        load_ahead_distance: 2,
        num_threads: 1,
        enable_gather_cache: true,
    };
    let engine = AsyncEngine::<SumInputs>::new(&graph, config).unwrap();
    engine.signal_all();
    engine.start();
    assert_eq!(graph.vertex(VertexId(2)).data(), 30.0);

    // mutate an input between runs; the cached accumulator must win
    graph.vertex(VertexId(0)).set_data(100.0);
    engine.signal(VertexId(2));
    engine.start();
    assert_eq!(
        graph.vertex(VertexId(2)).data(),
        30.0,
        "a valid cache entry must short-circuit the gather"
    );

    // clearing forces the next execution to recompute from the graph
    engine.clear_gather_cache(VertexId(2));
    engine.signal(VertexId(2));
    engine.start();
    assert_eq!(graph.vertex(VertexId(2)).data(), 120.0);
}

#[test]
fn without_caching_every_run_recomputes() {
    let graph = fan_in_graph();
    let config = EngineConfig {
        load_ahead_distance: 2,
        num_threads: 1,
        enable_gather_cache: false,
    };
    let engine = AsyncEngine::<SumInputs>::new(&graph, config).unwrap();
    engine.signal_all();
    engine.start();
    assert_eq!(graph.vertex(VertexId(2)).data(), 30.0);

    graph.vertex(VertexId(0)).set_data(100.0);
    engine.signal(VertexId(2));
    engine.start();
    assert_eq!(graph.vertex(VertexId(2)).data(), 120.0);
}
