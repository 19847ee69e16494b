//! Single-source shortest paths on a small weighted road-style network.

use grafito::programs::ShortestPaths;
use grafito::{AsyncEngine, EngineConfig, Graph, Result, VertexId};

fn main() -> Result<()> {
    grafito::logging::init_logging("info")?;

    let mut graph: Graph<i64, i64> = Graph::new();
    for id in 0..6 {
        let initial = if id == 0 { 0 } else { -1 };
        graph.add_vertex(VertexId(id), initial);
    }
    for (src, dst, weight) in [
        (0, 1, 4),
        (0, 2, 1),
        (2, 1, 2),
        (1, 3, 1),
        (2, 3, 5),
        (3, 4, 3),
        (4, 5, 1),
        (0, 5, 20),
    ] {
        graph.add_edge(VertexId(src), VertexId(dst), weight);
    }

    let config = EngineConfig {
        num_threads: 2,
        ..EngineConfig::default()
    };
    let engine = AsyncEngine::<ShortestPaths>::new(&graph, config)?;
    engine.signal_all();
    engine.start();

    println!("vertex\tdistance");
    for vertex in graph.vertices() {
        println!("{}\t{}", vertex.id(), vertex.data());
    }
    Ok(())
}
