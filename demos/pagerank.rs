//! PageRank over a small citation-style graph, with the gather cache on.

use grafito::programs::PageRank;
use grafito::{AsyncEngine, EngineConfig, Graph, Result, VertexId};

fn main() -> Result<()> {
    grafito::logging::init_logging("info")?;

    let mut graph: Graph<f64, ()> = Graph::new();
    for id in 0..6 {
        graph.add_vertex(VertexId(id), 1.0);
    }
    for (src, dst) in [
        (0, 1),
        (0, 2),
        (1, 2),
        (2, 0),
        (3, 2),
        (3, 4),
        (4, 5),
        (5, 4),
    ] {
        graph.add_edge(VertexId(src), VertexId(dst), ());
    }

    let config = EngineConfig {
        num_threads: 2,
        enable_gather_cache: true,
        ..EngineConfig::default()
    };
    let engine = AsyncEngine::<PageRank>::new(&graph, config)?;
    engine.signal_all();
    engine.start();

    println!("vertex\trank");
    for vertex in graph.vertices() {
        println!("{}\t{:.4}", vertex.id(), vertex.data());
    }
    let metrics = engine.metrics();
    println!(
        "{} vertex runs, spm hit rate {:.2}",
        metrics.vertex_runs,
        metrics.spm_hit_rate()
    );
    Ok(())
}
