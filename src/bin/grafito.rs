use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use grafito::programs::{PageRank, ShortestPaths};
use grafito::{io as graph_io, AsyncEngine, EngineConfig, EngineError, Result, VertexId};

#[derive(Parser, Debug)]
#[command(name = "grafito", about = "Asynchronous gather-apply-scatter engine")]
struct Cli {
    /// Log filter, e.g. `info` or `grafito=debug`.
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Worker threads in the pool.
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Edge/vertex pairs staged ahead of the gather and scatter loops.
    #[arg(long = "load-ahead", default_value_t = 50)]
    load_ahead: usize,

    /// Print engine counters as JSON to stderr after the run.
    #[arg(long)]
    metrics: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs PageRank over an unweighted adjacency file.
    Pagerank {
        /// Input file: `<vid> <neigh>...` per line.
        input: PathBuf,

        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Enable the gather cache.
        #[arg(long)]
        cache: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Runs single-source shortest paths over a weighted adjacency file.
    Sssp {
        /// Input file: `<vid> (<neigh> <weight>)...` per line.
        input: PathBuf,

        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Source vertex id.
        #[arg(long, default_value_t = 0)]
        source: u32,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Generates a random input file in either dialect.
    Generate {
        /// Output file.
        output: PathBuf,

        #[arg(long, default_value_t = 100)]
        vertices: u32,

        /// Out-edges sampled per vertex.
        #[arg(long = "out-degree", default_value_t = 4)]
        out_degree: usize,

        /// Emit `(neighbour, weight)` pairs instead of bare neighbours.
        #[arg(long)]
        weighted: bool,

        /// Largest edge weight, inclusive.
        #[arg(long = "max-weight", default_value_t = 10)]
        max_weight: i64,

        /// RNG seed for reproducible graphs.
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn engine_config(args: &EngineArgs, cache: bool) -> EngineConfig {
    EngineConfig {
        load_ahead_distance: args.load_ahead,
        num_threads: args.threads,
        enable_gather_cache: cache,
    }
}

fn open_output(path: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    })
}

fn dump_metrics<P: grafito::VertexProgram>(engine: &AsyncEngine<'_, P>) -> Result<()> {
    let snapshot = engine.metrics();
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| EngineError::Parse(format!("metrics serialisation failed: {e}")))?;
    eprintln!("{json}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    grafito::logging::init_logging(&cli.log)?;

    match cli.command {
        Command::Pagerank {
            input,
            output,
            cache,
            engine: args,
        } => {
            let graph = graph_io::import_unweighted(&input, 1.0)?;
            let engine = AsyncEngine::<PageRank>::new(&graph, engine_config(&args, cache))?;
            engine.signal_all();
            engine.start();
            graph_io::export_vertex_data(&graph, open_output(output.as_ref())?)?;
            if args.metrics {
                dump_metrics(&engine)?;
            }
        }
        Command::Sssp {
            input,
            output,
            source,
            engine: args,
        } => {
            let graph = graph_io::import_weighted(&input, VertexId(source))?;
            let engine = AsyncEngine::<ShortestPaths>::new(&graph, engine_config(&args, false))?;
            engine.signal_all();
            engine.start();
            graph_io::export_vertex_data(&graph, open_output(output.as_ref())?)?;
            if args.metrics {
                dump_metrics(&engine)?;
            }
        }
        Command::Generate {
            output,
            vertices,
            out_degree,
            weighted,
            max_weight,
            seed,
        } => {
            let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut out = BufWriter::new(File::create(&output)?);
            for vid in 0..vertices {
                write!(out, "{vid}")?;
                for _ in 0..out_degree {
                    let neigh = rng.gen_range(0..vertices);
                    if neigh == vid {
                        continue;
                    }
                    if weighted {
                        write!(out, " {neigh} {}", rng.gen_range(1..=max_weight))?;
                    } else {
                        write!(out, " {neigh}")?;
                    }
                }
                writeln!(out)?;
            }
            out.flush()?;
            eprintln!("generated {vertices} vertices with seed {seed}");
        }
    }
    Ok(())
}
