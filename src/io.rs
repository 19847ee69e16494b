//! Line-oriented graph import and tab-separated export.
//!
//! Two input dialects are supported: `<vid> <neigh>...` for unweighted
//! graphs and `<vid> (<neigh> <weight>)...` for weighted ones. Neighbours
//! that have not been declared on their own line yet are inserted with
//! sentinel data before the edge, so edge insertion never fails on a
//! missing endpoint.

use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{EngineError, Result};
use crate::graph::Graph;
use crate::types::VertexId;

fn parse_field<T: std::str::FromStr>(field: &str, line_no: usize, what: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| EngineError::Parse(format!("line {}: bad {what} `{field}`", line_no + 1)))
}

/// Reads an unweighted adjacency file, giving every vertex `initial` as
/// its starting datum.
pub fn import_unweighted(path: &Path, initial: f64) -> Result<Graph<f64, ()>> {
    let reader = BufReader::new(File::open(path)?);
    let mut graph = Graph::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        let vid = VertexId(parse_field(first, line_no, "vertex id")?);
        graph.add_vertex(vid, initial);
        for field in fields {
            let neigh = VertexId(parse_field(field, line_no, "neighbour id")?);
            if !graph.has_vertex(neigh) {
                graph.add_vertex(neigh, initial);
            }
            graph.add_edge(vid, neigh, ());
        }
    }
    Ok(graph)
}

/// Reads a weighted adjacency file of `(neighbour, weight)` pairs. The
/// `source` vertex starts at distance 0, every other vertex at -1.
pub fn import_weighted(path: &Path, source: VertexId) -> Result<Graph<i64, i64>> {
    let initial = |id: VertexId| if id == source { 0 } else { -1 };
    let reader = BufReader::new(File::open(path)?);
    let mut graph = Graph::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        let vid = VertexId(parse_field(first, line_no, "vertex id")?);
        graph.add_vertex(vid, initial(vid));
        while let Some(field) = fields.next() {
            let neigh = VertexId(parse_field(field, line_no, "neighbour id")?);
            let weight_field = fields.next().ok_or_else(|| {
                EngineError::Parse(format!(
                    "line {}: neighbour {neigh} is missing a weight",
                    line_no + 1
                ))
            })?;
            let weight: i64 = parse_field(weight_field, line_no, "edge weight")?;
            if !graph.has_vertex(neigh) {
                graph.add_vertex(neigh, initial(neigh));
            }
            graph.add_edge(vid, neigh, weight);
        }
    }
    if !graph.has_vertex(source) {
        return Err(EngineError::Parse(format!(
            "source vertex {source} does not appear in the input"
        )));
    }
    Ok(graph)
}

/// Writes one `<id>\t<data>` line per vertex slot, placeholders included.
pub fn export_vertex_data<VD, ED, W>(graph: &Graph<VD, ED>, mut out: W) -> Result<()>
where
    VD: Copy + Display,
    W: Write,
{
    for vertex in graph.vertices() {
        writeln!(out, "{}\t{}", vertex.id(), vertex.data())?;
    }
    Ok(())
}
