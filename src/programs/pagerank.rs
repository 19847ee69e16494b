use crate::graph::{EdgeHandle, VertexHandle};
use crate::program::{Context, VertexProgram};
use crate::types::EdgeDir;

/// Damping factor of the rank update `0.15 + 0.85 * gathered`.
pub const DAMPING: f64 = 0.85;

/// Rank changes at or below this magnitude stop propagating signals.
pub const SIGNAL_TOLERANCE: f64 = 1e-3;

/// PageRank over unweighted edges. Gathers the rank mass flowing in over
/// in-edges, applies the damped update, and scatters the rank change to
/// out-neighbours as a gather-cache delta, signalling them while the
/// change is still significant. Run it with the gather cache enabled.
#[derive(Default)]
pub struct PageRank {
    delta: f64,
}

impl VertexProgram for PageRank {
    type VertexData = f64;
    type EdgeData = ();
    type Gather = f64;
    type Message = ();

    fn gather_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, f64, ()>,
    ) -> EdgeDir {
        EdgeDir::In
    }

    fn gather(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, f64, ()>,
        edge: &EdgeHandle<'_, f64, ()>,
    ) -> f64 {
        let source = edge.source();
        source.data() / source.num_out_edges() as f64
    }

    fn apply(
        &mut self,
        _ctx: &Context<'_, '_, Self>,
        vertex: &VertexHandle<'_, f64, ()>,
        total: &f64,
    ) {
        let fresh = total * DAMPING + (1.0 - DAMPING);
        self.delta = fresh - vertex.data();
        vertex.set_data(fresh);
    }

    fn scatter_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, f64, ()>,
    ) -> EdgeDir {
        EdgeDir::Out
    }

    fn scatter(
        &self,
        ctx: &Context<'_, '_, Self>,
        vertex: &VertexHandle<'_, f64, ()>,
        edge: &EdgeHandle<'_, f64, ()>,
    ) {
        let target = edge.target();
        ctx.post_delta(&target, self.delta / vertex.num_out_edges() as f64);
        if self.delta.abs() > SIGNAL_TOLERANCE {
            ctx.signal(&target);
        }
    }
}
