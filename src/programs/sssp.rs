use std::ops::AddAssign;

use crate::graph::{EdgeHandle, VertexHandle};
use crate::program::{Context, VertexProgram};
use crate::types::EdgeDir;

/// Gather accumulator for shortest paths. Distances are non-negative;
/// a negative value means the vertex has not been reached yet.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MinDistance(pub i64);

impl MinDistance {
    pub const UNREACHED: MinDistance = MinDistance(-1);

    pub fn is_reached(self) -> bool {
        self.0 >= 0
    }
}

impl AddAssign for MinDistance {
    fn add_assign(&mut self, rhs: Self) {
        if self.0 < 0 || (rhs.0 > 0 && rhs.0 < self.0) {
            self.0 = rhs.0;
        }
    }
}

/// Single-source shortest paths over non-negative integer edge weights.
/// Vertex data is the tentative distance, `-1` until reached. Seed every
/// vertex; distances relax asynchronously and only improving vertices
/// scatter further signals.
#[derive(Default)]
pub struct ShortestPaths {
    improved: bool,
}

impl VertexProgram for ShortestPaths {
    type VertexData = i64;
    type EdgeData = i64;
    type Gather = MinDistance;
    type Message = ();

    fn gather_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, i64, i64>,
    ) -> EdgeDir {
        EdgeDir::In
    }

    fn gather(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, i64, i64>,
        edge: &EdgeHandle<'_, i64, i64>,
    ) -> MinDistance {
        let source = edge.source();
        if source.data() >= 0 {
            MinDistance(source.data() + edge.data())
        } else {
            MinDistance::UNREACHED
        }
    }

    fn apply(
        &mut self,
        _ctx: &Context<'_, '_, Self>,
        vertex: &VertexHandle<'_, i64, i64>,
        total: &MinDistance,
    ) {
        if total.0 > 0 && (vertex.data() < 0 || vertex.data() > total.0) {
            vertex.set_data(total.0);
            self.improved = true;
        } else {
            self.improved = false;
        }
    }

    fn scatter_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, i64, i64>,
    ) -> EdgeDir {
        if self.improved {
            EdgeDir::Out
        } else {
            EdgeDir::None
        }
    }

    fn scatter(
        &self,
        ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, i64, i64>,
        edge: &EdgeHandle<'_, i64, i64>,
    ) {
        ctx.signal(&edge.target());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_fold_prefers_smaller_reached_distances() {
        let mut acc = MinDistance::UNREACHED;
        acc += MinDistance(5);
        assert_eq!(acc, MinDistance(5));
        acc += MinDistance(3);
        assert_eq!(acc, MinDistance(3));
        acc += MinDistance(9);
        assert_eq!(acc, MinDistance(3));
        acc += MinDistance::UNREACHED;
        assert_eq!(acc, MinDistance(3));
    }

    #[test]
    fn unreached_contributions_keep_unreached_accumulators() {
        let mut acc = MinDistance::UNREACHED;
        acc += MinDistance::UNREACHED;
        assert!(!acc.is_reached());
    }
}
