//! The vertex-program abstraction and the context through which programs
//! talk back to the engine.

use std::ops::AddAssign;

use tracing::warn;

use crate::engine::AsyncEngine;
use crate::graph::{EdgeHandle, VertexHandle};
use crate::types::{EdgeDir, SpmWord};

/// A gather-apply-scatter vertex program.
///
/// One instance is default-constructed per vertex execution; anything the
/// program needs to carry from `apply` into `scatter_edges`/`scatter`
/// lives in its own fields. `gather` and `scatter` run while the owning
/// vertex holds its neighbourhood lock, so reading and writing the data of
/// the vertex, the edge and the opposite endpoint is safe.
pub trait VertexProgram: Default {
    type VertexData: SpmWord + Send + Sync;
    type EdgeData: SpmWord + Send + Sync;
    /// Accumulator folded over the gathered edges with `+=`. Its default
    /// value is only used when no edge contributes.
    type Gather: Clone + Default + AddAssign + Send;
    /// Reserved for signal payloads; message delivery is not implemented.
    type Message: Clone + Default + Send;

    /// Which edges the gather phase visits.
    fn gather_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, Self::VertexData, Self::EdgeData>,
    ) -> EdgeDir {
        EdgeDir::In
    }

    fn gather(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, Self::VertexData, Self::EdgeData>,
        _edge: &EdgeHandle<'_, Self::VertexData, Self::EdgeData>,
    ) -> Self::Gather {
        warn!("gather invoked on a program that does not implement it");
        Default::default()
    }

    /// Updates the vertex from the folded gather result. Runs exactly once
    /// per execution; receives the accumulator default when no edge
    /// contributed.
    fn apply(
        &mut self,
        ctx: &Context<'_, '_, Self>,
        vertex: &VertexHandle<'_, Self::VertexData, Self::EdgeData>,
        total: &Self::Gather,
    );

    /// Which edges the scatter phase visits.
    fn scatter_edges(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, Self::VertexData, Self::EdgeData>,
    ) -> EdgeDir {
        EdgeDir::Out
    }

    fn scatter(
        &self,
        _ctx: &Context<'_, '_, Self>,
        _vertex: &VertexHandle<'_, Self::VertexData, Self::EdgeData>,
        _edge: &EdgeHandle<'_, Self::VertexData, Self::EdgeData>,
    ) {
        warn!("scatter invoked on a program that does not implement it");
    }
}

/// Mediates between a running vertex program and the engine. Safe to use
/// while the program owns its neighbourhood lock.
pub struct Context<'e, 'g, P: VertexProgram> {
    engine: &'e AsyncEngine<'g, P>,
}

impl<'e, 'g, P: VertexProgram> Context<'e, 'g, P> {
    pub(crate) fn new(engine: &'e AsyncEngine<'g, P>) -> Self {
        Self { engine }
    }

    /// Schedules `vertex` for (re-)execution.
    pub fn signal(&self, vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>) {
        self.engine.internal_signal(vertex.id());
    }

    /// Folds `delta` into `vertex`'s cached gather accumulator, if any.
    pub fn post_delta(
        &self,
        vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>,
        delta: P::Gather,
    ) {
        self.engine.internal_post_delta(vertex.id(), delta);
    }

    /// Drops `vertex`'s cached gather accumulator so its next execution
    /// recomputes from scratch.
    pub fn clear_gather_cache(&self, vertex: &VertexHandle<'_, P::VertexData, P::EdgeData>) {
        self.engine.internal_clear_gather_cache(vertex.id());
    }
}
