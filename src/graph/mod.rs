//! Adjacency-list graph container keyed by dense integer vertex ids.
//!
//! Vertex and edge data live in per-datum lock cells; the engine only
//! touches them while the owning vertex holds its neighbourhood lock, so
//! the cells are uncontended and exist to make the sharing sound.

use parking_lot::RwLock;

use crate::types::{EdgeId, VertexId};

struct VertexSlot<VD> {
    occupied: bool,
    data: RwLock<VD>,
    in_edges: Vec<EdgeId>,
    out_edges: Vec<EdgeId>,
}

impl<VD: Default> VertexSlot<VD> {
    fn placeholder() -> Self {
        Self {
            occupied: false,
            data: RwLock::new(VD::default()),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        }
    }
}

struct EdgeRecord<ED> {
    source: VertexId,
    target: VertexId,
    has_opposite: bool,
    data: RwLock<ED>,
}

/// Directed graph with user data of type `VD` on vertices and `ED` on edges.
pub struct Graph<VD, ED> {
    vertices: Vec<VertexSlot<VD>>,
    edges: Vec<EdgeRecord<ED>>,
}

impl<VD: Default, ED> Graph<VD, ED> {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Inserts a vertex under `id`. Ids between the current tail and `id`
    /// are filled with unoccupied placeholder slots. Returns false if the
    /// id is already occupied.
    pub fn add_vertex(&mut self, id: VertexId, data: VD) -> bool {
        let idx = id.index();
        if idx >= self.vertices.len() {
            self.vertices.resize_with(idx + 1, VertexSlot::placeholder);
        }
        if self.vertices[idx].occupied {
            return false;
        }
        let slot = &mut self.vertices[idx];
        slot.occupied = true;
        *slot.data.get_mut() = data;
        true
    }

    /// Inserts a directed edge. Self-edges and unoccupied endpoints are
    /// rejected. When the reverse edge already exists, `has_opposite` is
    /// raised on both directions.
    pub fn add_edge(&mut self, source: VertexId, target: VertexId, data: ED) -> bool {
        if source == target || !self.has_vertex(source) || !self.has_vertex(target) {
            return false;
        }
        let id = EdgeId(self.edges.len() as u32);
        let reverse: Vec<EdgeId> = self.vertices[target.index()]
            .out_edges
            .iter()
            .copied()
            .filter(|e| self.edges[e.index()].target == source)
            .collect();
        for r in &reverse {
            self.edges[r.index()].has_opposite = true;
        }
        self.edges.push(EdgeRecord {
            source,
            target,
            has_opposite: !reverse.is_empty(),
            data: RwLock::new(data),
        });
        self.vertices[source.index()].out_edges.push(id);
        self.vertices[target.index()].in_edges.push(id);
        true
    }
}

impl<VD, ED> Graph<VD, ED> {
    /// True if `id` names an occupied (non-placeholder) vertex.
    pub fn has_vertex(&self, id: VertexId) -> bool {
        self.vertices
            .get(id.index())
            .map_or(false, |slot| slot.occupied)
    }

    /// Number of vertex slots, placeholders included.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Handle to the vertex at `id`; panics if the id is out of range.
    pub fn vertex(&self, id: VertexId) -> VertexHandle<'_, VD, ED> {
        assert!(
            id.index() < self.vertices.len(),
            "vertex id {id} out of range"
        );
        VertexHandle { graph: self, id }
    }

    pub fn try_vertex(&self, id: VertexId) -> Option<VertexHandle<'_, VD, ED>> {
        (id.index() < self.vertices.len()).then_some(VertexHandle { graph: self, id })
    }

    pub fn edge(&self, id: EdgeId) -> EdgeHandle<'_, VD, ED> {
        assert!(id.index() < self.edges.len(), "edge id {id} out of range");
        EdgeHandle { graph: self, id }
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexHandle<'_, VD, ED>> {
        (0..self.vertices.len()).map(move |i| VertexHandle {
            graph: self,
            id: VertexId(i as u32),
        })
    }
}

impl<VD: Default, ED> Default for Graph<VD, ED> {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowing view of one vertex.
pub struct VertexHandle<'g, VD, ED> {
    graph: &'g Graph<VD, ED>,
    id: VertexId,
}

impl<VD, ED> Clone for VertexHandle<'_, VD, ED> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<VD, ED> Copy for VertexHandle<'_, VD, ED> {}

impl<'g, VD, ED> VertexHandle<'g, VD, ED> {
    pub fn id(&self) -> VertexId {
        self.id
    }

    fn slot(&self) -> &'g VertexSlot<VD> {
        &self.graph.vertices[self.id.index()]
    }

    pub fn num_in_edges(&self) -> usize {
        self.slot().in_edges.len()
    }

    pub fn num_out_edges(&self) -> usize {
        self.slot().out_edges.len()
    }

    /// The `i`-th inbound edge in insertion order.
    pub fn in_edge(&self, i: usize) -> EdgeHandle<'g, VD, ED> {
        EdgeHandle {
            graph: self.graph,
            id: self.slot().in_edges[i],
        }
    }

    /// The `i`-th outbound edge in insertion order.
    pub fn out_edge(&self, i: usize) -> EdgeHandle<'g, VD, ED> {
        EdgeHandle {
            graph: self.graph,
            id: self.slot().out_edges[i],
        }
    }

    pub fn in_edges(&self) -> impl Iterator<Item = EdgeHandle<'g, VD, ED>> + 'g {
        let graph = self.graph;
        self.slot()
            .in_edges
            .iter()
            .map(move |&id| EdgeHandle { graph, id })
    }

    pub fn out_edges(&self) -> impl Iterator<Item = EdgeHandle<'g, VD, ED>> + 'g {
        let graph = self.graph;
        self.slot()
            .out_edges
            .iter()
            .map(move |&id| EdgeHandle { graph, id })
    }
}

impl<VD: Copy, ED> VertexHandle<'_, VD, ED> {
    pub fn data(&self) -> VD {
        *self.slot().data.read()
    }

    pub fn set_data(&self, value: VD) {
        *self.slot().data.write() = value;
    }
}

/// Borrowing view of one edge.
pub struct EdgeHandle<'g, VD, ED> {
    graph: &'g Graph<VD, ED>,
    id: EdgeId,
}

impl<VD, ED> Clone for EdgeHandle<'_, VD, ED> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<VD, ED> Copy for EdgeHandle<'_, VD, ED> {}

impl<'g, VD, ED> EdgeHandle<'g, VD, ED> {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    fn record(&self) -> &'g EdgeRecord<ED> {
        &self.graph.edges[self.id.index()]
    }

    pub fn source(&self) -> VertexHandle<'g, VD, ED> {
        VertexHandle {
            graph: self.graph,
            id: self.record().source,
        }
    }

    pub fn target(&self) -> VertexHandle<'g, VD, ED> {
        VertexHandle {
            graph: self.graph,
            id: self.record().target,
        }
    }

    /// True if the graph also contains the reverse edge.
    pub fn has_opposite(&self) -> bool {
        self.record().has_opposite
    }
}

impl<VD, ED: Copy> EdgeHandle<'_, VD, ED> {
    pub fn data(&self) -> ED {
        *self.record().data.read()
    }

    pub fn set_data(&self, value: ED) {
        *self.record().data.write() = value;
    }
}
