//! Per-vertex memo of the last gather result, patched incrementally by
//! deltas posted during scatter.

use std::ops::AddAssign;

use parking_lot::Mutex;

use crate::types::VertexId;

struct Entry<G> {
    valid: bool,
    value: G,
}

/// One entry per vertex. The neighbourhood-lock contract keeps individual
/// entries contention free; the mutexes only make the sharing sound.
pub(crate) struct GatherCache<G> {
    enabled: bool,
    entries: Box<[Mutex<Entry<G>>]>,
}

impl<G: Clone + Default + AddAssign> GatherCache<G> {
    pub fn new(len: usize, enabled: bool) -> Self {
        let entries = (0..len)
            .map(|_| {
                Mutex::new(Entry {
                    valid: false,
                    value: G::default(),
                })
            })
            .collect();
        Self { enabled, entries }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Cached accumulator for `id`, if one is held.
    pub fn lookup(&self, id: VertexId) -> Option<G> {
        if !self.enabled {
            return None;
        }
        let entry = self.entries[id.index()].lock();
        entry.valid.then(|| entry.value.clone())
    }

    /// Write-through after a full gather.
    pub fn store(&self, id: VertexId, value: G) {
        if !self.enabled {
            return;
        }
        let mut entry = self.entries[id.index()].lock();
        entry.valid = true;
        entry.value = value;
    }

    /// Folds `delta` into the cached accumulator. Without a valid entry the
    /// delta is dropped on purpose; the next full gather recomputes.
    pub fn post_delta(&self, id: VertexId, delta: G) {
        if !self.enabled {
            return;
        }
        let mut entry = self.entries[id.index()].lock();
        if entry.valid {
            entry.value += delta;
        }
    }

    pub fn clear(&self, id: VertexId) {
        if !self.enabled {
            return;
        }
        let mut entry = self.entries[id.index()].lock();
        if entry.valid {
            entry.valid = false;
        }
    }
}
