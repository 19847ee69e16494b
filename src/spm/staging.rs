//! Two-slab staging allocator placing word-sized vertex and edge data in
//! the scratchpad.
//!
//! Layout: four metadata words at the bottom, then the vertex slab growing
//! upward from [`VSLAB_START`] and the edge slab growing downward from the
//! top. A slot is two words: the datum key and the datum itself. An empty
//! slot has key [`SPM_NULL`]; its second word is the next pointer of its
//! slab's free list.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::types::{EdgeId, VertexId};

use super::sim::SpmSim;
use super::{
    ADDR_EEMPTY_HEAD, ADDR_ESLAB_END, ADDR_VEMPTY_HEAD, ADDR_VSLAB_END, SPM_NULL, SPM_SIZE,
    VSLAB_START, WORD_BYTES,
};

/// Bytes per slot: one key word plus one datum word. Vertex and edge data
/// are both word-sized, so the two slabs share the slot geometry.
pub(crate) const SLOT_BYTES: usize = 2 * WORD_BYTES;

fn vertex_key(id: VertexId) -> u64 {
    ((id.0 as u64) + 1) << 1
}

fn edge_key(id: EdgeId) -> u64 {
    (((id.0 as u64) + 1) << 1) | 1
}

/// Staging allocator over a [`SpmSim`].
///
/// The slab mutexes guard insertion and deletion; the relocation mutexes
/// guard reads and writes of existing slots against cross-slab compactions
/// that may move them. Lock order is always `vslab` before `eslab` before
/// either relocation mutex; `load_edata` releases `eslab` and reacquires in
/// that order once its own free list comes up empty.
pub struct SpmStaging {
    sim: SpmSim,
    vslab: Mutex<()>,
    eslab: Mutex<()>,
    vslot_reloc: Mutex<()>,
    eslot_reloc: Mutex<()>,
    failed_loads: AtomicU64,
}

impl SpmStaging {
    pub fn new() -> Self {
        let sim = SpmSim::new(SPM_SIZE);
        sim.write_word(ADDR_VSLAB_END, VSLAB_START as u64);
        sim.write_word(ADDR_VEMPTY_HEAD, SPM_NULL);
        sim.write_word(ADDR_ESLAB_END, (SPM_SIZE - SLOT_BYTES) as u64);
        sim.write_word(ADDR_EEMPTY_HEAD, SPM_NULL);
        Self {
            sim,
            vslab: Mutex::new(()),
            eslab: Mutex::new(()),
            vslot_reloc: Mutex::new(()),
            eslot_reloc: Mutex::new(()),
            failed_loads: AtomicU64::new(0),
        }
    }

    /// Loads rejected because no space could be made. Duplicate-load
    /// rejections are not counted.
    pub fn failed_loads(&self) -> u64 {
        self.failed_loads.load(Ordering::Relaxed)
    }

    /// Waits for outstanding non-blocking transfers.
    pub fn barrier(&self) {
        self.sim.barrier();
    }

    // ---- vertex data ----

    /// Stages the datum of vertex `id`. Returns false if it is already
    /// resident or no space could be made.
    pub fn load_vdata(&self, id: VertexId, word: u64) -> bool {
        let key = vertex_key(id);
        let _vslab = self.vslab.lock();
        if self.find_vslot(key).is_some() {
            return false;
        }
        if let Some(slot) = self.pop_free_slot(ADDR_VEMPTY_HEAD) {
            self.fill_slot(slot, key, word);
            return true;
        }
        {
            let _eslab = self.eslab.lock();
            let vend = self.sim.read_word(ADDR_VSLAB_END) as usize;
            let eend = self.sim.read_word(ADDR_ESLAB_END) as usize;
            if vend <= eend {
                self.sim.write_word(ADDR_VSLAB_END, (vend + SLOT_BYTES) as u64);
                self.fill_slot(vend, key, word);
                return true;
            }
            let _reloc = self.eslot_reloc.lock();
            if self.reclaim_edge_tail_slot() {
                let vend = self.sim.read_word(ADDR_VSLAB_END) as usize;
                self.sim.write_word(ADDR_VSLAB_END, (vend + SLOT_BYTES) as u64);
                self.fill_slot(vend, key, word);
                return true;
            }
        }
        trace!(vertex = id.0, "vertex staging load failed, scratchpad full");
        self.failed_loads.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Writes the staged datum of vertex `id` back and frees its slot.
    /// Returns the datum word for the caller to store to main memory, or
    /// `None` if the vertex was not resident.
    pub fn remove_vdata(&self, id: VertexId) -> Option<u64> {
        let key = vertex_key(id);
        let _vslab = self.vslab.lock();
        let addr = self.find_vslot(key)?;
        let mut out = [0u64; 1];
        self.sim.copy_out(addr + WORD_BYTES, &mut out);
        let vend = self.sim.read_word(ADDR_VSLAB_END) as usize;
        if addr + SLOT_BYTES == vend {
            // removal from the slab end, shrink instead of freeing
            self.sim.write_word(ADDR_VSLAB_END, addr as u64);
            self.sim.write_word(addr, SPM_NULL);
        } else {
            self.push_free_slot(ADDR_VEMPTY_HEAD, addr);
        }
        Some(out[0])
    }

    /// Word-sized fast read; `None` if the vertex is not resident.
    pub fn read_vdata(&self, id: VertexId) -> Option<u64> {
        let _reloc = self.vslot_reloc.lock();
        let addr = self.find_vslot(vertex_key(id))?;
        Some(self.sim.read_word(addr + WORD_BYTES))
    }

    /// Word-sized fast write; false if the vertex is not resident.
    pub fn write_vdata(&self, id: VertexId, word: u64) -> bool {
        let _reloc = self.vslot_reloc.lock();
        match self.find_vslot(vertex_key(id)) {
            Some(addr) => {
                self.sim.write_word(addr + WORD_BYTES, word);
                true
            }
            None => false,
        }
    }

    // ---- edge data ----

    /// Stages the datum of edge `id`. Returns false if it is already
    /// resident or no space could be made.
    pub fn load_edata(&self, id: EdgeId, word: u64) -> bool {
        let key = edge_key(id);
        {
            let _eslab = self.eslab.lock();
            if self.find_eslot(key).is_some() {
                return false;
            }
            if let Some(slot) = self.pop_free_slot(ADDR_EEMPTY_HEAD) {
                self.fill_slot(slot, key, word);
                return true;
            }
        }
        // The edge slab had no free slot. Extending or compacting touches
        // the slab boundary, so reacquire in canonical order and re-test
        // the fast path, which may have been refilled meanwhile.
        let _vslab = self.vslab.lock();
        let _eslab = self.eslab.lock();
        if let Some(slot) = self.pop_free_slot(ADDR_EEMPTY_HEAD) {
            self.fill_slot(slot, key, word);
            return true;
        }
        let vend = self.sim.read_word(ADDR_VSLAB_END) as usize;
        let eend = self.sim.read_word(ADDR_ESLAB_END) as usize;
        if vend <= eend {
            self.fill_slot(eend, key, word);
            self.sim.write_word(ADDR_ESLAB_END, (eend - SLOT_BYTES) as u64);
            return true;
        }
        let _reloc = self.vslot_reloc.lock();
        if self.reclaim_vertex_tail_slot() {
            let eend = self.sim.read_word(ADDR_ESLAB_END) as usize;
            self.fill_slot(eend, key, word);
            self.sim.write_word(ADDR_ESLAB_END, (eend - SLOT_BYTES) as u64);
            return true;
        }
        trace!(edge = id.0, "edge staging load failed, scratchpad full");
        self.failed_loads.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Writes the staged datum of edge `id` back and frees its slot.
    pub fn remove_edata(&self, id: EdgeId) -> Option<u64> {
        let key = edge_key(id);
        let _eslab = self.eslab.lock();
        let addr = self.find_eslot(key)?;
        let mut out = [0u64; 1];
        self.sim.copy_out(addr + WORD_BYTES, &mut out);
        let eend = self.sim.read_word(ADDR_ESLAB_END) as usize;
        if addr == eend + SLOT_BYTES {
            self.sim.write_word(ADDR_ESLAB_END, addr as u64);
            self.sim.write_word(addr, SPM_NULL);
        } else {
            self.push_free_slot(ADDR_EEMPTY_HEAD, addr);
        }
        Some(out[0])
    }

    pub fn read_edata(&self, id: EdgeId) -> Option<u64> {
        let _reloc = self.eslot_reloc.lock();
        let addr = self.find_eslot(edge_key(id))?;
        Some(self.sim.read_word(addr + WORD_BYTES))
    }

    pub fn write_edata(&self, id: EdgeId, word: u64) -> bool {
        let _reloc = self.eslot_reloc.lock();
        match self.find_eslot(edge_key(id)) {
            Some(addr) => {
                self.sim.write_word(addr + WORD_BYTES, word);
                true
            }
            None => false,
        }
    }

    // ---- slot plumbing ----

    fn fill_slot(&self, addr: usize, key: u64, word: u64) {
        self.sim.write_word(addr, key);
        self.sim.copy_in(addr + WORD_BYTES, &[word]);
    }

    fn pop_free_slot(&self, head_meta: usize) -> Option<usize> {
        let head = self.sim.read_word(head_meta);
        if head == SPM_NULL {
            return None;
        }
        let next = self.sim.read_word(head as usize + WORD_BYTES);
        self.sim.write_word(head_meta, next);
        Some(head as usize)
    }

    fn push_free_slot(&self, head_meta: usize, addr: usize) {
        let head = self.sim.read_word(head_meta);
        self.sim.write_word(addr, SPM_NULL);
        self.sim.write_word(addr + WORD_BYTES, head);
        self.sim.write_word(head_meta, addr as u64);
    }

    /// Unlinks the free slot at `target` regardless of its list position.
    fn unlink_free_slot(&self, head_meta: usize, target: usize) {
        let mut prev: Option<usize> = None;
        let mut cur = self.sim.read_word(head_meta);
        while cur != SPM_NULL {
            if cur as usize == target {
                let next = self.sim.read_word(target + WORD_BYTES);
                match prev {
                    None => self.sim.write_word(head_meta, next),
                    Some(p) => self.sim.write_word(p + WORD_BYTES, next),
                }
                return;
            }
            prev = Some(cur as usize);
            cur = self.sim.read_word(cur as usize + WORD_BYTES);
        }
        panic!("empty slot at {target:#x} is missing from its free list");
    }

    /// Reclaims the slot at the edge slab's end so the vertex slab can
    /// grow over it. Caller holds `vslab`, `eslab` and `eslot_reloc`.
    fn reclaim_edge_tail_slot(&self) -> bool {
        if self.sim.read_word(ADDR_EEMPTY_HEAD) == SPM_NULL {
            return false;
        }
        let eend = self.sim.read_word(ADDR_ESLAB_END) as usize;
        let tail = eend + SLOT_BYTES;
        if self.sim.read_word(tail) == SPM_NULL {
            // the slab already ends in an empty slot
            self.unlink_free_slot(ADDR_EEMPTY_HEAD, tail);
        } else {
            let dest = self
                .pop_free_slot(ADDR_EEMPTY_HEAD)
                .expect("free list head checked above");
            let key = self.sim.read_word(tail);
            let datum = self.sim.read_word(tail + WORD_BYTES);
            self.sim.write_word(dest, key);
            self.sim.write_word(dest + WORD_BYTES, datum);
            self.sim.write_word(tail, SPM_NULL);
        }
        self.sim.write_word(ADDR_ESLAB_END, tail as u64);
        true
    }

    /// Mirror image: reclaims the slot at the vertex slab's end for the
    /// edge slab. Caller holds `vslab`, `eslab` and `vslot_reloc`.
    fn reclaim_vertex_tail_slot(&self) -> bool {
        if self.sim.read_word(ADDR_VEMPTY_HEAD) == SPM_NULL {
            return false;
        }
        let vend = self.sim.read_word(ADDR_VSLAB_END) as usize;
        let tail = vend - SLOT_BYTES;
        if self.sim.read_word(tail) == SPM_NULL {
            self.unlink_free_slot(ADDR_VEMPTY_HEAD, tail);
        } else {
            let dest = self
                .pop_free_slot(ADDR_VEMPTY_HEAD)
                .expect("free list head checked above");
            let key = self.sim.read_word(tail);
            let datum = self.sim.read_word(tail + WORD_BYTES);
            self.sim.write_word(dest, key);
            self.sim.write_word(dest + WORD_BYTES, datum);
            self.sim.write_word(tail, SPM_NULL);
        }
        self.sim.write_word(ADDR_VSLAB_END, tail as u64);
        true
    }

    /// Linear scan of the vertex slab for `key`.
    fn find_vslot(&self, key: u64) -> Option<usize> {
        let vend = self.sim.read_word(ADDR_VSLAB_END) as usize;
        let mut addr = VSLAB_START;
        while addr < vend {
            if self.sim.read_word(addr) == key {
                return Some(addr);
            }
            addr += SLOT_BYTES;
        }
        None
    }

    /// Linear scan of the edge slab for `key`, walking downward from the
    /// top of the scratchpad.
    fn find_eslot(&self, key: u64) -> Option<usize> {
        let eend = self.sim.read_word(ADDR_ESLAB_END) as usize;
        let mut addr = SPM_SIZE - SLOT_BYTES;
        while addr > eend {
            if self.sim.read_word(addr) == key {
                return Some(addr);
            }
            addr -= SLOT_BYTES;
        }
        None
    }
}

impl Default for SpmStaging {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 256 bytes minus 32 bytes of metadata leaves room for 14 slots.
    const CAPACITY: usize = (SPM_SIZE - VSLAB_START) / SLOT_BYTES;

    #[test]
    fn vertex_loads_fill_to_capacity_then_fail() {
        let staging = SpmStaging::new();
        for i in 0..CAPACITY {
            assert!(staging.load_vdata(VertexId(i as u32), i as u64 * 10));
        }
        assert!(!staging.load_vdata(VertexId(99), 0));
        assert_eq!(staging.failed_loads(), 1);
        for i in 0..CAPACITY {
            assert_eq!(staging.read_vdata(VertexId(i as u32)), Some(i as u64 * 10));
        }
    }

    #[test]
    fn duplicate_load_fails_without_counting() {
        let staging = SpmStaging::new();
        assert!(staging.load_vdata(VertexId(1), 7));
        assert!(!staging.load_vdata(VertexId(1), 8));
        assert_eq!(staging.failed_loads(), 0);
        assert_eq!(staging.read_vdata(VertexId(1)), Some(7));
    }

    #[test]
    fn remove_returns_datum_and_reports_absence() {
        let staging = SpmStaging::new();
        staging.load_vdata(VertexId(1), 11);
        staging.write_vdata(VertexId(1), 12);
        assert_eq!(staging.remove_vdata(VertexId(1)), Some(12));
        assert_eq!(staging.remove_vdata(VertexId(1)), None);
        assert_eq!(staging.read_vdata(VertexId(1)), None);
    }

    #[test]
    fn interior_removal_feeds_the_free_list() {
        let staging = SpmStaging::new();
        for i in 0..CAPACITY {
            assert!(staging.load_vdata(VertexId(i as u32), i as u64));
        }
        // interior slot goes to the free list, the next load lands in it
        assert_eq!(staging.remove_vdata(VertexId(0)), Some(0));
        assert!(staging.load_vdata(VertexId(50), 500));
        assert_eq!(staging.read_vdata(VertexId(50)), Some(500));
        // and the slab is full again
        assert!(!staging.load_vdata(VertexId(51), 0));
    }

    #[test]
    fn tail_removal_shrinks_the_slab() {
        let staging = SpmStaging::new();
        staging.load_vdata(VertexId(0), 1);
        staging.load_vdata(VertexId(1), 2);
        assert_eq!(staging.remove_vdata(VertexId(1)), Some(2));
        assert!(staging.load_vdata(VertexId(2), 3));
        assert_eq!(staging.read_vdata(VertexId(0)), Some(1));
        assert_eq!(staging.read_vdata(VertexId(2)), Some(3));
    }

    #[test]
    fn edge_slab_mirrors_vertex_behaviour() {
        let staging = SpmStaging::new();
        for i in 0..CAPACITY {
            assert!(staging.load_edata(EdgeId(i as u32), i as u64 * 3));
        }
        assert!(!staging.load_edata(EdgeId(99), 0));
        assert_eq!(staging.failed_loads(), 1);
        assert_eq!(staging.remove_edata(EdgeId(2)), Some(6));
        assert!(staging.load_edata(EdgeId(77), 70));
        assert_eq!(staging.read_edata(EdgeId(77)), Some(70));
    }

    #[test]
    fn vertex_and_edge_keys_do_not_collide() {
        let staging = SpmStaging::new();
        assert!(staging.load_vdata(VertexId(4), 40));
        assert!(staging.load_edata(EdgeId(4), 41));
        assert_eq!(staging.read_vdata(VertexId(4)), Some(40));
        assert_eq!(staging.read_edata(EdgeId(4)), Some(41));
    }

    #[test]
    fn full_scratchpad_with_mixed_slabs() {
        let staging = SpmStaging::new();
        for i in 0..CAPACITY / 2 {
            assert!(staging.load_vdata(VertexId(i as u32), 0));
        }
        for i in 0..CAPACITY - CAPACITY / 2 {
            assert!(staging.load_edata(EdgeId(i as u32), 0));
        }
        assert!(!staging.load_vdata(VertexId(90), 0));
        assert!(!staging.load_edata(EdgeId(90), 0));
        assert_eq!(staging.failed_loads(), 2);
    }

    #[test]
    fn vertex_load_compacts_the_edge_slab() {
        let staging = SpmStaging::new();
        // fill everything: 7 vertex slots, 7 edge slots
        for i in 0..7 {
            assert!(staging.load_vdata(VertexId(i), 0));
        }
        for i in 0..7 {
            assert!(staging.load_edata(EdgeId(i), i as u64 + 100));
        }
        // free an interior edge slot; the vertex load must reclaim it by
        // relocating the edge slab's tail slot
        assert_eq!(staging.remove_edata(EdgeId(0)), Some(100));
        assert!(staging.load_vdata(VertexId(40), 4));
        assert_eq!(staging.read_vdata(VertexId(40)), Some(4));
        // the relocated edge datum must still be readable
        assert_eq!(staging.read_edata(EdgeId(6)), Some(106));
        // and the scratchpad is full again
        assert!(!staging.load_edata(EdgeId(80), 0));
    }

    #[test]
    fn edge_load_compacts_the_vertex_slab() {
        let staging = SpmStaging::new();
        for i in 0..CAPACITY {
            assert!(staging.load_vdata(VertexId(i as u32), i as u64));
        }
        assert_eq!(staging.remove_vdata(VertexId(3)), Some(3));
        assert!(staging.load_edata(EdgeId(0), 55));
        assert_eq!(staging.read_edata(EdgeId(0)), Some(55));
        // the vertex that sat at the slab end was relocated, not lost
        assert_eq!(
            staging.read_vdata(VertexId((CAPACITY - 1) as u32)),
            Some((CAPACITY - 1) as u64)
        );
        assert!(!staging.load_vdata(VertexId(70), 0));
    }

    #[test]
    fn compaction_handles_an_empty_slot_at_the_slab_end() {
        let staging = SpmStaging::new();
        for i in 0..7 {
            assert!(staging.load_vdata(VertexId(i), i as u64));
        }
        for i in 0..7 {
            assert!(staging.load_edata(EdgeId(i), i as u64));
        }
        // free an interior slot, then the tail slot; the tail removal
        // shrinks the slab and leaves the interior hole as its new end
        assert_eq!(staging.remove_edata(EdgeId(5)), Some(5));
        assert_eq!(staging.remove_edata(EdgeId(6)), Some(6));
        // first vertex load grows into the reclaimed tail space, the
        // second must unlink the empty end slot from the free list
        assert!(staging.load_vdata(VertexId(40), 40));
        assert!(staging.load_vdata(VertexId(41), 41));
        assert_eq!(staging.read_vdata(VertexId(41)), Some(41));
        for i in 0..5 {
            assert_eq!(staging.read_edata(EdgeId(i)), Some(i as u64));
        }
        // 9 vertex slots + 5 edge slots exhaust the scratchpad
        assert!(!staging.load_vdata(VertexId(42), 0));
        assert!(!staging.load_edata(EdgeId(9), 0));
        assert_eq!(staging.failed_loads(), 2);
    }
}
