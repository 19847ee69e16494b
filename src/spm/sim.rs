use std::sync::atomic::{AtomicU64, Ordering};

use super::WORD_BYTES;

/// Word-addressable scratchpad memory, simulated as an in-process array.
///
/// Addresses are byte offsets and must be word aligned; a misaligned access
/// is a caller bug and faults immediately. There are no concurrency
/// guarantees beyond single-writer-per-address, which is exactly the
/// contract the staging layer's lock discipline provides.
pub struct SpmSim {
    words: Box<[AtomicU64]>,
}

impl SpmSim {
    pub fn new(size_bytes: usize) -> Self {
        assert!(
            size_bytes % WORD_BYTES == 0,
            "scratchpad size {size_bytes} is not a whole number of words"
        );
        let words = (0..size_bytes / WORD_BYTES)
            .map(|_| AtomicU64::new(0))
            .collect();
        Self { words }
    }

    pub fn size_bytes(&self) -> usize {
        self.words.len() * WORD_BYTES
    }

    fn word_index(&self, addr: usize) -> usize {
        assert!(
            addr % WORD_BYTES == 0,
            "scratchpad access at {addr:#x} is not word aligned"
        );
        let index = addr / WORD_BYTES;
        assert!(
            index < self.words.len(),
            "scratchpad access at {addr:#x} is out of bounds"
        );
        index
    }

    /// Synchronous single-word read.
    pub fn read_word(&self, addr: usize) -> u64 {
        self.words[self.word_index(addr)].load(Ordering::SeqCst)
    }

    /// Synchronous single-word write.
    pub fn write_word(&self, addr: usize, value: u64) {
        self.words[self.word_index(addr)].store(value, Ordering::SeqCst);
    }

    /// Non-blocking bulk load from main memory into the scratchpad.
    pub fn copy_in(&self, addr: usize, words: &[u64]) {
        let base = self.word_index(addr);
        for (offset, &word) in words.iter().enumerate() {
            self.words[base + offset].store(word, Ordering::SeqCst);
        }
    }

    /// Non-blocking bulk store from the scratchpad back to main memory.
    pub fn copy_out(&self, addr: usize, out: &mut [u64]) {
        let base = self.word_index(addr);
        for (offset, word) in out.iter_mut().enumerate() {
            *word = self.words[base + offset].load(Ordering::SeqCst);
        }
    }

    /// Completes once all outstanding non-blocking transfers have retired.
    /// The simulation retires them synchronously, so this is a no-op.
    pub fn barrier(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_round_trip() {
        let sim = SpmSim::new(64);
        sim.write_word(0, 42);
        sim.write_word(56, u64::MAX);
        assert_eq!(sim.read_word(0), 42);
        assert_eq!(sim.read_word(56), u64::MAX);
    }

    #[test]
    fn bulk_transfers_round_trip() {
        let sim = SpmSim::new(64);
        sim.copy_in(16, &[1, 2, 3]);
        let mut out = [0u64; 3];
        sim.copy_out(16, &mut out);
        assert_eq!(out, [1, 2, 3]);
        sim.barrier();
    }

    #[test]
    #[should_panic(expected = "not word aligned")]
    fn misaligned_read_faults() {
        let sim = SpmSim::new(64);
        sim.read_word(4);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_write_faults() {
        let sim = SpmSim::new(64);
        sim.write_word(64, 1);
    }
}
