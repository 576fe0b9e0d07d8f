//! Robin-hood open-addressing hash index used to locate measurements by name.
//!
//! The on-disk index is a power-of-two array of u64 element offsets; 0 marks an empty slot.
//! Readers probe from `hash & mask` and stop at an empty slot or once their probe distance
//! exceeds the distance of the element sitting in the slot.

use xxhash_rust::xxh64::xxh64;

/// Hash of `key`. Never 0; the top bit is always clear.
pub fn hash_key(key: &[u8]) -> u64 {
    let h = xxh64(key, 0) & (u64::MAX >> 1);
    if h == 0 {
        1
    } else {
        h
    }
}

/// Probe distance of an element with `hash` stored at slot `pos`.
pub fn dist(hash: u64, pos: u64, capacity: u64) -> u64 {
    let mask = capacity - 1;
    (pos + capacity - (hash & mask)) & mask
}

/// Smallest power of two holding `n` elements at `load_factor` percent fill, plus one slot.
pub fn capacity_for(n: usize, load_factor: u64) -> u64 {
    let needed = (n as u64).saturating_mul(100) / load_factor.max(1) + 1;
    needed.next_power_of_two()
}

/// Builds the slot array for a set of `(key, value)` pairs. Values must be non-zero.
#[derive(Debug)]
pub struct HashIndexBuilder {
    slots: Vec<Option<(u64, u64)>>,
}

impl HashIndexBuilder {
    pub fn new(n: usize, load_factor: u64) -> Self {
        let capacity = capacity_for(n, load_factor) as usize;
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    pub fn insert(&mut self, key: &[u8], value: u64) {
        debug_assert_ne!(value, 0);
        let capacity = self.capacity();
        let mask = capacity - 1;
        let mut entry = (hash_key(key), value);
        let mut pos = entry.0 & mask;
        let mut d = 0u64;
        loop {
            match self.slots[pos as usize] {
                None => {
                    self.slots[pos as usize] = Some(entry);
                    return;
                }
                Some(existing) => {
                    let existing_dist = dist(existing.0, pos, capacity);
                    if existing_dist < d {
                        self.slots[pos as usize] = Some(entry);
                        entry = existing;
                        d = existing_dist;
                    }
                }
            }
            pos = (pos + 1) & mask;
            d += 1;
        }
    }

    /// Slot values in order, 0 for empty slots.
    pub fn finish(self) -> Vec<u64> {
        self.slots
            .into_iter()
            .map(|s| s.map_or(0, |(_, v)| v))
            .collect()
    }
}
