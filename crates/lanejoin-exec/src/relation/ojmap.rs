//! Outer-join maps.
//!
//! Every right or full outer relation owns one bitmap per device slot; a
//! bit is set when some lane finds a predicate match for that inner row.
//! After all devices (and the CPU fallback path) are done, the slots are
//! merged and the still-unset rows are the ones owed a right-outer result.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

/// Fixed-size bitmap with lock-free `set`.
pub struct AtomicBitmap {
    words: Box<[AtomicU32]>,
    nbits: usize,
}

impl AtomicBitmap {
    /// Creates a cleared bitmap of `nbits` bits.
    #[must_use]
    pub fn new(nbits: usize) -> Self {
        let words = (0..nbits.div_ceil(32))
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { words, nbits }
    }

    /// Returns the number of bits.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nbits
    }

    /// Returns true for a zero-length bitmap.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nbits == 0
    }

    /// Sets bit `index`; returns true if it was previously unset.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn set(&self, index: usize) -> bool {
        assert!(index < self.nbits, "bit {index} out of range ({})", self.nbits);
        let mask = 1u32 << (index % 32);
        self.words[index / 32].fetch_or(mask, Ordering::Relaxed) & mask == 0
    }

    /// Returns bit `index`.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        index < self.nbits
            && self.words[index / 32].load(Ordering::Relaxed) & (1u32 << (index % 32)) != 0
    }

    /// Returns the number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    /// Returns the unset bits below `limit`.
    #[must_use]
    pub fn unset_bits(&self, limit: usize) -> Vec<usize> {
        (0..limit.min(self.nbits)).filter(|&i| !self.get(i)).collect()
    }

    /// Clears every bit.
    pub fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }

    fn word(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    fn nwords(&self) -> usize {
        self.words.len()
    }
}

impl std::fmt::Debug for AtomicBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicBitmap")
            .field("nbits", &self.nbits)
            .field("ones", &self.count_ones())
            .finish()
    }
}

/// Per-device match bitmaps of the right/full outer relations.
#[derive(Debug)]
pub struct OuterJoinMaps {
    /// Indexed by depth - 1; `None` for relations without right-outer join.
    maps: Vec<Option<Vec<AtomicBitmap>>>,
    num_devices: usize,
}

impl OuterJoinMaps {
    /// Creates maps for relations described by `(nitems, right_outer)`,
    /// in depth order starting at depth 1.
    #[must_use]
    pub fn new<I>(relations: I, num_devices: usize) -> Self
    where
        I: IntoIterator<Item = (usize, bool)>,
    {
        let maps = relations
            .into_iter()
            .map(|(nitems, right_outer)| {
                right_outer.then(|| {
                    (0..=num_devices)
                        .map(|_| AtomicBitmap::new(nitems))
                        .collect()
                })
            })
            .collect();
        Self { maps, num_devices }
    }

    /// Returns the number of devices.
    #[must_use]
    pub fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Returns the number of slots per relation: one per device plus the
    /// CPU fallback slot.
    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.num_devices + 1
    }

    /// Returns true if depth `depth` is tracked.
    #[must_use]
    pub fn is_tracked(&self, depth: usize) -> bool {
        self.slots(depth).is_some()
    }

    fn slots(&self, depth: usize) -> Option<&[AtomicBitmap]> {
        depth
            .checked_sub(1)
            .and_then(|i| self.maps.get(i))
            .and_then(Option::as_deref)
    }

    /// Returns the bitmap of `slot` for depth `depth`.
    #[must_use]
    pub fn slot(&self, depth: usize, slot: usize) -> Option<&AtomicBitmap> {
        self.slots(depth)?.get(slot)
    }

    /// Marks inner row `rowid` of `depth` as matched on `device`.
    ///
    /// No-op for relations without right-outer join.
    pub fn mark(&self, depth: usize, device: usize, rowid: usize) {
        assert!(device < self.num_devices, "device {device} out of range");
        if let Some(slots) = self.slots(depth) {
            slots[device].set(rowid);
        }
    }

    /// Marks inner row `rowid` of `depth` as matched by the CPU fallback path.
    pub fn mark_fallback(&self, depth: usize, rowid: usize) {
        if let Some(slots) = self.slots(depth) {
            slots[self.num_devices].set(rowid);
        }
    }

    /// ORs every slot of every tracked relation into `device`'s slot.
    ///
    /// # Panics
    ///
    /// Panics if `device` is not a device slot.
    pub fn merge(&self, device: usize) {
        assert!(device < self.num_devices, "device {device} out of range");
        for slots in self.maps.iter().flatten() {
            let target = &slots[device];
            (0..target.nwords()).into_par_iter().for_each(|w| {
                let merged = slots.iter().fold(0u32, |acc, map| acc | map.word(w));
                target.words[w].fetch_or(merged, Ordering::Relaxed);
            });
        }
    }

    /// Returns the rows of `depth` still unset in `device`'s slot.
    ///
    /// After [`OuterJoinMaps::merge`] these are the rows owed exactly one
    /// right-outer result. Returns an empty list for untracked relations.
    #[must_use]
    pub fn unmatched_rows(&self, depth: usize, device: usize) -> Vec<usize> {
        self.slot(depth, device)
            .map(|map| map.unset_bits(map.len()))
            .unwrap_or_default()
    }

    /// Clears every slot.
    pub fn reset(&self) {
        for map in self.maps.iter().flatten().flatten() {
            map.clear();
        }
    }
}
