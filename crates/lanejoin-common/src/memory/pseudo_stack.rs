//! Pseudo-stack arena for partial row combinations.
//!
//! Every group owns one pseudo-stack. Depth `d` of a pseudo-stack holds up
//! to `nrooms` entries, each entry being `d + 1` locators (one per depth
//! from 0 to `d`). Depths are laid out back to back, so depth `d` starts at
//! word `nrooms * d * (d + 1) / 2`:
//!
//! ```text
//! +------------------+----------------------+--------------------------+
//! | depth 0 (1 word) | depth 1 (2 words)    | depth 2 (3 words)   ...  |
//! +------------------+----------------------+--------------------------+
//!   x nrooms           x nrooms               x nrooms
//! ```
//!
//! # Performance
//!
//! - Load/store: O(depth) relaxed atomic word accesses
//! - Memory: `groups * nrooms * (N + 1) * (N + 2) / 2 * 4` bytes

use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::RowLocator;

/// Backing storage for the pseudo-stacks of every group of a run.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::memory::PseudoStackArena;
/// use lanejoin_common::types::RowLocator;
///
/// let arena = PseudoStackArena::new(2, 2, 8);
/// let stack = arena.group(1);
/// stack.store(0, 3, &[RowLocator::from_index(7)]);
/// stack.extend(1, 3, 0, RowLocator::from_index(2));
///
/// let mut chain = [RowLocator::NULL; 2];
/// stack.load(1, 0, &mut chain);
/// assert_eq!(chain, [RowLocator::from_index(7), RowLocator::from_index(2)]);
/// ```
pub struct PseudoStackArena {
    /// Locator words of all groups.
    words: Box<[AtomicU32]>,
    /// Number of groups sharing the arena.
    groups: usize,
    /// Number of inner relations (deepest depth index).
    num_rels: usize,
    /// Entries per depth.
    nrooms: usize,
    /// Words per group.
    group_stride: usize,
}

impl PseudoStackArena {
    /// Creates an arena for `groups` groups joining `num_rels` inner relations.
    #[must_use]
    pub fn new(groups: usize, num_rels: usize, nrooms: usize) -> Self {
        let group_stride = Self::words_per_group(num_rels, nrooms);
        let words = (0..groups * group_stride)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            words,
            groups,
            num_rels,
            nrooms,
            group_stride,
        }
    }

    /// Returns the bytes an arena of this shape occupies.
    #[must_use]
    pub fn required_bytes(groups: usize, num_rels: usize, nrooms: usize) -> usize {
        groups
            .saturating_mul(Self::words_per_group(num_rels, nrooms))
            .saturating_mul(std::mem::size_of::<u32>())
    }

    fn words_per_group(num_rels: usize, nrooms: usize) -> usize {
        // sum of (d + 1) for d in 0..=num_rels
        nrooms.saturating_mul((num_rels + 1) * (num_rels + 2) / 2)
    }

    /// Returns the pseudo-stack of group `group`.
    ///
    /// # Panics
    ///
    /// Panics if `group` is out of range.
    #[must_use]
    pub fn group(&self, group: usize) -> PseudoStack<'_> {
        assert!(
            group < self.groups,
            "group {group} out of range ({} groups)",
            self.groups
        );
        PseudoStack {
            arena: self,
            base: group * self.group_stride,
        }
    }

    /// Returns the number of groups.
    #[inline]
    #[must_use]
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Returns the entries per depth.
    #[inline]
    #[must_use]
    pub fn nrooms(&self) -> usize {
        self.nrooms
    }

    /// Returns the total bytes held by the arena.
    #[inline]
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u32>()
    }
}

impl std::fmt::Debug for PseudoStackArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoStackArena")
            .field("groups", &self.groups)
            .field("num_rels", &self.num_rels)
            .field("nrooms", &self.nrooms)
            .field("total_bytes", &self.total_bytes())
            .finish()
    }
}

/// One group's view of the arena.
#[derive(Clone, Copy)]
pub struct PseudoStack<'a> {
    arena: &'a PseudoStackArena,
    base: usize,
}

impl<'a> PseudoStack<'a> {
    /// Returns the word offset of entry `slot` of `depth`.
    fn offset(&self, depth: usize, slot: usize) -> usize {
        let nrooms = self.arena.nrooms;
        assert!(
            depth <= self.arena.num_rels,
            "depth {depth} exceeds pseudo-stack depth {}",
            self.arena.num_rels
        );
        assert!(slot < nrooms, "slot {slot} exceeds pseudo-stack capacity {nrooms}");
        self.base + nrooms * depth * (depth + 1) / 2 + slot * (depth + 1)
    }

    /// Returns the entries per depth.
    #[inline]
    #[must_use]
    pub fn nrooms(&self) -> usize {
        self.arena.nrooms
    }

    /// Reads entry `slot` of `depth` into `out` (`depth + 1` locators).
    pub fn load(&self, depth: usize, slot: usize, out: &mut [RowLocator]) {
        assert_eq!(out.len(), depth + 1, "locator chain length mismatch");
        let start = self.offset(depth, slot);
        for (i, loc) in out.iter_mut().enumerate() {
            *loc = RowLocator::from_raw(self.arena.words[start + i].load(Ordering::Relaxed));
        }
    }

    /// Writes entry `slot` of `depth` from `chain` (`depth + 1` locators).
    pub fn store(&self, depth: usize, slot: usize, chain: &[RowLocator]) {
        assert_eq!(chain.len(), depth + 1, "locator chain length mismatch");
        let start = self.offset(depth, slot);
        for (i, loc) in chain.iter().enumerate() {
            self.arena.words[start + i].store(loc.as_u32(), Ordering::Relaxed);
        }
    }

    /// Copies entry `src_slot` of `depth - 1` into entry `dst_slot` of
    /// `depth`, appending `locator` as the depth's own row.
    pub fn extend(&self, depth: usize, src_slot: usize, dst_slot: usize, locator: RowLocator) {
        assert!(depth > 0, "depth 0 entries have no parent");
        let src = self.offset(depth - 1, src_slot);
        let dst = self.offset(depth, dst_slot);
        for i in 0..depth {
            let word = self.arena.words[src + i].load(Ordering::Relaxed);
            self.arena.words[dst + i].store(word, Ordering::Relaxed);
        }
        self.arena.words[dst + depth].store(locator.as_u32(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for PseudoStack<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PseudoStack")
            .field("base", &self.base)
            .field("nrooms", &self.arena.nrooms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(i: usize) -> RowLocator {
        RowLocator::from_index(i)
    }

    #[test]
    fn test_required_bytes() {
        // depths 0..=2 -> 1 + 2 + 3 = 6 words per entry
        assert_eq!(PseudoStackArena::required_bytes(1, 2, 10), 6 * 10 * 4);
        assert_eq!(PseudoStackArena::required_bytes(3, 0, 8), 3 * 8 * 4);

        let arena = PseudoStackArena::new(3, 2, 10);
        assert_eq!(arena.total_bytes(), PseudoStackArena::required_bytes(3, 2, 10));
    }

    #[test]
    fn test_store_and_load() {
        let arena = PseudoStackArena::new(1, 3, 4);
        let stack = arena.group(0);

        let chain = [loc(1), loc(2), RowLocator::NULL];
        stack.store(2, 3, &chain);

        let mut out = [RowLocator::NULL; 3];
        stack.load(2, 3, &mut out);
        assert_eq!(out, chain);
    }

    #[test]
    fn test_depths_do_not_overlap() {
        let arena = PseudoStackArena::new(1, 2, 2);
        let stack = arena.group(0);

        stack.store(0, 1, &[loc(10)]);
        stack.store(1, 0, &[loc(20), loc(21)]);
        stack.store(1, 1, &[loc(30), loc(31)]);
        stack.store(2, 0, &[loc(40), loc(41), loc(42)]);

        let mut d0 = [RowLocator::NULL; 1];
        stack.load(0, 1, &mut d0);
        assert_eq!(d0, [loc(10)]);

        let mut d1 = [RowLocator::NULL; 2];
        stack.load(1, 0, &mut d1);
        assert_eq!(d1, [loc(20), loc(21)]);
    }

    #[test]
    fn test_groups_are_isolated() {
        let arena = PseudoStackArena::new(2, 1, 4);
        arena.group(0).store(1, 0, &[loc(1), loc(2)]);
        arena.group(1).store(1, 0, &[loc(5), loc(6)]);

        let mut out = [RowLocator::NULL; 2];
        arena.group(0).load(1, 0, &mut out);
        assert_eq!(out, [loc(1), loc(2)]);
    }

    #[test]
    fn test_extend_appends_locator() {
        let arena = PseudoStackArena::new(1, 2, 4);
        let stack = arena.group(0);
        stack.store(1, 2, &[loc(3), loc(4)]);
        stack.extend(2, 2, 0, RowLocator::NULL);

        let mut out = [loc(99); 3];
        stack.load(2, 0, &mut out);
        assert_eq!(out, [loc(3), loc(4), RowLocator::NULL]);
    }

    #[test]
    #[should_panic(expected = "exceeds pseudo-stack capacity")]
    fn test_slot_bounds() {
        let arena = PseudoStackArena::new(1, 1, 4);
        arena.group(0).store(0, 4, &[loc(0)]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_group_bounds() {
        let arena = PseudoStackArena::new(1, 1, 4);
        let _ = arena.group(1);
    }
}
