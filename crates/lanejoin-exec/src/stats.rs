//! Run statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of one executor run, shared by every group.
#[derive(Debug)]
pub struct RunStats {
    /// Scheduler iterations, summed over groups.
    iterations: AtomicU64,
    /// Dives, summed over groups.
    dives: AtomicU64,
    /// Rewinds, summed over groups.
    rewinds: AtomicU64,
    /// Source rows rejected by the prefilter.
    filtered: AtomicU64,
    /// Matched results per depth (depth 0: rows loaded).
    inner_nitems: Box<[AtomicU64]>,
    /// Null-extended results per depth.
    outer_nitems: Box<[AtomicU64]>,
}

impl RunStats {
    /// Creates zeroed counters for depths 0..=N.
    pub fn new(num_rels: usize) -> Self {
        let counters = || {
            (0..=num_rels)
                .map(|_| AtomicU64::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice()
        };
        Self {
            iterations: AtomicU64::new(0),
            dives: AtomicU64::new(0),
            rewinds: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            inner_nitems: counters(),
            outer_nitems: counters(),
        }
    }

    /// Records a scheduler iteration.
    #[inline]
    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dive.
    #[inline]
    pub fn record_dive(&self) {
        self.dives.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a rewind.
    #[inline]
    pub fn record_rewind(&self) {
        self.rewinds.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one source row rejected by the prefilter.
    #[inline]
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `n` matched results at `depth`.
    #[inline]
    pub fn add_inner(&self, depth: usize, n: u32) {
        self.inner_nitems[depth].fetch_add(u64::from(n), Ordering::Relaxed);
    }

    /// Adds `n` null-extended results at `depth`.
    #[inline]
    pub fn add_outer(&self, depth: usize, n: u32) {
        self.outer_nitems[depth].fetch_add(u64::from(n), Ordering::Relaxed);
    }

    /// Returns scheduler iterations.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    /// Returns dives.
    pub fn dives(&self) -> u64 {
        self.dives.load(Ordering::Relaxed)
    }

    /// Returns rewinds.
    pub fn rewinds(&self) -> u64 {
        self.rewinds.load(Ordering::Relaxed)
    }

    /// Returns filtered source rows.
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    /// Returns matched results per depth.
    pub fn inner_nitems(&self) -> Vec<u64> {
        self.inner_nitems
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// Returns null-extended results per depth.
    pub fn outer_nitems(&self) -> Vec<u64> {
        self.outer_nitems
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = RunStats::new(2);
        stats.record_iteration();
        stats.record_iteration();
        stats.record_dive();
        stats.record_rewind();
        stats.record_filtered();
        stats.add_inner(0, 5);
        stats.add_inner(2, 3);
        stats.add_outer(1, 1);

        assert_eq!(stats.iterations(), 2);
        assert_eq!(stats.dives(), 1);
        assert_eq!(stats.rewinds(), 1);
        assert_eq!(stats.filtered(), 1);
        assert_eq!(stats.inner_nitems(), vec![5, 0, 3]);
        assert_eq!(stats.outer_nitems(), vec![0, 1, 0]);
    }
}
