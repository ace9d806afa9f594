//! Group-local shared state.
//!
//! Every cursor here is written by lane 0 only, between two barrier
//! collectives, and read by every lane after the next collective. Relaxed
//! atomics are enough: the barrier's mutex orders the accesses.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use lanejoin_common::error::{EvalFault, JoinError};

use super::barrier::LaneBarrier;
use crate::relation::ChecksumTable;

/// Shared state of one group of lanes.
#[derive(Debug)]
pub struct GroupState {
    group: usize,
    lanes: u32,
    nrooms: u32,
    barrier: LaneBarrier,
    read_pos: Box<[AtomicU32]>,
    write_pos: Box<[AtomicU32]>,
    source_base: AtomicU64,
    dest_row_base: AtomicU32,
    dest_usage_base: AtomicU32,
    out_of_space: AtomicBool,
    rejected: Mutex<Option<(u32, u32)>>,
    fault: Mutex<Option<JoinError>>,
    checksum: ChecksumTable,
}

impl GroupState {
    /// Creates the state of group `group` with cursors for depths 0..=N.
    #[must_use]
    pub fn new(
        group: usize,
        lanes: usize,
        num_rels: usize,
        nrooms: usize,
        checksum: ChecksumTable,
    ) -> Self {
        let cursors = || {
            (0..=num_rels)
                .map(|_| AtomicU32::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice()
        };
        Self {
            group,
            lanes: u32::try_from(lanes).unwrap_or(u32::MAX),
            nrooms: u32::try_from(nrooms).unwrap_or(u32::MAX),
            barrier: LaneBarrier::new(lanes),
            read_pos: cursors(),
            write_pos: cursors(),
            source_base: AtomicU64::new(0),
            dest_row_base: AtomicU32::new(0),
            dest_usage_base: AtomicU32::new(0),
            out_of_space: AtomicBool::new(false),
            rejected: Mutex::new(None),
            fault: Mutex::new(None),
            checksum,
        }
    }

    /// Returns the group index.
    #[inline]
    #[must_use]
    pub fn group(&self) -> usize {
        self.group
    }

    /// Returns the group barrier.
    #[inline]
    #[must_use]
    pub fn barrier(&self) -> &LaneBarrier {
        &self.barrier
    }

    /// Returns the group-local copy of the checksum table.
    #[inline]
    #[must_use]
    pub fn checksum(&self) -> &ChecksumTable {
        &self.checksum
    }

    /// Returns the read cursor of `depth`.
    #[inline]
    #[must_use]
    pub fn read_pos(&self, depth: usize) -> u32 {
        self.read_pos[depth].load(Ordering::Relaxed)
    }

    /// Returns the write cursor of `depth`.
    #[inline]
    #[must_use]
    pub fn write_pos(&self, depth: usize) -> u32 {
        self.write_pos[depth].load(Ordering::Relaxed)
    }

    /// Returns the entries of `depth` not yet consumed.
    #[inline]
    #[must_use]
    pub fn unread(&self, depth: usize) -> u32 {
        let read = self.read_pos(depth);
        let write = self.write_pos(depth);
        assert!(read <= write, "depth {depth}: read cursor {read} passed write cursor {write}");
        write - read
    }

    /// Returns true if `depth` holds unconsumed entries.
    #[inline]
    #[must_use]
    pub fn has_unread(&self, depth: usize) -> bool {
        self.unread(depth) > 0
    }

    /// Returns true if every depth buffer is drained.
    #[must_use]
    pub fn all_drained(&self) -> bool {
        (0..self.read_pos.len()).all(|depth| !self.has_unread(depth))
    }

    /// Returns true if `depth` can take one more entry per lane.
    #[inline]
    #[must_use]
    pub fn has_room(&self, depth: usize) -> bool {
        u64::from(self.write_pos(depth)) + u64::from(self.lanes) <= u64::from(self.nrooms)
    }

    /// Appends `n` entries to `depth`. Lane 0 only.
    pub fn advance_write(&self, depth: usize, n: u32) {
        let write = self.write_pos(depth) + n;
        assert!(write <= self.nrooms, "depth {depth}: pseudo-stack overflow ({write} entries)");
        self.write_pos[depth].store(write, Ordering::Relaxed);
    }

    /// Consumes up to `n` entries of `depth`, never passing the write
    /// cursor. Returns the number consumed. Lane 0 only.
    pub fn advance_read(&self, depth: usize, n: u32) -> u32 {
        let step = n.min(self.unread(depth));
        self.read_pos[depth].store(self.read_pos(depth) + step, Ordering::Relaxed);
        step
    }

    /// Zeroes both cursors of a drained depth. Lane 0 only.
    pub fn reset_depth(&self, depth: usize) {
        assert!(!self.has_unread(depth), "depth {depth} reset with unread entries");
        self.read_pos[depth].store(0, Ordering::Relaxed);
        self.write_pos[depth].store(0, Ordering::Relaxed);
    }

    /// Publishes the source position claimed by lane 0.
    #[inline]
    pub fn set_source_base(&self, base: u64) {
        self.source_base.store(base, Ordering::Relaxed);
    }

    /// Returns the source position claimed by lane 0.
    #[inline]
    #[must_use]
    pub fn source_base(&self) -> u64 {
        self.source_base.load(Ordering::Relaxed)
    }

    /// Publishes a destination reservation made by lane 0.
    pub fn set_dest_bases(&self, row_base: u32, usage_base: u32) {
        self.dest_row_base.store(row_base, Ordering::Relaxed);
        self.dest_usage_base.store(usage_base, Ordering::Relaxed);
    }

    /// Returns the last destination reservation as `(row, usage)`.
    #[must_use]
    pub fn dest_bases(&self) -> (u32, u32) {
        (
            self.dest_row_base.load(Ordering::Relaxed),
            self.dest_usage_base.load(Ordering::Relaxed),
        )
    }

    /// Records a rejected reservation of `rows` rows and `bytes` bytes.
    pub fn mark_out_of_space(&self, rows: u32, bytes: u32) {
        *self.rejected.lock() = Some((rows, bytes));
        self.out_of_space.store(true, Ordering::Relaxed);
    }

    /// Returns true once a reservation was rejected.
    #[must_use]
    pub fn is_out_of_space(&self) -> bool {
        self.out_of_space.load(Ordering::Relaxed)
    }

    /// Returns the rejected reservation, if any.
    #[must_use]
    pub fn rejected(&self) -> Option<(u32, u32)> {
        *self.rejected.lock()
    }

    /// Records `fault` unless an earlier one is already held.
    pub fn record_fault(&self, depth: usize, fault: EvalFault) {
        let mut slot = self.fault.lock();
        if slot.is_none() {
            *slot = Some(JoinError::evaluation(depth, fault));
        }
    }

    /// Takes the first recorded fault.
    pub fn take_fault(&self) -> Option<JoinError> {
        self.fault.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanejoin_common::error::FaultCode;

    fn state() -> GroupState {
        GroupState::new(0, 4, 2, 10, ChecksumTable::crc32())
    }

    #[test]
    fn test_cursor_cycle() {
        let s = state();
        assert!(s.all_drained());
        assert!(s.has_room(1));

        s.advance_write(1, 4);
        s.advance_write(1, 3);
        assert_eq!(s.unread(1), 7);
        assert!(!s.has_room(1));

        assert_eq!(s.advance_read(1, 4), 4);
        assert_eq!(s.advance_read(1, 4), 3);
        assert_eq!(s.advance_read(1, 4), 0);
        assert_eq!(s.read_pos(1), s.write_pos(1));

        s.reset_depth(1);
        assert_eq!((s.read_pos(1), s.write_pos(1)), (0, 0));
        assert!(s.all_drained());
    }

    #[test]
    #[should_panic(expected = "pseudo-stack overflow")]
    fn test_write_overflow() {
        let s = state();
        s.advance_write(0, 11);
    }

    #[test]
    #[should_panic(expected = "reset with unread entries")]
    fn test_reset_requires_drained() {
        let s = state();
        s.advance_write(2, 1);
        s.reset_depth(2);
    }

    #[test]
    fn test_first_fault_wins() {
        let s = state();
        s.record_fault(1, EvalFault::new(FaultCode::DivisionByZero, "first"));
        s.record_fault(2, EvalFault::internal("second"));
        match s.take_fault() {
            Some(JoinError::Evaluation { depth, code, .. }) => {
                assert_eq!(depth, 1);
                assert_eq!(code, FaultCode::DivisionByZero);
            }
            other => panic!("unexpected fault: {other:?}"),
        }
        assert!(s.take_fault().is_none());
    }

    #[test]
    fn test_out_of_space() {
        let s = state();
        assert!(!s.is_out_of_space());
        s.mark_out_of_space(4, 512);
        assert!(s.is_out_of_space());
        assert_eq!(s.rejected(), Some((4, 512)));
    }
}
