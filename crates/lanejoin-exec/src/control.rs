//! Join control block.
//!
//! The control block is the only state that survives between invocations
//! of the executor: the per-depth window geometry, the per-depth result
//! counters and distribution scores, and the terminal status.
//!
//! ## Windows
//!
//! Each depth joins against a window `[window_base, window_base +
//! window_size)` of its relation (rows, or pages for a block-format
//! source). When a run produces more results than the destination can
//! hold, the caller shrinks the window of the depth with the highest
//! distribution score and walks the relation slice by slice:
//!
//! ```text
//! depth d: |<----------- window_orig .. nitems ----------->|
//!          |  slice 0  |  slice 1  |  slice 2  |  slice 3  |
//!             ^ window_base, window_size after shrink_window(d)
//! ```

use std::fmt;

use lanejoin_common::error::{FaultCode, JoinError, JoinResult};

use crate::relation::{MultiRelationSet, SourceBatch};

/// Window geometry and result counters of one depth.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowScale {
    /// First row of the relation covered by the window walk.
    pub window_orig: u32,
    /// First row of the current window.
    pub window_base: u32,
    /// Number of rows in the current window.
    pub window_size: u32,
    /// Matched results produced at this depth over successful invocations.
    /// At depth 0: rows surviving the prefilter.
    pub inner_nitems: u64,
    /// Null-extended (left outer) results over successful invocations.
    pub outer_nitems: u64,
    /// Matched results of the last invocation.
    pub inner_nitems_stage: u64,
    /// Null-extended results of the last invocation.
    pub outer_nitems_stage: u64,
    /// Result density of the last invocation, used to pick the window to
    /// shrink.
    pub row_dist_score: f64,
    /// Window base before the last shrink.
    pub window_base_saved: u32,
    /// Window size before the last shrink.
    pub window_size_saved: u32,
}

impl WindowScale {
    /// Creates a window covering all `nitems` rows.
    #[must_use]
    pub fn whole(nitems: u32) -> Self {
        Self {
            window_orig: 0,
            window_base: 0,
            window_size: nitems,
            inner_nitems: 0,
            outer_nitems: 0,
            inner_nitems_stage: 0,
            outer_nitems_stage: 0,
            row_dist_score: 0.0,
            window_base_saved: 0,
            window_size_saved: nitems,
        }
    }

    /// Returns one past the last row of the window.
    #[inline]
    #[must_use]
    pub fn window_end(&self) -> u32 {
        self.window_base.saturating_add(self.window_size)
    }

    /// Returns true if `rowid` lies inside the window.
    #[inline]
    #[must_use]
    pub fn contains(&self, rowid: u32) -> bool {
        rowid >= self.window_base && rowid < self.window_end()
    }
}

/// Terminal status of the last invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JoinStatus {
    /// Every combination was projected.
    #[default]
    Success,
    /// The destination buffer ran out of room.
    NoSpace,
    /// A collaborator callback failed.
    EvalError {
        /// Depth at which the fault was raised (N + 1 for projection).
        depth: usize,
        /// Fault code reported by the callback.
        code: FaultCode,
        /// Diagnostic message.
        message: String,
    },
}

impl JoinStatus {
    /// Returns true for [`JoinStatus::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NoSpace => write!(f, "out of space"),
            Self::EvalError {
                depth,
                code,
                message,
            } => write!(f, "evaluation error at depth {depth} ({code:?}): {message}"),
        }
    }
}

/// Per-execution mutable state of a join.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::types::Tuple;
/// use lanejoin_exec::control::JoinControlBlock;
/// use lanejoin_exec::relation::{JoinType, MultiRelationSet, RowStore, SourceBatch};
///
/// let inner: RowStore = (0..8).map(|i| Tuple::ints([Some(i)])).collect();
/// let rels = MultiRelationSet::builder()
///     .nest_loop(inner, JoinType::Inner)
///     .build()
///     .unwrap();
/// let source = SourceBatch::Row((0..4).map(|i| Tuple::ints([Some(i)])).collect());
///
/// let mut control = JoinControlBlock::new(&rels, &source, 64).unwrap();
/// assert_eq!(control.window(1).window_size, 8);
///
/// assert!(control.shrink_window(1));
/// assert_eq!(control.window(1).window_size, 4);
/// assert!(control.advance_window(1, 8));
/// assert_eq!(control.window(1).window_base, 4);
/// assert!(!control.advance_window(1, 8));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JoinControlBlock {
    /// Source cursor after the last invocation, clamped to the depth-0
    /// window end.
    pub src_read_pos: u64,
    /// Source rows rejected by the prefilter in the last invocation.
    pub nitems_filtered: u64,
    /// Tuples in the destination buffer after the last invocation.
    pub result_nitems: u32,
    /// Destination bytes used after the last invocation.
    pub result_usage: u32,
    /// Pseudo-stack entries per depth per group.
    pub pstack_nrooms: usize,
    /// Terminal status of the last invocation.
    pub status: JoinStatus,
    /// One window per depth, 0..=N.
    windows: Vec<WindowScale>,
}

impl JoinControlBlock {
    /// Creates a control block whose windows cover every relation whole.
    pub fn new(
        relations: &MultiRelationSet,
        source: &SourceBatch,
        pstack_nrooms: usize,
    ) -> JoinResult<Self> {
        let mut windows = Vec::with_capacity(relations.num_rels() + 1);
        windows.push(WindowScale::whole(to_u32(0, source.nitems())?));
        for desc in relations.descriptors() {
            windows.push(WindowScale::whole(to_u32(desc.depth, desc.nitems)?));
        }

        Ok(Self {
            src_read_pos: 0,
            nitems_filtered: 0,
            result_nitems: 0,
            result_usage: 0,
            pstack_nrooms,
            status: JoinStatus::Success,
            windows,
        })
    }

    /// Returns N, the number of inner relations.
    #[must_use]
    pub fn num_rels(&self) -> usize {
        self.windows.len() - 1
    }

    /// Returns the window of `depth`.
    #[must_use]
    pub fn window(&self, depth: usize) -> &WindowScale {
        &self.windows[depth]
    }

    /// Returns the window of `depth` for modification.
    pub fn window_mut(&mut self, depth: usize) -> &mut WindowScale {
        &mut self.windows[depth]
    }

    /// Returns every window in depth order.
    #[must_use]
    pub fn windows(&self) -> &[WindowScale] {
        &self.windows
    }

    /// Returns the depth whose window should be shrunk next, if any.
    ///
    /// Picks the highest distribution score among windows with more than
    /// one row. Inner depths of left outer joins are never split: their
    /// null-extended results need the whole relation in one window.
    #[must_use]
    pub fn split_target(&self, relations: &MultiRelationSet) -> Option<usize> {
        self.windows
            .iter()
            .enumerate()
            .filter(|(depth, w)| {
                w.window_size > 1 && (*depth == 0 || !relations.descriptor(*depth).left_outer)
            })
            .max_by(|(_, a), (_, b)| a.row_dist_score.total_cmp(&b.row_dist_score))
            .map(|(depth, _)| depth)
    }

    /// Halves the window of `depth`, remembering the previous geometry.
    ///
    /// Returns false if the window cannot shrink any further.
    pub fn shrink_window(&mut self, depth: usize) -> bool {
        let w = &mut self.windows[depth];
        if w.window_size <= 1 {
            return false;
        }
        w.window_base_saved = w.window_base;
        w.window_size_saved = w.window_size;
        w.window_size = w.window_size.div_ceil(2);
        true
    }

    /// Slides the window of `depth` to the next slice of a relation with
    /// `total` rows. Returns false when no slice remains.
    pub fn advance_window(&mut self, depth: usize, total: u32) -> bool {
        let w = &mut self.windows[depth];
        let next = w.window_end();
        if next >= total {
            return false;
        }
        w.window_base = next;
        w.window_size = w.window_size.min(total - next);
        true
    }

    /// Restores the geometry saved by the last [`JoinControlBlock::shrink_window`].
    pub fn restore_window(&mut self, depth: usize) {
        let w = &mut self.windows[depth];
        w.window_base = w.window_base_saved;
        w.window_size = w.window_size_saved;
    }

    /// Checks that the windows fit the relations they describe.
    pub(crate) fn check_windows(
        &self,
        relations: &MultiRelationSet,
        source: &SourceBatch,
    ) -> JoinResult<()> {
        if self.num_rels() != relations.num_rels() {
            return Err(JoinError::invalid_relation(
                self.num_rels(),
                format!(
                    "control block describes {} relations, set has {}",
                    self.num_rels(),
                    relations.num_rels()
                ),
            ));
        }
        for (depth, w) in self.windows.iter().enumerate() {
            let nitems = if depth == 0 {
                source.nitems()
            } else {
                relations.descriptor(depth).nitems
            };
            if w.window_end() as usize > nitems || w.window_base < w.window_orig {
                return Err(JoinError::invalid_relation(
                    depth,
                    format!(
                        "window [{}, {}) outside relation of {} rows",
                        w.window_base,
                        w.window_end(),
                        nitems
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Clears the per-invocation outputs before a run.
    pub(crate) fn begin_stage(&mut self) {
        self.status = JoinStatus::Success;
        self.nitems_filtered = 0;
        for w in &mut self.windows {
            w.inner_nitems_stage = 0;
            w.outer_nitems_stage = 0;
            w.row_dist_score = 0.0;
        }
    }

    /// Folds the stage counters of a successful run into the totals.
    pub(crate) fn commit_stage(&mut self) {
        for w in &mut self.windows {
            w.inner_nitems += w.inner_nitems_stage;
            w.outer_nitems += w.outer_nitems_stage;
        }
    }
}

fn to_u32(depth: usize, nitems: usize) -> JoinResult<u32> {
    u32::try_from(nitems).map_err(|_| {
        JoinError::invalid_relation(depth, format!("{nitems} rows exceed the window range"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{JoinType, RowStore};
    use lanejoin_common::types::Tuple;

    fn rows(n: i64) -> RowStore {
        (0..n).map(|i| Tuple::ints([Some(i)])).collect()
    }

    fn fixture() -> (MultiRelationSet, SourceBatch) {
        let rels = MultiRelationSet::builder()
            .nest_loop(rows(10), JoinType::Inner)
            .nest_loop(rows(6), JoinType::Left)
            .build()
            .unwrap();
        (rels, SourceBatch::Row(rows(5)))
    }

    #[test]
    fn test_whole_windows() {
        let (rels, source) = fixture();
        let control = JoinControlBlock::new(&rels, &source, 32).unwrap();
        assert_eq!(control.num_rels(), 2);
        assert_eq!(control.window(0).window_size, 5);
        assert_eq!(control.window(1).window_size, 10);
        assert_eq!(control.window(2).window_end(), 6);
        assert!(control.status.is_success());
        assert!(control.check_windows(&rels, &source).is_ok());
    }

    #[test]
    fn test_split_target_skips_left_outer() {
        let (rels, source) = fixture();
        let mut control = JoinControlBlock::new(&rels, &source, 32).unwrap();
        control.window_mut(0).row_dist_score = 0.5;
        control.window_mut(1).row_dist_score = 0.9;
        control.window_mut(2).row_dist_score = 5.0;
        assert_eq!(control.split_target(&rels), Some(1));

        control.window_mut(1).window_size = 1;
        assert_eq!(control.split_target(&rels), Some(0));
    }

    #[test]
    fn test_walk_all_slices() {
        let (rels, source) = fixture();
        let mut control = JoinControlBlock::new(&rels, &source, 32).unwrap();
        assert!(control.shrink_window(1));
        assert!(control.shrink_window(1));
        assert_eq!(control.window(1).window_size, 3);

        let mut covered = Vec::new();
        loop {
            let w = control.window(1);
            covered.extend(w.window_base..w.window_end());
            if !control.advance_window(1, 10) {
                break;
            }
        }
        assert_eq!(covered, (0..10).collect::<Vec<_>>());

        control.restore_window(1);
        assert_eq!(control.window(1).window_base, 0);
        assert_eq!(control.window(1).window_size, 5);
    }

    #[test]
    fn test_shrink_stops_at_one() {
        let (rels, source) = fixture();
        let mut control = JoinControlBlock::new(&rels, &source, 32).unwrap();
        control.window_mut(2).window_size = 1;
        assert!(!control.shrink_window(2));
    }

    #[test]
    fn test_bad_window_rejected() {
        let (rels, source) = fixture();
        let mut control = JoinControlBlock::new(&rels, &source, 32).unwrap();
        control.window_mut(1).window_base = 8;
        let err = control.check_windows(&rels, &source).unwrap_err();
        assert!(matches!(err, JoinError::InvalidRelation { depth: 1, .. }));
    }

    #[test]
    fn test_commit_stage() {
        let (rels, source) = fixture();
        let mut control = JoinControlBlock::new(&rels, &source, 32).unwrap();
        control.window_mut(1).inner_nitems_stage = 4;
        control.commit_stage();
        control.commit_stage();
        assert_eq!(control.window(1).inner_nitems, 8);

        control.begin_stage();
        assert_eq!(control.window(1).inner_nitems_stage, 0);
        assert_eq!(control.window(1).inner_nitems, 8);
    }
}
