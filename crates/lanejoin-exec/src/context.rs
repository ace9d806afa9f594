//! State shared by every group of one executor run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use lanejoin_common::config::JoinConfig;
use lanejoin_common::memory::PseudoStackArena;

use crate::control::WindowScale;
use crate::destination::DestinationBuffer;
use crate::program::JoinProgram;
use crate::relation::{AtomicBitmap, MultiRelationSet, SourceBatch};
use crate::scheduler::JoinShape;
use crate::stats::RunStats;

/// Read-only inputs plus the cross-group atomics of a run.
pub(crate) struct RunContext<'a> {
    pub relations: &'a MultiRelationSet,
    pub program: &'a dyn JoinProgram,
    pub source: &'a SourceBatch,
    pub dest: &'a DestinationBuffer,
    pub arena: &'a PseudoStackArena,
    pub shape: JoinShape,
    pub stats: RunStats,
    pub device: usize,
    pub lanes: usize,
    pub part_sz: usize,
    windows: Vec<WindowScale>,
    source_end: u64,
    cursor: AtomicU64,
    cancelled: AtomicBool,
    /// Distinct inner rows matched per depth; `None` at depth 0.
    matched_rows: Vec<Option<AtomicBitmap>>,
}

impl<'a> RunContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        relations: &'a MultiRelationSet,
        program: &'a dyn JoinProgram,
        source: &'a SourceBatch,
        dest: &'a DestinationBuffer,
        arena: &'a PseudoStackArena,
        windows: &[WindowScale],
        config: &JoinConfig,
        device: usize,
    ) -> Self {
        let num_rels = relations.num_rels();
        let origin = &windows[0];
        let matched_rows = (0..=num_rels)
            .map(|depth| (depth > 0).then(|| AtomicBitmap::new(relations.descriptor(depth).nitems)))
            .collect();

        Self {
            relations,
            program,
            source,
            dest,
            arena,
            shape: JoinShape::of(relations),
            stats: RunStats::new(num_rels),
            device,
            lanes: config.lanes_per_group,
            part_sz: config.partition_size(),
            source_end: u64::from(origin.window_end()),
            cursor: AtomicU64::new(u64::from(origin.window_base)),
            cancelled: AtomicBool::new(false),
            windows: windows.to_vec(),
            matched_rows,
        }
    }

    /// Returns the window of `depth`.
    #[inline]
    pub fn window(&self, depth: usize) -> &WindowScale {
        &self.windows[depth]
    }

    /// Returns one past the last source unit of the run.
    #[inline]
    pub fn source_end(&self) -> u64 {
        self.source_end
    }

    /// Claims `unit` source units and returns the first.
    #[inline]
    pub fn claim(&self, unit: u64) -> u64 {
        self.cursor.fetch_add(unit, Ordering::Relaxed)
    }

    /// Returns the source cursor clamped to the window end.
    pub fn cursor_position(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed).min(self.source_end)
    }

    /// Stops every group at its next source load.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns true once some group failed.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Records a predicate match on inner row `rowid` of `depth`.
    pub fn mark_matched(&self, depth: usize, rowid: u32) {
        if let Some(map) = &self.matched_rows[depth] {
            map.set(rowid as usize);
        }
        self.relations
            .outer_join_maps()
            .mark(depth, self.device, rowid as usize);
    }

    /// Returns the distinct inner rows of `depth` matched during the run.
    pub fn distinct_matched(&self, depth: usize) -> usize {
        self.matched_rows[depth]
            .as_ref()
            .map_or(0, AtomicBitmap::count_ones)
    }
}
