//! Lane worker: one lane of one group walking the join depths.
//!
//! Every handler is executed by all lanes of a group in lockstep. Branches
//! that decide which collective comes next depend only on group-uniform
//! values: shared cursors read after a barrier, collective results, or
//! lane-local state that every lane updates identically.
//!
//! Shared cursors are read at the top of a handler and written by lane 0
//! only after at least one collective of the same iteration.

mod hashjoin;
mod loader;
mod nestloop;
mod projection;

use tracing::{trace, warn};

use lanejoin_common::constants::MAX_JOIN_DEPTH;
use lanejoin_common::error::EvalFault;
use lanejoin_common::memory::PseudoStack;
use lanejoin_common::types::RowLocator;

use crate::context::RunContext;
use crate::group::GroupState;
use crate::scheduler::{Outcome, Step};

/// Scratch buffer for one locator chain.
type ChainBuf = [RowLocator; MAX_JOIN_DEPTH + 1];

pub(crate) struct LaneWorker<'a> {
    ctx: &'a RunContext<'a>,
    group: &'a GroupState,
    stack: PseudoStack<'a>,
    lane: usize,
    lanes: u32,
    num_rels: usize,
    /// Per depth: nested-loop scan offset into the window (uniform across
    /// lanes), or hash-chain position (0 untouched, `CHAIN_END` done,
    /// otherwise item index + 1).
    l_state: Vec<u32>,
    /// Per depth: the lane's current outer combination found a match.
    matched: Vec<bool>,
    /// Per depth: join-key hash of the lane's current outer combination.
    hash: Vec<u32>,
    /// The shared source cursor passed the window end.
    source_done: bool,
    /// First page of the block unit being walked.
    block_unit: Option<u64>,
    /// Line chunk of the block unit being walked.
    block_chunk: usize,
    /// This lane raised an evaluation fault.
    faulted: bool,
}

impl<'a> LaneWorker<'a> {
    pub fn new(ctx: &'a RunContext<'a>, group: &'a GroupState, lane: usize) -> Self {
        let num_rels = ctx.shape.num_rels();
        Self {
            ctx,
            group,
            stack: ctx.arena.group(group.group()),
            lane,
            lanes: ctx.lanes as u32,
            num_rels,
            l_state: vec![0; num_rels + 2],
            matched: vec![false; num_rels + 2],
            hash: vec![0; num_rels + 2],
            source_done: false,
            block_unit: None,
            block_chunk: 0,
            faulted: false,
        }
    }

    /// Walks the depths until the group is done.
    pub fn run(mut self) {
        let group = self.group;
        let barrier = group.barrier();
        let _poison = barrier.poison_on_panic();

        let mut step = Step::LoadSource;
        while step != Step::Done {
            let outcome = match step {
                Step::LoadSource => self.load_source(),
                Step::NestLoop(depth) => self.nest_loop(depth),
                Step::HashJoin(depth) => self.hash_join(depth),
                Step::Project => self.project(),
                Step::Done => Outcome::Finish,
            };
            if self.lane == 0 {
                self.record(step, outcome);
            }
            step = self.ctx.shape.transition(step, outcome);
            barrier.sync(self.lane);
        }
    }

    fn record(&self, step: Step, outcome: Outcome) {
        let stats = &self.ctx.stats;
        stats.record_iteration();
        match outcome {
            Outcome::Dive => {
                stats.record_dive();
                trace!(group = self.group.group(), ?step, "dive");
            }
            Outcome::Rewind(stage) => {
                stats.record_rewind();
                trace!(group = self.group.group(), ?step, stage, "rewind");
            }
            Outcome::Finish | Outcome::Abort | Outcome::OutOfSpace => {
                trace!(group = self.group.group(), ?step, ?outcome, "group done");
            }
            Outcome::Stay => {}
        }
    }

    /// Returns true if this lane handles an entry of a batch of `unread`
    /// entries.
    #[inline]
    fn is_valid(&self, unread: u32) -> bool {
        (self.lane as u32) < unread.min(self.lanes)
    }

    /// Loads the chain of entry `slot` of `depth` into `buf`.
    fn load_chain<'b>(&self, depth: usize, slot: u32, buf: &'b mut ChainBuf) -> &'b [RowLocator] {
        let chain = &mut buf[..=depth];
        self.stack.load(depth, slot as usize, chain);
        chain
    }

    /// Unwraps a callback result, recording the first fault of the group
    /// and cancelling the run on error.
    fn capture<T>(&mut self, depth: usize, result: Result<T, EvalFault>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(fault) => {
                warn!(
                    group = self.group.group(),
                    lane = self.lane,
                    depth,
                    %fault,
                    "evaluation fault"
                );
                self.group.record_fault(depth, fault);
                self.ctx.cancel();
                self.faulted = true;
                None
            }
        }
    }

    /// Returns true if any lane of the group faulted.
    fn any_fault(&self) -> bool {
        self.group.barrier().any(self.lane, self.faulted)
    }

    /// Appends one entry per emitting lane to `depth`: the lane's input
    /// entry `slot` of `depth - 1` extended with `locator`.
    ///
    /// The caller has checked that `depth` has room for one entry per lane.
    fn emit(
        &mut self,
        depth: usize,
        emit: bool,
        slot: u32,
        locator: RowLocator,
        null_extended: bool,
    ) -> Outcome {
        let base = self.group.write_pos(depth);
        let (prefix, total) = self.group.barrier().stairlike_count(self.lane, emit);
        if emit {
            self.stack
                .extend(depth, slot as usize, (base + prefix) as usize, locator);
            if null_extended {
                self.ctx.stats.add_outer(depth, 1);
            } else {
                self.ctx.stats.add_inner(depth, 1);
            }
        }
        if self.lane == 0 && total > 0 {
            self.group.advance_write(depth, total);
        }
        Outcome::Stay
    }

    /// Clears the scan state of the handler at `stage`.
    fn reset_consumer(&mut self, stage: usize) {
        self.l_state[stage] = 0;
        self.matched[stage] = false;
    }

    /// Handles an exhausted input at `stage` (1..=N+1).
    ///
    /// Resets exhausted buffers from `stage - 1` downwards until a
    /// shallower buffer still holds unread entries, or the source is
    /// reached. With the source exhausted the walk dives instead, and
    /// finishes once the projection stage has nothing left.
    fn rewind(&mut self, stage: usize) -> Outcome {
        let group = self.group;
        let barrier = group.barrier();
        let mut depth = stage - 1;
        loop {
            barrier.sync(self.lane);
            if self.lane == 0 {
                group.reset_depth(depth);
            }
            self.reset_consumer(depth + 1);
            barrier.sync(self.lane);

            if depth == 0 {
                return if !self.source_done {
                    Outcome::Rewind(0)
                } else if stage == self.num_rels + 1 {
                    Outcome::Finish
                } else {
                    Outcome::Dive
                };
            }
            if group.has_unread(depth - 1) {
                return Outcome::Rewind(depth);
            }
            depth -= 1;
        }
    }
}
