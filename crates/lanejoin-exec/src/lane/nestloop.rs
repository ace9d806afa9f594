//! Nested-loop join (stages 1..=N over a row store).
//!
//! A batch of up to `lanes` outer combinations is joined against the
//! depth's window one inner row per iteration, all lanes looking at the
//! same inner row. After the last inner row, left outer joins emit one
//! null-extended combination per lane that never matched; then the batch
//! is consumed and the scan restarts with the next batch.

use lanejoin_common::constants::MAX_JOIN_DEPTH;
use lanejoin_common::types::RowLocator;

use super::{ChainBuf, LaneWorker};
use crate::program::RowCombination;
use crate::scheduler::Outcome;

impl LaneWorker<'_> {
    pub(super) fn nest_loop(&mut self, depth: usize) -> Outcome {
        let ctx = self.ctx;
        let group = self.group;
        if !group.has_room(depth) {
            return Outcome::Dive;
        }
        let input = depth - 1;
        let unread = group.unread(input);
        if unread == 0 {
            return self.rewind(depth);
        }

        let valid = self.is_valid(unread);
        let slot = group.read_pos(input) + self.lane as u32;
        let window = ctx.window(depth);

        if self.l_state[depth] < window.window_size {
            let rowid = window.window_base + self.l_state[depth];
            self.l_state[depth] += 1;

            let mut matched = false;
            if valid {
                if let Some(inner) = ctx.relations.relation(depth).get(rowid as usize) {
                    let mut buf: ChainBuf = [RowLocator::NULL; MAX_JOIN_DEPTH + 1];
                    let chain = self.load_chain(input, slot, &mut buf);
                    let outer = RowCombination::new(ctx.relations, ctx.source, chain);
                    matched = self
                        .capture(depth, ctx.program.join_quals(depth, &outer, inner))
                        .unwrap_or(false);
                }
            }
            if self.any_fault() {
                return Outcome::Abort;
            }
            if matched {
                self.matched[depth] = true;
                ctx.mark_matched(depth, rowid);
            }
            return self.emit(
                depth,
                matched,
                slot,
                RowLocator::from_index(rowid as usize),
                false,
            );
        }

        // the collective also orders every lane's cursor reads before
        // lane 0 consumes the batch
        let unmatched =
            ctx.relations.descriptor(depth).left_outer && valid && !self.matched[depth];
        if group.barrier().any(self.lane, unmatched) {
            // the next visit sees every lane matched and moves on
            self.matched[depth] = true;
            return self.emit(depth, unmatched, slot, RowLocator::NULL, true);
        }

        self.reset_consumer(depth);
        if self.lane == 0 {
            group.advance_read(input, self.lanes);
        }
        Outcome::Stay
    }
}
