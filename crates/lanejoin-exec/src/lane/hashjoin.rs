//! Hash join (stages 1..=N over a hash table).
//!
//! On first touch every lane hashes its outer combination and positions
//! itself at the head of the bucket's synonym chain. Each iteration then
//! visits one chain item per lane. A lane whose chain is exhausted without
//! a match emits one null-extended combination when the depth is left
//! outer joined; null keys skip the probe but still take part in that
//! accounting. The batch is consumed once no lane has anything left to do.

use lanejoin_common::constants::{CHAIN_END, MAX_JOIN_DEPTH};
use lanejoin_common::types::RowLocator;

use super::{ChainBuf, LaneWorker};
use crate::program::RowCombination;
use crate::scheduler::Outcome;

impl LaneWorker<'_> {
    pub(super) fn hash_join(&mut self, depth: usize) -> Outcome {
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

        let Some(table) = ctx.relations.relation(depth).as_hash_table() else {
            unreachable!("depth {depth} is hash joined without a hash table");
        };
        let left_outer = ctx.relations.descriptor(depth).left_outer;
        let window = ctx.window(depth);
        let valid = self.is_valid(unread);
        let slot = group.read_pos(input) + self.lane as u32;

        let mut buf: ChainBuf = [RowLocator::NULL; MAX_JOIN_DEPTH + 1];
        let chain: &[RowLocator] = if valid {
            self.load_chain(input, slot, &mut buf)
        } else {
            &[]
        };
        let outer = RowCombination::new(ctx.relations, ctx.source, chain);

        if self.l_state[depth] == 0 {
            self.l_state[depth] = CHAIN_END;
            if valid {
                let key = self.capture(
                    depth,
                    ctx.program.hash_value(group.checksum(), depth, &outer),
                );
                if let Some(key) = key.filter(|k| !k.is_null) {
                    if let Some(head) = table.bucket_head(key.hash) {
                        self.hash[depth] = key.hash;
                        self.l_state[depth] = head + 1;
                    }
                }
            }
        }

        let pending_null = valid && left_outer && !self.matched[depth];
        let active = self.l_state[depth] != CHAIN_END || pending_null;

        let mut emit = false;
        let mut null_extended = false;
        let mut locator = RowLocator::NULL;
        if self.l_state[depth] != CHAIN_END {
            let item = table.item(self.l_state[depth] - 1);
            self.l_state[depth] = item.next().map_or(CHAIN_END, |next| next + 1);
            if item.hash == self.hash[depth] && window.contains(item.rowid) {
                let matched = self
                    .capture(depth, ctx.program.join_quals(depth, &outer, &item.tuple))
                    .unwrap_or(false);
                if matched {
                    emit = true;
                    locator = RowLocator::from_index(item.rowid as usize);
                    self.matched[depth] = true;
                    ctx.mark_matched(depth, item.rowid);
                }
            }
        } else if pending_null {
            emit = true;
            null_extended = true;
            self.matched[depth] = true;
        }

        if self.any_fault() {
            return Outcome::Abort;
        }
        if !group.barrier().any(self.lane, active) {
            self.reset_consumer(depth);
            if self.lane == 0 {
                group.advance_read(input, self.lanes);
            }
            return Outcome::Stay;
        }
        self.emit(depth, emit, slot, locator, null_extended)
    }
}
