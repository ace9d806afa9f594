//! Projection (stage N+1).

use tracing::warn;

use lanejoin_common::constants::{MAX_JOIN_DEPTH, MAX_TUPLE_FIELDS};
use lanejoin_common::error::{EvalFault, FaultCode};
use lanejoin_common::types::{RowLocator, Tuple};

use super::{ChainBuf, LaneWorker};
use crate::destination::DestinationBuffer;
use crate::program::RowCombination;
use crate::scheduler::Outcome;

impl LaneWorker<'_> {
    /// Materializes a batch of buffer N into the destination.
    ///
    /// The whole batch is reserved at once; if the destination refuses it,
    /// nothing of the batch is written and the group stops.
    pub(super) fn project(&mut self) -> Outcome {
        let ctx = self.ctx;
        let group = self.group;
        let barrier = group.barrier();
        let input = self.num_rels;
        let stage = self.num_rels + 1;

        let unread = group.unread(input);
        if unread == 0 {
            return self.rewind(stage);
        }
        let nvalids = unread.min(self.lanes);
        let valid = self.is_valid(unread);
        let slot = group.read_pos(input) + self.lane as u32;

        let mut tuple = None;
        let mut required = 0u32;
        if valid {
            let mut buf: ChainBuf = [RowLocator::NULL; MAX_JOIN_DEPTH + 1];
            let chain = self.load_chain(input, slot, &mut buf);
            let combination = RowCombination::new(ctx.relations, ctx.source, chain);
            let projected = ctx.program.project(&combination).and_then(check_width);
            if let Some(projected) = self.capture(stage, projected) {
                required = u32::try_from(DestinationBuffer::item_size(&projected))
                    .unwrap_or(u32::MAX);
                tuple = Some(projected);
            }
        }
        if self.any_fault() {
            return Outcome::Abort;
        }

        let (offset, total) = barrier.stairlike_sum(self.lane, required);
        if self.lane == 0 {
            match ctx.dest.reserve(nvalids, total) {
                Some((row, usage)) => group.set_dest_bases(row, usage),
                None => {
                    warn!(
                        group = group.group(),
                        rows = nvalids,
                        bytes = total,
                        free = ctx.dest.free_space(),
                        "destination buffer cannot take the batch"
                    );
                    group.mark_out_of_space(nvalids, total);
                    ctx.cancel();
                }
            }
        }
        barrier.sync(self.lane);
        if group.is_out_of_space() {
            return Outcome::OutOfSpace;
        }

        let (row_base, usage_base) = group.dest_bases();
        if let Some(tuple) = tuple {
            ctx.dest
                .write_tuple(row_base + self.lane as u32, usage_base + offset, &tuple);
        }
        if self.lane == 0 {
            group.advance_read(input, nvalids);
        }
        Outcome::Stay
    }
}

/// Rejects tuples the destination cannot encode, before anything is reserved.
fn check_width(tuple: Tuple) -> Result<Tuple, EvalFault> {
    if tuple.len() > MAX_TUPLE_FIELDS {
        return Err(EvalFault::new(
            FaultCode::InvalidValue,
            format!(
                "projected tuple has {} fields, at most {MAX_TUPLE_FIELDS} fit",
                tuple.len()
            ),
        ));
    }
    Ok(tuple)
}
