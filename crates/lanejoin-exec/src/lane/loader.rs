//! Source loader (stage 0).

use lanejoin_common::types::{RowLocator, Tuple};

use super::LaneWorker;
use crate::relation::{BlockStore, RowStore, SourceBatch};
use crate::scheduler::Outcome;

impl LaneWorker<'_> {
    /// Fills buffer 0 with the next batch of source rows that pass the
    /// prefilter.
    pub(super) fn load_source(&mut self) -> Outcome {
        if !self.group.has_room(0) {
            return Outcome::Dive;
        }
        let cancelled = self.lane == 0 && self.ctx.is_cancelled();
        if self.group.barrier().any(self.lane, cancelled) {
            return Outcome::Abort;
        }

        let ctx = self.ctx;
        match ctx.source {
            SourceBatch::Row(store) => self.load_rows(store),
            SourceBatch::Block(store) => self.load_block(store),
        }
    }

    /// One row per lane.
    fn load_rows(&mut self, store: &RowStore) -> Outcome {
        if self.source_done {
            return self.source_exhausted();
        }
        let base = self.claim(u64::from(self.lanes));
        let end = self.ctx.source_end();
        if base >= end {
            self.source_done = true;
            return self.source_exhausted();
        }

        let pos = base + self.lane as u64;
        let mut keep = false;
        let mut locator = RowLocator::NULL;
        if pos < end {
            if let Some(row) = store.get(pos as usize) {
                locator = RowLocator::from_index(pos as usize);
                keep = self.filter(row);
            }
        }
        if self.any_fault() {
            return Outcome::Abort;
        }
        self.append_source(keep, locator)
    }

    /// `part_sz` lanes per page, `lanes / part_sz` pages per unit; the
    /// lanes walk their pages `part_sz` lines at a time until no lane is
    /// still inside its page.
    fn load_block(&mut self, store: &BlockStore) -> Outcome {
        let part_sz = self.ctx.part_sz as u64;
        let n_parts = u64::from(self.lanes) / part_sz;
        let end = self.ctx.source_end();

        let unit = match self.block_unit {
            Some(unit) => unit,
            None => {
                if self.source_done {
                    return self.source_exhausted();
                }
                let base = self.claim(n_parts);
                if base >= end {
                    self.source_done = true;
                    return self.source_exhausted();
                }
                self.block_unit = Some(base);
                self.block_chunk = 0;
                base
            }
        };

        let lane = self.lane as u64;
        let page_index = unit + lane / part_sz;
        let line = (lane % part_sz) as usize + self.block_chunk * part_sz as usize + 1;

        let mut in_page = false;
        let mut keep = false;
        let mut locator = RowLocator::NULL;
        if lane / part_sz < n_parts && page_index < end {
            if let Some(page) = store.page(page_index as usize) {
                in_page = line <= page.nlines();
                if let Some(row) = page.line(line) {
                    locator = RowLocator::from_block(page_index as usize, line);
                    keep = self.filter(row);
                }
            }
        }
        if self.any_fault() {
            return Outcome::Abort;
        }
        if !self.group.barrier().any(self.lane, in_page) {
            self.block_unit = None;
            self.block_chunk = 0;
            return Outcome::Stay;
        }
        self.block_chunk += 1;
        self.append_source(keep, locator)
    }

    /// Claims `unit` source units for the group; lane 0 draws from the
    /// shared cursor and publishes the result.
    fn claim(&self, unit: u64) -> u64 {
        if self.lane == 0 {
            self.group.set_source_base(self.ctx.claim(unit));
        }
        self.group.barrier().sync(self.lane);
        self.group.source_base()
    }

    fn filter(&mut self, row: &Tuple) -> bool {
        let ctx = self.ctx;
        let keep = self.capture(0, ctx.program.prefilter(row)).unwrap_or(false);
        if !keep && !self.faulted {
            ctx.stats.record_filtered();
        }
        keep
    }

    /// Compacts the surviving rows into buffer 0.
    fn append_source(&mut self, keep: bool, locator: RowLocator) -> Outcome {
        let base = self.group.write_pos(0);
        let (prefix, total) = self.group.barrier().stairlike_count(self.lane, keep);
        if keep {
            self.stack.store(0, (base + prefix) as usize, &[locator]);
        }
        if self.lane == 0 && total > 0 {
            self.group.advance_write(0, total);
            self.ctx.stats.add_inner(0, total);
        }
        Outcome::Stay
    }

    /// The source is exhausted: finish once every buffer is drained,
    /// otherwise drain the deeper depths first.
    fn source_exhausted(&self) -> Outcome {
        if self.group.all_drained() {
            Outcome::Finish
        } else {
            Outcome::Dive
        }
    }
}
