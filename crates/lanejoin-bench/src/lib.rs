//! Performance benchmarks for lanejoin.
//!
//! The benchmarks cover:
//! - Nested-loop and hash joins of a source batch against one inner relation
//! - Three-way joins with both strategies stacked
//! - Scaling over the number of lanes and groups
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p lanejoin-bench
//! ```

pub mod utils;
