//! # lanejoin-exec
//!
//! Lane-group multi-way join executor.
//!
//! This crate evaluates a chain of nested-loop and hash joins over one
//! source relation and N inner relations:
//!
//! - **Relations**: source batches, inner relations, checksum table and
//!   outer-join maps
//! - **Control block**: per-depth windows, result counters and status
//! - **Groups**: lanes in lockstep, sharing cursors through a barrier
//! - **Scheduler**: the depth walk as a pure state transition
//! - **Destination**: fixed-capacity output with overflow-safe reservation
//! - **Executor**: the entry point tying it all together
//!
//! ## Data flow
//!
//! ```text
//! source --load--> buffer 0 --depth 1--> buffer 1 ... buffer N --project--> destination
//! ```
//!
//! Each buffer is one depth of a per-group pseudo-stack; handlers dive to
//! drain full buffers and rewind to refill exhausted ones.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod control;
pub mod destination;
pub mod executor;
pub mod group;
pub mod program;
pub mod relation;
pub mod scheduler;
pub mod stats;

mod context;
mod lane;

pub use control::{JoinControlBlock, JoinStatus, WindowScale};
pub use destination::DestinationBuffer;
pub use executor::{JoinExecutor, JoinSummary};
pub use program::{ColumnRef, EquiJoinProgram, HashKey, JoinProgram, RowCombination};
pub use relation::{JoinType, MultiRelationSet, SourceBatch};
pub use scheduler::{JoinShape, Outcome, Step};
