//! Lane groups.
//!
//! A group is a fixed number of lanes executing the same handler sequence
//! in lockstep. Lanes share a [`GroupState`] and meet at the
//! [`LaneBarrier`] collectives.

mod barrier;
mod state;

pub use barrier::{LaneBarrier, PoisonOnPanic};
pub use state::GroupState;
