//! Configuration for lanejoin.
//!
//! This module provides the configuration structure for the join executor.

mod join;

pub use join::JoinConfig;
