//! Error handling for lanejoin.
//!
//! This module provides a unified error type and result alias used
//! across all lanejoin components, plus the fault type returned by
//! per-query collaborator callbacks.

mod fault;
mod join;

pub use fault::{EvalFault, FaultCode};
pub use join::{ErrorCode, JoinError};

/// Result type alias for lanejoin operations.
pub type JoinResult<T> = std::result::Result<T, JoinError>;
