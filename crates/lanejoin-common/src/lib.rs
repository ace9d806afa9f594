//! # lanejoin-common
//!
//! Common types, errors, and utilities for lanejoin.
//!
//! This crate provides the foundational types and abstractions shared by
//! the join executor, its benchmarks and its integration tests:
//!
//! - **Types**: Row locators, datums and tuples
//! - **Errors**: Unified error handling with `JoinError`
//! - **Config**: Executor configuration (`JoinConfig`)
//! - **Constants**: Depth limits, alignment and buffer layout constants
//! - **Memory**: The pseudo-stack arena holding partial row combinations
//!
//! ## Example
//!
//! ```rust
//! use lanejoin_common::types::{Datum, RowLocator, Tuple};
//! use lanejoin_common::error::JoinResult;
//!
//! fn example() -> JoinResult<()> {
//!     let locator = RowLocator::from_index(41);
//!     assert_eq!(locator.index(), Some(41));
//!     let tuple = Tuple::new(vec![Datum::Int(7), Datum::Null]);
//!     assert_eq!(tuple.len(), 2);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::JoinConfig;
pub use constants::*;
pub use error::{ErrorCode, EvalFault, FaultCode, JoinError, JoinResult};
pub use types::{Datum, RowLocator, Tuple};
