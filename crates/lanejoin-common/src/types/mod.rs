//! Type definitions for lanejoin.
//!
//! This module contains the value and locator types shared by the join
//! executor and its collaborators.

mod datum;
mod ids;

pub use datum::{Datum, Tuple};
pub use ids::{ItemPointer, RowLocator};
