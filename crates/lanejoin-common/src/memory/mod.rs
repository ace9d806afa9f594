//! Scratch memory for lanejoin.
//!
//! This module provides the pseudo-stack arena: a fixed-stride region
//! holding, per group and per depth, the locator chains of partial row
//! combinations waiting for the next depth or for projection.
//!
//! # Design Principles
//!
//! 1. **Index-based access**: entries are addressed by `(group, depth, slot)`,
//!    never by raw offsets, and every access is bounds checked
//! 2. **Lock-free**: locator words are atomics, so lanes of a group write
//!    their own slots concurrently
//! 3. **Allocated once**: the arena is sized up front from the join shape

mod pseudo_stack;

pub use pseudo_stack::{PseudoStack, PseudoStackArena};
