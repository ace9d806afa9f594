//! System-wide constants for lanejoin.
//!
//! These values describe depth limits, buffer layouts and default
//! execution geometry shared by every crate in the workspace.

// =============================================================================
// Join Shape Constants
// =============================================================================

/// Maximum number of inner relations in one multi-way join.
///
/// Depth 0 is the outer relation, depths `1..=MAX_JOIN_DEPTH` are inner
/// relations and `MAX_JOIN_DEPTH + 1` is the projection stage.
pub const MAX_JOIN_DEPTH: usize = 20;

/// Number of entries in the checksum table used by hash computations.
pub const CHECKSUM_TABLE_SIZE: usize = 256;

/// Sentinel chain state meaning "this lane reached the end of its hash chain".
pub const CHAIN_END: u32 = u32::MAX;

// =============================================================================
// Execution Geometry Defaults
// =============================================================================

/// Default number of lanes in one execution group.
pub const DEFAULT_LANES_PER_GROUP: usize = 32;

/// Default number of concurrently executing groups.
pub const DEFAULT_NUM_GROUPS: usize = 4;

/// Default pseudo-stack capacity (entries per depth per group).
pub const DEFAULT_PSTACK_NROOMS: usize = DEFAULT_LANES_PER_GROUP * 8;

/// Default scratch budget for the pseudo-stack arena (64 MB).
pub const DEFAULT_MAX_SCRATCH_BYTES: usize = 64 * 1024 * 1024;

// =============================================================================
// Block Source Layout
// =============================================================================

/// Number of low bits of a block-source locator holding the line number.
pub const BLOCK_LINE_BITS: u32 = 12;

/// Maximum number of line pointers in one block page.
pub const MAX_LINES_PER_BLOCK: usize = (1 << BLOCK_LINE_BITS) - 1;

/// Maximum number of pages in one block source.
pub const MAX_BLOCKS_PER_SOURCE: usize = 1 << (32 - BLOCK_LINE_BITS);

// =============================================================================
// Destination Buffer Layout
// =============================================================================

/// Alignment of tuple items in the destination buffer.
pub const MAXIMUM_ALIGNOF: usize = 8;

/// Length of the destination buffer header.
///
/// The header holds: length (4), nitems (4), usage (4), format (1) and
/// padding, rounded up to 16.
pub const DESTINATION_HEAD_LENGTH: usize = 16;

/// Size of one row-index entry in the destination buffer.
pub const ROW_INDEX_ENTRY_SIZE: usize = 4;

/// Size of the per-tuple item header in the destination buffer.
///
/// The header holds the encoded tuple length (4) and the row number (4).
pub const TUPLE_ITEM_HEADER_SIZE: usize = 8;

/// Maximum number of fields in one encoded tuple (the count is a `u16`).
pub const MAX_TUPLE_FIELDS: usize = u16::MAX as usize;

/// Rounds `len` up to [`MAXIMUM_ALIGNOF`].
#[inline]
#[must_use]
pub const fn max_align(len: usize) -> usize {
    (len + MAXIMUM_ALIGNOF - 1) & !(MAXIMUM_ALIGNOF - 1)
}
