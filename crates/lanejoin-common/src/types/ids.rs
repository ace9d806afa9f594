//! Row locator types for lanejoin.
//!
//! A locator identifies one row of the outer relation or of an inner
//! relation. Locator chains, one locator per depth, are what the
//! pseudo-stack stores for every partial row combination.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{BLOCK_LINE_BITS, MAX_BLOCKS_PER_SOURCE, MAX_LINES_PER_BLOCK};

/// Row locator - identifies a row within one depth of a join.
///
/// The value 0 is reserved for the null locator, used for the absent
/// inner side of an outer-join combination.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::types::RowLocator;
///
/// let loc = RowLocator::from_index(0);
/// assert!(loc.is_valid());
/// assert_eq!(loc.index(), Some(0));
/// assert_eq!(RowLocator::NULL.index(), None);
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct RowLocator(u32);

impl RowLocator {
    /// The null locator.
    pub const NULL: Self = Self(0);

    /// Creates a locator from its raw encoding.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Creates a locator for the zero-based row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not fit in the locator encoding.
    #[inline]
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        let raw = u32::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .expect("row index exceeds locator range");
        Self(raw)
    }

    /// Creates a locator for a block-format source row.
    ///
    /// `line` is one-based, as line pointers are.
    ///
    /// # Panics
    ///
    /// Panics if the page or line is out of the block encoding range.
    #[inline]
    #[must_use]
    pub fn from_block(page: usize, line: usize) -> Self {
        assert!(page < MAX_BLOCKS_PER_SOURCE, "block page {page} out of range");
        assert!(
            (1..=MAX_LINES_PER_BLOCK).contains(&line),
            "block line {line} out of range"
        );
        Self(((page as u32) << BLOCK_LINE_BITS) | line as u32)
    }

    /// Returns the raw encoding.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns true unless this is the null locator.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns the zero-based row index, or `None` for the null locator.
    #[inline]
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some((self.0 - 1) as usize)
        }
    }

    /// Decodes a block-format locator into `(page, line)`.
    #[inline]
    #[must_use]
    pub const fn block_position(self) -> Option<(usize, usize)> {
        if self.0 == 0 {
            None
        } else {
            let line = self.0 & ((1 << BLOCK_LINE_BITS) - 1);
            Some(((self.0 >> BLOCK_LINE_BITS) as usize, line as usize))
        }
    }
}

impl fmt::Debug for RowLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(index) => write!(f, "RowLocator({})", index),
            None => write!(f, "RowLocator(NULL)"),
        }
    }
}

impl fmt::Display for RowLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RowLocator> for u32 {
    #[inline]
    fn from(loc: RowLocator) -> Self {
        loc.0
    }
}

/// Physical position of a block-format source row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemPointer {
    /// Block number of the page.
    pub block: u32,
    /// One-based line pointer within the page.
    pub line: u16,
}

impl fmt::Display for ItemPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.block, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_locator() {
        assert!(!RowLocator::NULL.is_valid());
        assert_eq!(RowLocator::default(), RowLocator::NULL);
        assert_eq!(format!("{:?}", RowLocator::NULL), "RowLocator(NULL)");
    }

    #[test]
    fn test_index_locator() {
        let loc = RowLocator::from_index(9);
        assert_eq!(loc.as_u32(), 10);
        assert_eq!(loc.index(), Some(9));
        assert_eq!(RowLocator::from_raw(loc.as_u32()), loc);
    }

    #[test]
    fn test_block_locator() {
        let loc = RowLocator::from_block(3, 1);
        assert!(loc.is_valid());
        assert_eq!(loc.block_position(), Some((3, 1)));

        let first = RowLocator::from_block(0, 1);
        assert_eq!(first.block_position(), Some((0, 1)));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_block_line_zero_rejected() {
        let _ = RowLocator::from_block(0, 0);
    }
}
