//! Row-store and block-store relations.
//!
//! A [`RowStore`] is a dense array of tuples addressed by row id. It backs
//! nested-loop inner relations and row-format sources. A [`BlockStore`] is
//! a list of pages with line pointers, fetched cooperatively by the lanes
//! of a group.

use lanejoin_common::constants::{MAX_BLOCKS_PER_SOURCE, MAX_LINES_PER_BLOCK};
use lanejoin_common::types::{ItemPointer, RowLocator, Tuple};

/// Dense, immutable array of rows.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::types::Tuple;
/// use lanejoin_exec::relation::RowStore;
///
/// let store: RowStore = (0..3).map(|i| Tuple::ints([Some(i)])).collect();
/// assert_eq!(store.len(), 3);
/// assert!(store.get(2).is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowStore {
    rows: Vec<Tuple>,
}

impl RowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from rows; row ids follow the vector order.
    #[must_use]
    pub fn from_rows(rows: Vec<Tuple>) -> Self {
        Self { rows }
    }

    /// Appends a row and returns its row id.
    pub fn push(&mut self, row: Tuple) -> usize {
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Returns the number of rows.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the store holds no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row with id `rowid`.
    #[inline]
    #[must_use]
    pub fn get(&self, rowid: usize) -> Option<&Tuple> {
        self.rows.get(rowid)
    }

    /// Returns all rows.
    #[must_use]
    pub fn rows(&self) -> &[Tuple] {
        &self.rows
    }
}

impl FromIterator<Tuple> for RowStore {
    fn from_iter<I: IntoIterator<Item = Tuple>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// One page of a block-format relation.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPage {
    block: u32,
    lines: Vec<Option<Tuple>>,
}

impl BlockPage {
    /// Creates an empty page for block number `block`.
    #[must_use]
    pub fn new(block: u32) -> Self {
        Self {
            block,
            lines: Vec::new(),
        }
    }

    /// Appends a line pointer; `None` is a dead or unused line.
    ///
    /// # Panics
    ///
    /// Panics if the page already holds the maximum number of lines.
    pub fn push(&mut self, line: Option<Tuple>) {
        assert!(self.lines.len() < MAX_LINES_PER_BLOCK, "block page is full");
        self.lines.push(line);
    }

    /// Builder-style variant of [`BlockPage::push`].
    #[must_use]
    pub fn with_line(mut self, line: Option<Tuple>) -> Self {
        self.push(line);
        self
    }

    /// Returns the block number.
    #[must_use]
    pub fn block(&self) -> u32 {
        self.block
    }

    /// Returns the number of line pointers.
    #[inline]
    #[must_use]
    pub fn nlines(&self) -> usize {
        self.lines.len()
    }

    /// Returns the live tuple at one-based `line`.
    #[inline]
    #[must_use]
    pub fn line(&self, line: usize) -> Option<&Tuple> {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .and_then(Option::as_ref)
    }

    /// Returns the number of live lines.
    #[must_use]
    pub fn live_lines(&self) -> usize {
        self.lines.iter().filter(|l| l.is_some()).count()
    }
}

/// Block-format relation: an ordered list of pages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockStore {
    pages: Vec<BlockPage>,
}

impl BlockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lays `rows` out on pages of `lines_per_page` lines, numbering blocks
    /// from zero.
    ///
    /// # Panics
    ///
    /// Panics if `lines_per_page` is zero or above the line limit.
    #[must_use]
    pub fn from_rows(rows: Vec<Tuple>, lines_per_page: usize) -> Self {
        assert!(
            (1..=MAX_LINES_PER_BLOCK).contains(&lines_per_page),
            "lines_per_page out of range"
        );
        let mut store = Self::new();
        let mut page = BlockPage::new(0);
        for row in rows {
            if page.nlines() == lines_per_page {
                let next = BlockPage::new(page.block() + 1);
                store.push_page(std::mem::replace(&mut page, next));
            }
            page.push(Some(row));
        }
        if page.nlines() > 0 {
            store.push_page(page);
        }
        store
    }

    /// Appends a page.
    ///
    /// # Panics
    ///
    /// Panics if the store already holds the maximum number of pages.
    pub fn push_page(&mut self, page: BlockPage) {
        assert!(self.pages.len() < MAX_BLOCKS_PER_SOURCE, "block store is full");
        self.pages.push(page);
    }

    /// Returns the number of pages.
    #[inline]
    #[must_use]
    pub fn npages(&self) -> usize {
        self.pages.len()
    }

    /// Returns page `index`.
    #[inline]
    #[must_use]
    pub fn page(&self, index: usize) -> Option<&BlockPage> {
        self.pages.get(index)
    }

    /// Returns all pages.
    #[must_use]
    pub fn pages(&self) -> &[BlockPage] {
        &self.pages
    }

    /// Returns the number of live rows across all pages.
    #[must_use]
    pub fn live_rows(&self) -> usize {
        self.pages.iter().map(BlockPage::live_lines).sum()
    }
}

/// Outer (driving) relation of a join.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBatch {
    /// Row-format source; the cursor counts rows.
    Row(RowStore),
    /// Block-format source; the cursor counts pages.
    Block(BlockStore),
}

impl SourceBatch {
    /// Returns the number of cursor units: rows or pages.
    #[must_use]
    pub fn nitems(&self) -> usize {
        match self {
            Self::Row(store) => store.len(),
            Self::Block(store) => store.npages(),
        }
    }

    /// Returns true for a block-format source.
    #[must_use]
    pub fn is_block(&self) -> bool {
        matches!(self, Self::Block(_))
    }

    /// Resolves a source locator to its tuple.
    #[must_use]
    pub fn resolve(&self, locator: RowLocator) -> Option<&Tuple> {
        match self {
            Self::Row(store) => store.get(locator.index()?),
            Self::Block(store) => {
                let (page, line) = locator.block_position()?;
                store.page(page)?.line(line)
            }
        }
    }

    /// Returns the physical position of a block-format locator.
    #[must_use]
    pub fn item_pointer(&self, locator: RowLocator) -> Option<ItemPointer> {
        match self {
            Self::Row(_) => None,
            Self::Block(store) => {
                let (page, line) = locator.block_position()?;
                Some(ItemPointer {
                    block: store.page(page)?.block(),
                    line: line as u16,
                })
            }
        }
    }
}

impl From<RowStore> for SourceBatch {
    fn from(store: RowStore) -> Self {
        Self::Row(store)
    }
}

impl From<BlockStore> for SourceBatch {
    fn from(store: BlockStore) -> Self {
        Self::Block(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_store() {
        let mut store = RowStore::new();
        assert!(store.is_empty());
        assert_eq!(store.push(Tuple::ints([Some(1)])), 0);
        assert_eq!(store.push(Tuple::ints([None])), 1);
        assert_eq!(store.len(), 2);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_block_page_lines_are_one_based() {
        let page = BlockPage::new(9)
            .with_line(Some(Tuple::ints([Some(1)])))
            .with_line(None)
            .with_line(Some(Tuple::ints([Some(3)])));

        assert!(page.line(0).is_none());
        assert!(page.line(1).is_some());
        assert!(page.line(2).is_none());
        assert!(page.line(3).is_some());
        assert_eq!(page.nlines(), 3);
        assert_eq!(page.live_lines(), 2);
    }

    #[test]
    fn test_block_store_from_rows() {
        let rows = (0..7).map(|i| Tuple::ints([Some(i)])).collect();
        let store = BlockStore::from_rows(rows, 3);
        assert_eq!(store.npages(), 3);
        assert_eq!(store.live_rows(), 7);
        assert_eq!(store.page(2).map(BlockPage::nlines), Some(1));
        assert_eq!(store.page(2).map(BlockPage::block), Some(2));
    }

    #[test]
    fn test_source_resolve() {
        let rows: Vec<Tuple> = (0..4).map(|i| Tuple::ints([Some(i)])).collect();
        let row_src = SourceBatch::from(RowStore::from_rows(rows.clone()));
        assert_eq!(row_src.nitems(), 4);
        assert_eq!(row_src.resolve(RowLocator::from_index(3)), Some(&rows[3]));
        assert_eq!(row_src.resolve(RowLocator::NULL), None);

        let block_src = SourceBatch::from(BlockStore::from_rows(rows.clone(), 2));
        assert!(block_src.is_block());
        assert_eq!(block_src.nitems(), 2);
        let loc = RowLocator::from_block(1, 2);
        assert_eq!(block_src.resolve(loc), Some(&rows[3]));
        assert_eq!(
            block_src.item_pointer(loc),
            Some(ItemPointer { block: 1, line: 2 })
        );
    }
}
