//! Hash-table inner relations.
//!
//! Items are stored in insertion order; the insertion index is the item's
//! row id. Each bucket heads a synonym chain whose items are linked in
//! ascending row id order.

use lanejoin_common::constants::CHAIN_END;
use lanejoin_common::types::Tuple;

/// One entry of a hash table.
#[derive(Debug, Clone, PartialEq)]
pub struct HashItem {
    /// Hash of the item's join key.
    pub hash: u32,
    /// Insertion index of the item.
    pub rowid: u32,
    /// Index of the next item in the same bucket, or `CHAIN_END`.
    next: u32,
    /// The inner row.
    pub tuple: Tuple,
}

impl HashItem {
    /// Returns the index of the next synonym, if any.
    #[inline]
    #[must_use]
    pub fn next(&self) -> Option<u32> {
        (self.next != CHAIN_END).then_some(self.next)
    }
}

/// Immutable chained hash table.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::types::Tuple;
/// use lanejoin_exec::relation::HashTableBuilder;
///
/// let mut builder = HashTableBuilder::new(4);
/// builder.insert(10, Tuple::ints([Some(1)]));
/// builder.insert(14, Tuple::ints([Some(2)]));
/// let table = builder.build();
///
/// // both hashes land in bucket 2
/// let head = table.bucket_head(10).unwrap();
/// assert_eq!(table.item(head).rowid, 0);
/// assert_eq!(table.item(head).next(), Some(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HashTable {
    buckets: Vec<u32>,
    items: Vec<HashItem>,
}

impl HashTable {
    /// Returns the number of buckets.
    #[inline]
    #[must_use]
    pub fn nslots(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the table holds no items.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the index of the first item in the bucket of `hash`.
    #[inline]
    #[must_use]
    pub fn bucket_head(&self, hash: u32) -> Option<u32> {
        let head = self.buckets[hash as usize % self.buckets.len()];
        (head != CHAIN_END).then_some(head)
    }

    /// Returns item `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    #[must_use]
    pub fn item(&self, index: u32) -> &HashItem {
        &self.items[index as usize]
    }

    /// Returns the row with id `rowid`.
    #[inline]
    #[must_use]
    pub fn get(&self, rowid: usize) -> Option<&Tuple> {
        self.items.get(rowid).map(|item| &item.tuple)
    }

    /// Returns all items in row id order.
    #[must_use]
    pub fn items(&self) -> &[HashItem] {
        &self.items
    }

    /// Returns an iterator over the synonym chain for `hash`.
    pub fn chain(&self, hash: u32) -> impl Iterator<Item = &HashItem> + '_ {
        let mut cursor = self.bucket_head(hash);
        std::iter::from_fn(move || {
            let item = self.item(cursor?);
            cursor = item.next();
            Some(item)
        })
    }
}

/// Builds a [`HashTable`].
#[derive(Debug)]
pub struct HashTableBuilder {
    nslots: usize,
    items: Vec<(u32, Tuple)>,
}

impl HashTableBuilder {
    /// Creates a builder for a table with `nslots` buckets (at least one).
    #[must_use]
    pub fn new(nslots: usize) -> Self {
        Self {
            nslots: nslots.max(1),
            items: Vec::new(),
        }
    }

    /// Adds an item and returns its row id.
    pub fn insert(&mut self, hash: u32, tuple: Tuple) -> u32 {
        let rowid = self.items.len() as u32;
        self.items.push((hash, tuple));
        rowid
    }

    /// Returns the number of items added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Links the chains and freezes the table.
    #[must_use]
    pub fn build(self) -> HashTable {
        let mut buckets = vec![CHAIN_END; self.nslots];
        let mut items: Vec<HashItem> = self
            .items
            .into_iter()
            .enumerate()
            .map(|(rowid, (hash, tuple))| HashItem {
                hash,
                rowid: rowid as u32,
                next: CHAIN_END,
                tuple,
            })
            .collect();

        // prepend in reverse so every chain runs in ascending row id order
        for index in (0..items.len()).rev() {
            let bucket = items[index].hash as usize % buckets.len();
            items[index].next = buckets[bucket];
            buckets[bucket] = index as u32;
        }

        HashTable { buckets, items }
    }
}
