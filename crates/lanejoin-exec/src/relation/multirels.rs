//! The set of inner relations joined against one source.

use lanejoin_common::constants::MAX_JOIN_DEPTH;
use lanejoin_common::error::{JoinError, JoinResult};
use lanejoin_common::types::Tuple;

use super::checksum::ChecksumTable;
use super::hash_table::HashTable;
use super::ojmap::OuterJoinMaps;
use super::row_store::RowStore;

/// SQL join type of one inner relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// Inner join.
    Inner,
    /// Left outer join: unmatched outer rows are kept.
    Left,
    /// Right outer join: unmatched inner rows are kept.
    Right,
    /// Full outer join.
    Full,
}

impl JoinType {
    /// Returns true if unmatched outer combinations produce a result.
    #[inline]
    #[must_use]
    pub const fn left_outer(self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }

    /// Returns true if unmatched inner rows produce a result.
    #[inline]
    #[must_use]
    pub const fn right_outer(self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }
}

/// How one depth is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Scan every inner row of the window.
    NestLoop,
    /// Probe a hash table and walk its synonym chain.
    Hash,
}

/// Physical layout of an inner relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Dense row array.
    RowStore,
    /// Chained hash table.
    HashTable,
}

/// Inner relation data.
#[derive(Debug, Clone, PartialEq)]
pub enum InnerRelation {
    /// Nested-loop relation.
    Rows(RowStore),
    /// Hash-join relation.
    Hash(HashTable),
}

impl InnerRelation {
    /// Returns the number of rows.
    #[must_use]
    pub fn nitems(&self) -> usize {
        match self {
            Self::Rows(store) => store.len(),
            Self::Hash(table) => table.len(),
        }
    }

    /// Returns the row with id `rowid`.
    #[inline]
    #[must_use]
    pub fn get(&self, rowid: usize) -> Option<&Tuple> {
        match self {
            Self::Rows(store) => store.get(rowid),
            Self::Hash(table) => table.get(rowid),
        }
    }

    /// Returns the storage kind.
    #[must_use]
    pub fn storage(&self) -> StorageKind {
        match self {
            Self::Rows(_) => StorageKind::RowStore,
            Self::Hash(_) => StorageKind::HashTable,
        }
    }

    /// Returns the hash table of a hash-join relation.
    #[must_use]
    pub fn as_hash_table(&self) -> Option<&HashTable> {
        match self {
            Self::Hash(table) => Some(table),
            Self::Rows(_) => None,
        }
    }
}

/// Immutable description of one inner relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    /// Depth of the relation (1-based).
    pub depth: usize,
    /// Physical layout.
    pub storage: StorageKind,
    /// Evaluation strategy.
    pub join_kind: JoinKind,
    /// SQL join type.
    pub join_type: JoinType,
    /// Unmatched outer combinations produce a result.
    pub left_outer: bool,
    /// Unmatched inner rows produce a result.
    pub right_outer: bool,
    /// Position of the relation's data in the set.
    pub chunk_index: usize,
    /// Position of the relation's outer-join map; only for right-outer.
    pub ojmap_index: Option<usize>,
    /// Number of rows.
    pub nitems: usize,
}

/// N inner relations, their descriptors, the outer-join maps and the
/// shared checksum table.
///
/// Relation data is read-only once built; only the outer-join maps
/// change, and only through atomic operations.
///
/// # Example
///
/// ```rust
/// use lanejoin_common::types::Tuple;
/// use lanejoin_exec::relation::{JoinType, MultiRelationSet, RowStore};
///
/// let store: RowStore = (0..4).map(|i| Tuple::ints([Some(i)])).collect();
/// let rels = MultiRelationSet::builder()
///     .nest_loop(store, JoinType::Right)
///     .num_devices(2)
///     .build()
///     .unwrap();
///
/// assert_eq!(rels.num_rels(), 1);
/// assert!(rels.descriptor(1).right_outer);
/// assert!(rels.outer_join_maps().is_tracked(1));
/// ```
#[derive(Debug)]
pub struct MultiRelationSet {
    chunks: Vec<InnerRelation>,
    descriptors: Vec<RelationDescriptor>,
    checksum: ChecksumTable,
    ojmaps: OuterJoinMaps,
    num_devices: usize,
}

impl MultiRelationSet {
    /// Starts building a relation set.
    #[must_use]
    pub fn builder() -> MultiRelationSetBuilder {
        MultiRelationSetBuilder::default()
    }

    /// Returns N, the number of inner relations.
    #[inline]
    #[must_use]
    pub fn num_rels(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns the descriptor of `depth` (1..=N).
    ///
    /// # Panics
    ///
    /// Panics if `depth` is not an inner depth.
    #[inline]
    #[must_use]
    pub fn descriptor(&self, depth: usize) -> &RelationDescriptor {
        assert!(
            (1..=self.num_rels()).contains(&depth),
            "depth {depth} is not an inner relation"
        );
        &self.descriptors[depth - 1]
    }

    /// Returns every descriptor in depth order.
    #[must_use]
    pub fn descriptors(&self) -> &[RelationDescriptor] {
        &self.descriptors
    }

    /// Returns the data of `depth` (1..=N).
    #[inline]
    #[must_use]
    pub fn relation(&self, depth: usize) -> &InnerRelation {
        &self.chunks[self.descriptor(depth).chunk_index]
    }

    /// Returns the shared checksum table.
    #[must_use]
    pub fn checksum_table(&self) -> &ChecksumTable {
        &self.checksum
    }

    /// Returns the outer-join maps.
    #[must_use]
    pub fn outer_join_maps(&self) -> &OuterJoinMaps {
        &self.ojmaps
    }

    /// Returns the number of devices sharing this set.
    #[must_use]
    pub fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Returns true if any relation is right or full outer joined.
    #[must_use]
    pub fn has_right_outer(&self) -> bool {
        self.descriptors.iter().any(|d| d.right_outer)
    }

    /// Runs the outer-join map reducer for `device`.
    pub fn merge_outer_join_maps(&self, device: usize) {
        self.ojmaps.merge(device);
    }
}

/// Builder for [`MultiRelationSet`].
#[derive(Debug)]
pub struct MultiRelationSetBuilder {
    relations: Vec<(InnerRelation, JoinKind, JoinType)>,
    checksum: Option<ChecksumTable>,
    num_devices: usize,
}

impl Default for MultiRelationSetBuilder {
    fn default() -> Self {
        Self {
            relations: Vec::new(),
            checksum: None,
            num_devices: 1,
        }
    }
}

impl MultiRelationSetBuilder {
    /// Adds a nested-loop relation at the next depth.
    #[must_use]
    pub fn nest_loop(mut self, store: RowStore, join_type: JoinType) -> Self {
        self.relations
            .push((InnerRelation::Rows(store), JoinKind::NestLoop, join_type));
        self
    }

    /// Adds a hash-join relation at the next depth.
    #[must_use]
    pub fn hash_join(mut self, table: HashTable, join_type: JoinType) -> Self {
        self.relations
            .push((InnerRelation::Hash(table), JoinKind::Hash, join_type));
        self
    }

    /// Sets the number of devices (outer-join map slots).
    #[must_use]
    pub fn num_devices(mut self, devices: usize) -> Self {
        self.num_devices = devices;
        self
    }

    /// Uses `table` instead of the default CRC-32 table.
    #[must_use]
    pub fn checksum_table(mut self, table: ChecksumTable) -> Self {
        self.checksum = Some(table);
        self
    }

    /// Validates and freezes the set.
    pub fn build(self) -> JoinResult<MultiRelationSet> {
        if self.relations.len() > MAX_JOIN_DEPTH {
            return Err(JoinError::DepthLimit {
                depth: self.relations.len(),
                max: MAX_JOIN_DEPTH,
            });
        }
        if self.num_devices == 0 {
            return Err(JoinError::invalid_config("num_devices must be positive"));
        }

        let mut chunks = Vec::with_capacity(self.relations.len());
        let mut descriptors = Vec::with_capacity(self.relations.len());
        let mut ojmap_count = 0;

        for (index, (relation, join_kind, join_type)) in self.relations.into_iter().enumerate() {
            let depth = index + 1;
            let nitems = relation.nitems();
            // row ids travel as locators (rowid + 1)
            if u32::try_from(nitems).map_or(true, |n| n == u32::MAX) {
                return Err(JoinError::invalid_relation(
                    depth,
                    format!("{nitems} rows exceed the locator range"),
                ));
            }

            let ojmap_index = join_type.right_outer().then(|| {
                ojmap_count += 1;
                ojmap_count - 1
            });
            descriptors.push(RelationDescriptor {
                depth,
                storage: relation.storage(),
                join_kind,
                join_type,
                left_outer: join_type.left_outer(),
                right_outer: join_type.right_outer(),
                chunk_index: index,
                ojmap_index,
                nitems,
            });
            chunks.push(relation);
        }

        let ojmaps = OuterJoinMaps::new(
            descriptors.iter().map(|d| (d.nitems, d.right_outer)),
            self.num_devices,
        );

        Ok(MultiRelationSet {
            chunks,
            descriptors,
            checksum: self.checksum.unwrap_or_default(),
            ojmaps,
            num_devices: self.num_devices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::HashTableBuilder;

    fn rows(n: i64) -> RowStore {
        (0..n).map(|i| Tuple::ints([Some(i)])).collect()
    }

    #[test]
    fn test_join_type_flags() {
        assert!(!JoinType::Inner.left_outer());
        assert!(JoinType::Left.left_outer());
        assert!(!JoinType::Left.right_outer());
        assert!(JoinType::Right.right_outer());
        assert!(JoinType::Full.left_outer() && JoinType::Full.right_outer());
    }

    #[test]
    fn test_descriptors() {
        let mut builder = HashTableBuilder::new(4);
        builder.insert(1, Tuple::ints([Some(1)]));
        let rels = MultiRelationSet::builder()
            .hash_join(builder.build(), JoinType::Left)
            .nest_loop(rows(3), JoinType::Full)
            .build()
            .unwrap();

        assert_eq!(rels.num_rels(), 2);
        let first = rels.descriptor(1);
        assert_eq!(first.join_kind, JoinKind::Hash);
        assert_eq!(first.storage, StorageKind::HashTable);
        assert!(first.left_outer);
        assert_eq!(first.ojmap_index, None);

        let second = rels.descriptor(2);
        assert_eq!(second.join_kind, JoinKind::NestLoop);
        assert_eq!(second.ojmap_index, Some(0));
        assert_eq!(second.nitems, 3);
        assert_eq!(rels.relation(2).nitems(), 3);
        assert!(rels.has_right_outer());
    }

    #[test]
    fn test_depth_limit() {
        let mut builder = MultiRelationSet::builder();
        for _ in 0..=MAX_JOIN_DEPTH {
            builder = builder.nest_loop(rows(1), JoinType::Inner);
        }
        let err = builder.build().unwrap_err();
        assert!(matches!(err, JoinError::DepthLimit { .. }));
    }

    #[test]
    fn test_zero_devices_rejected() {
        let err = MultiRelationSet::builder()
            .nest_loop(rows(1), JoinType::Inner)
            .num_devices(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, JoinError::InvalidConfig { .. }));
    }

    #[test]
    #[should_panic(expected = "not an inner relation")]
    fn test_depth_zero_is_not_a_relation() {
        let rels = MultiRelationSet::builder()
            .nest_loop(rows(1), JoinType::Inner)
            .build()
            .unwrap();
        let _ = rels.descriptor(0);
    }
}
