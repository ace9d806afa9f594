//! Relations taking part in a join.
//!
//! - [`SourceBatch`]: the outer (driving) relation, row or block format
//! - [`MultiRelationSet`]: the inner relations with their descriptors
//! - [`ChecksumTable`]: the table behind every join-key hash
//! - [`OuterJoinMaps`]: per-device match bitmaps for right/full outer joins

mod checksum;
mod hash_table;
mod multirels;
mod ojmap;
mod row_store;

pub use checksum::ChecksumTable;
pub use hash_table::{HashItem, HashTable, HashTableBuilder};
pub use multirels::{
    InnerRelation, JoinKind, JoinType, MultiRelationSet, MultiRelationSetBuilder,
    RelationDescriptor, StorageKind,
};
pub use ojmap::{AtomicBitmap, OuterJoinMaps};
pub use row_store::{BlockPage, BlockStore, RowStore, SourceBatch};
