//! Benchmark utilities and helpers.

use lanejoin_common::types::Tuple;
use lanejoin_exec::program::EquiJoinProgram;
use lanejoin_exec::relation::{ChecksumTable, HashTable, HashTableBuilder, RowStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generates `count` rows of `(key, payload)` with keys drawn from
/// `0..key_range`.
pub fn generate_key_rows(count: usize, key_range: i64, seed: u64) -> Vec<Tuple> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| Tuple::ints([Some(rng.gen_range(0..key_range)), Some(i as i64)]))
        .collect()
}

/// Generates `count` rows with sequential keys `0..count`.
pub fn generate_sequential_rows(count: usize) -> Vec<Tuple> {
    (0..count as i64)
        .map(|i| Tuple::ints([Some(i), Some(i * 7)]))
        .collect()
}

/// Builds a row store from `rows`.
pub fn row_store(rows: Vec<Tuple>) -> RowStore {
    RowStore::from_rows(rows)
}

/// Builds a hash table over `rows` keyed the way `program` keys `depth`.
pub fn hash_table(program: &EquiJoinProgram, depth: usize, rows: Vec<Tuple>) -> HashTable {
    let checksum = ChecksumTable::crc32();
    let mut builder = HashTableBuilder::new(rows.len().next_power_of_two());
    for row in rows {
        if let Some(hash) = program.inner_hash(&checksum, depth, &row) {
            builder.insert(hash, row);
        }
    }
    builder.build()
}
