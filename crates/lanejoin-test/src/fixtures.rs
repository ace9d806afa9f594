use std::sync::Arc;

use lanejoin_common::config::JoinConfig;
use lanejoin_common::error::JoinResult;
use lanejoin_common::types::{Datum, Tuple};
use lanejoin_exec::control::JoinControlBlock;
use lanejoin_exec::destination::DestinationBuffer;
use lanejoin_exec::executor::{JoinExecutor, JoinSummary};
use lanejoin_exec::program::EquiJoinProgram;
use lanejoin_exec::relation::{ChecksumTable, HashTable, HashTableBuilder, RowStore, SourceBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Destination length used when a scenario does not care about space.
pub const ROOMY_DEST: usize = 4 * 1024 * 1024;

/// A `(key, payload)` row; `None` keys are NULL.
pub fn keyed(key: Option<i64>, payload: i64) -> Tuple {
    Tuple::ints([key, Some(payload)])
}

/// Rows `(key, payload)` for every key in `keys`; payloads are
/// `base + position`.
pub fn keyed_rows(keys: &[Option<i64>], base: i64) -> Vec<Tuple> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| keyed(*key, base + i as i64))
        .collect()
}

/// `count` rows with keys drawn from `0..key_range` and a tenth of them NULL.
pub fn random_rows(count: usize, key_range: i64, base: i64, seed: u64) -> Vec<Tuple> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let key = if rng.gen_ratio(1, 10) {
                None
            } else {
                Some(rng.gen_range(0..key_range))
            };
            keyed(key, base + i as i64)
        })
        .collect()
}

/// Builds a hash table over `rows` keyed the way `program` keys `depth`.
/// Rows with a NULL key are left out.
pub fn hash_table(program: &EquiJoinProgram, depth: usize, rows: &[Tuple]) -> HashTable {
    let checksum = ChecksumTable::crc32();
    let mut builder = HashTableBuilder::new(rows.len().max(1));
    for row in rows {
        if let Some(hash) = program.inner_hash(&checksum, depth, row) {
            builder.insert(hash, row.clone());
        }
    }
    builder.build()
}

/// Wraps rows as a row-format source.
pub fn row_source(rows: Vec<Tuple>) -> SourceBatch {
    SourceBatch::Row(RowStore::from_rows(rows))
}

/// Output of one invocation.
pub struct RunOutput {
    /// Result of `execute`.
    pub result: JoinResult<JoinSummary>,
    /// Control block after the run.
    pub control: JoinControlBlock,
    /// Destination after the run.
    pub dest: DestinationBuffer,
}

impl RunOutput {
    /// Destination tuples in canonical order.
    pub fn sorted_tuples(&self) -> Vec<Tuple> {
        sort_tuples(self.dest.tuples().expect("destination tuples decode"))
    }
}

/// Runs `executor` once over `source` with a fresh control block and a
/// destination of `dest_len` bytes.
pub fn run_join(executor: &JoinExecutor, source: &SourceBatch, dest_len: usize) -> RunOutput {
    let control = executor.control_block(source).expect("control block");
    run_with_control(executor, source, control, dest_len)
}

/// Runs `executor` once with the given control block.
pub fn run_with_control(
    executor: &JoinExecutor,
    source: &SourceBatch,
    mut control: JoinControlBlock,
    dest_len: usize,
) -> RunOutput {
    let dest = DestinationBuffer::new(dest_len).expect("destination");
    let result = executor.execute(&mut control, source, &dest);
    RunOutput {
        result,
        control,
        dest,
    }
}

/// Builds an executor from owned parts.
pub fn executor(
    config: JoinConfig,
    relations: lanejoin_exec::relation::MultiRelationSet,
    program: EquiJoinProgram,
) -> JoinExecutor {
    JoinExecutor::new(config, Arc::new(relations), Arc::new(program))
}

/// Sorts tuples by their rendering so multisets compare equal.
pub fn sort_tuples(mut tuples: Vec<Tuple>) -> Vec<Tuple> {
    tuples.sort_by_cached_key(ToString::to_string);
    tuples
}

/// Shorthand for an integer datum.
pub fn int(value: i64) -> Datum {
    Datum::from(value)
}
