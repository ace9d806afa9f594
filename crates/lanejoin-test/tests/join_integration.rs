//! End-to-end join scenarios for lanejoin.
//!
//! Every scenario runs the executor on real threads and checks the
//! destination buffer against the brute-force reference join.

use lanejoin_common::config::JoinConfig;
use lanejoin_common::error::{EvalFault, FaultCode, JoinError};
use lanejoin_common::types::{Datum, Tuple};
use lanejoin_exec::control::JoinStatus;
use lanejoin_exec::program::{EquiJoinProgram, HashKey, JoinProgram, RowCombination};
use lanejoin_exec::relation::{
    BlockPage, BlockStore, ChecksumTable, JoinType, MultiRelationSet, RowStore, SourceBatch,
};
use lanejoin_test::fixtures::{
    executor, hash_table, int, keyed, keyed_rows, random_rows, row_source, run_join,
    sort_tuples, ROOMY_DEST,
};
use lanejoin_test::init_tracing;
use lanejoin_test::reference::{chain_join, ReferenceRelation};

/// Group geometries from a single serial lane up to several wide groups.
fn geometries() -> Vec<JoinConfig> {
    vec![
        JoinConfig::for_testing().with_lanes(1).with_pstack_nrooms(1),
        JoinConfig::for_testing().with_lanes(4).with_pstack_nrooms(4),
        JoinConfig::for_testing()
            .with_lanes(3)
            .with_groups(2)
            .with_pstack_nrooms(9),
        JoinConfig::for_testing()
            .with_lanes(8)
            .with_groups(3)
            .with_pstack_nrooms(64),
    ]
}

#[test]
fn test_two_relation_left_outer_chain() {
    init_tracing();

    let program = EquiJoinProgram::key_chain(2);
    let source = keyed_rows(&[Some(1), Some(2), Some(3), Some(4), Some(5)], 100);
    let a = keyed_rows(&[Some(1), Some(2), Some(3)], 200);
    let b = keyed_rows(&[Some(1), Some(2)], 300);

    let relations = MultiRelationSet::builder()
        .hash_join(hash_table(&program, 1, &a), JoinType::Left)
        .nest_loop(RowStore::from_rows(b), JoinType::Left)
        .build()
        .unwrap();
    let exec = executor(JoinConfig::for_testing(), relations, program);
    let out = run_join(&exec, &row_source(source), ROOMY_DEST);

    let summary = out.result.as_ref().unwrap();
    assert_eq!(summary.nitems, 5);
    assert_eq!(summary.inner_nitems, vec![5, 3, 2]);
    assert_eq!(summary.outer_nitems, vec![0, 2, 3]);

    let expected = sort_tuples(vec![
        Tuple::new(vec![int(100), int(200), int(300)]),
        Tuple::new(vec![int(101), int(201), int(301)]),
        Tuple::new(vec![int(102), int(202), Datum::Null]),
        Tuple::new(vec![int(103), Datum::Null, Datum::Null]),
        Tuple::new(vec![int(104), Datum::Null, Datum::Null]),
    ]);
    assert_eq!(out.sorted_tuples(), expected);

    assert_eq!(out.control.window(1).outer_nitems, 2);
    assert_eq!(out.control.window(2).inner_nitems, 2);
    assert!(out.control.status.is_success());
}

#[test]
fn test_nest_loop_and_hash_join_agree() {
    init_tracing();

    let source = random_rows(200, 40, 0, 42);
    let inner = random_rows(80, 40, 1000, 7);
    let expected = chain_join(
        &source,
        &[ReferenceRelation {
            rows: &inner,
            left_outer: false,
        }],
    );
    assert!(!expected.is_empty());

    for config in geometries() {
        let program = EquiJoinProgram::key_chain(1);
        let hashed = MultiRelationSet::builder()
            .hash_join(hash_table(&program, 1, &inner), JoinType::Inner)
            .build()
            .unwrap();
        let looped = MultiRelationSet::builder()
            .nest_loop(RowStore::from_rows(inner.clone()), JoinType::Inner)
            .build()
            .unwrap();

        let source = row_source(source.clone());
        let by_hash = run_join(&executor(config.clone(), hashed, program), &source, ROOMY_DEST);
        let by_loop = run_join(
            &executor(config.clone(), looped, EquiJoinProgram::key_chain(1)),
            &source,
            ROOMY_DEST,
        );

        assert_eq!(by_hash.sorted_tuples(), expected, "hash join, {config:?}");
        assert_eq!(by_loop.sorted_tuples(), expected, "nested loop, {config:?}");
    }
}

#[test]
fn test_three_way_mixed_strategies() {
    init_tracing();

    let source = random_rows(120, 20, 0, 42);
    let first = random_rows(40, 20, 1000, 11);
    let second = random_rows(30, 20, 2000, 13);
    let expected = chain_join(
        &source,
        &[
            ReferenceRelation {
                rows: &first,
                left_outer: true,
            },
            ReferenceRelation {
                rows: &second,
                left_outer: false,
            },
        ],
    );

    for config in geometries() {
        let program = EquiJoinProgram::key_chain(2);
        let relations = MultiRelationSet::builder()
            .nest_loop(RowStore::from_rows(first.clone()), JoinType::Left)
            .hash_join(hash_table(&program, 2, &second), JoinType::Inner)
            .build()
            .unwrap();
        let out = run_join(
            &executor(config.clone(), relations, program),
            &row_source(source.clone()),
            ROOMY_DEST,
        );
        assert_eq!(out.sorted_tuples(), expected, "{config:?}");
    }
}

#[test]
fn test_left_outer_keeps_every_source_row() {
    init_tracing();

    let source = random_rows(150, 200, 0, 42);
    let inner = random_rows(50, 200, 1000, 3);

    for join in [JoinKindUnderTest::Hash, JoinKindUnderTest::Loop] {
        let program = EquiJoinProgram::key_chain(1);
        let builder = MultiRelationSet::builder();
        let relations = match join {
            JoinKindUnderTest::Hash => {
                builder.hash_join(hash_table(&program, 1, &inner), JoinType::Left)
            }
            JoinKindUnderTest::Loop => {
                builder.nest_loop(RowStore::from_rows(inner.clone()), JoinType::Left)
            }
        }
        .build()
        .unwrap();

        let out = run_join(
            &executor(JoinConfig::for_testing(), relations, program),
            &row_source(source.clone()),
            ROOMY_DEST,
        );
        let tuples = out.sorted_tuples();
        for row in &source {
            let payload = row.get(1).unwrap();
            assert!(
                tuples.iter().any(|t| t.get(0) == Some(payload)),
                "{join:?}: source row {row} missing"
            );
        }

        let summary = out.result.unwrap();
        let nulls = tuples
            .iter()
            .filter(|t| t.get(1).is_some_and(Datum::is_null))
            .count() as u64;
        assert_eq!(summary.outer_nitems[1], nulls);
        assert_eq!(summary.inner_nitems[1] + nulls, tuples.len() as u64);
    }
}

#[derive(Debug, Clone, Copy)]
enum JoinKindUnderTest {
    Hash,
    Loop,
}

#[test]
fn test_prefilter_counts_rejected_rows() {
    init_tracing();

    let source = random_rows(90, 10, 0, 42);
    let inner = keyed_rows(&(0..10).map(Some).collect::<Vec<_>>(), 500);
    let survivors: Vec<Tuple> = source
        .iter()
        .filter(|row| row.get(1).and_then(Datum::as_int).unwrap_or(0) % 3 != 0)
        .cloned()
        .collect();
    let expected = chain_join(
        &survivors,
        &[ReferenceRelation {
            rows: &inner,
            left_outer: true,
        }],
    );

    let program = EquiJoinProgram::key_chain(1)
        .with_filter(|row| Ok(row.get(1).and_then(Datum::as_int).unwrap_or(0) % 3 != 0));
    let relations = MultiRelationSet::builder()
        .nest_loop(RowStore::from_rows(inner), JoinType::Left)
        .build()
        .unwrap();
    let out = run_join(
        &executor(JoinConfig::for_testing(), relations, program),
        &row_source(source.clone()),
        ROOMY_DEST,
    );

    let rejected = (source.len() - survivors.len()) as u64;
    assert_eq!(out.result.as_ref().unwrap().nitems_filtered, rejected);
    assert_eq!(out.control.nitems_filtered, rejected);
    assert_eq!(out.control.window(0).inner_nitems, survivors.len() as u64);
    assert_eq!(out.sorted_tuples(), expected);
}

#[test]
fn test_block_source_walks_pages() {
    init_tracing();

    let mut store = BlockStore::new();
    let mut live = Vec::new();
    let mut payload = 0;
    for (block, nlines) in [5usize, 0, 3, 7, 1, 4].into_iter().enumerate() {
        let mut page = BlockPage::new(block as u32);
        for line in 0..nlines {
            if line % 3 == 1 {
                page.push(None);
            } else {
                let row = keyed(Some(payload % 6), payload);
                live.push(row.clone());
                page.push(Some(row));
            }
            payload += 1;
        }
        store.push_page(page);
    }
    let source = SourceBatch::Block(store);
    let inner = keyed_rows(&(0..4).map(Some).collect::<Vec<_>>(), 900);
    let expected = chain_join(
        &live,
        &[ReferenceRelation {
            rows: &inner,
            left_outer: true,
        }],
    );

    for part_sz in [1, 2, 4] {
        let config = JoinConfig::for_testing().with_block_partition_size(part_sz);
        let relations = MultiRelationSet::builder()
            .nest_loop(RowStore::from_rows(inner.clone()), JoinType::Left)
            .build()
            .unwrap();
        let exec = executor(config, relations, EquiJoinProgram::key_chain(1));
        let out = run_join(&exec, &source, ROOMY_DEST);

        assert_eq!(out.sorted_tuples(), expected, "part_sz {part_sz}");
        assert_eq!(out.control.src_read_pos, 6);
        assert_eq!(out.control.window(0).inner_nitems, live.len() as u64);
    }
}

#[test]
fn test_many_groups_share_the_source() {
    init_tracing();

    let source = random_rows(300, 30, 0, 42);
    let inner = random_rows(60, 30, 1000, 5);
    let expected = chain_join(
        &source,
        &[ReferenceRelation {
            rows: &inner,
            left_outer: true,
        }],
    );

    let program = EquiJoinProgram::key_chain(1);
    let relations = MultiRelationSet::builder()
        .hash_join(hash_table(&program, 1, &inner), JoinType::Left)
        .build()
        .unwrap();
    let config = JoinConfig::for_testing()
        .with_lanes(2)
        .with_groups(4)
        .with_pstack_nrooms(8);
    let out = run_join(&executor(config, relations, program), &row_source(source), ROOMY_DEST);

    let summary = out.result.as_ref().unwrap();
    assert_eq!(summary.inner_nitems[0], 300);
    assert_eq!(out.sorted_tuples(), expected);
}

/// Delegates to an equi-join program and fails on one payload.
struct FaultyProgram {
    inner: EquiJoinProgram,
    poison: i64,
    at_projection: bool,
}

impl FaultyProgram {
    fn poisoned(&self, combination: &RowCombination<'_>) -> bool {
        combination.value(0, 1) == &Datum::Int(self.poison)
    }
}

impl JoinProgram for FaultyProgram {
    fn join_quals(
        &self,
        depth: usize,
        outer: &RowCombination<'_>,
        inner: &Tuple,
    ) -> Result<bool, EvalFault> {
        self.inner.join_quals(depth, outer, inner)
    }

    fn hash_value(
        &self,
        table: &ChecksumTable,
        depth: usize,
        outer: &RowCombination<'_>,
    ) -> Result<HashKey, EvalFault> {
        if !self.at_projection && self.poisoned(outer) {
            return Err(EvalFault::new(FaultCode::NumericOverflow, "key overflow"));
        }
        self.inner.hash_value(table, depth, outer)
    }

    fn project(&self, combination: &RowCombination<'_>) -> Result<Tuple, EvalFault> {
        if self.at_projection && self.poisoned(combination) {
            return Err(EvalFault::new(FaultCode::DivisionByZero, "division by zero"));
        }
        JoinProgram::project(&self.inner, combination)
    }
}

#[test]
fn test_evaluation_fault_aborts_run() {
    init_tracing();

    let source = keyed_rows(&(0..40).map(|i| Some(i % 5)).collect::<Vec<_>>(), 0);
    let inner = keyed_rows(&(0..5).map(Some).collect::<Vec<_>>(), 100);

    for (at_projection, depth, code) in [
        (false, 1, FaultCode::NumericOverflow),
        (true, 2, FaultCode::DivisionByZero),
    ] {
        let base = EquiJoinProgram::key_chain(1);
        let table = hash_table(&base, 1, &inner);
        let relations = MultiRelationSet::builder()
            .hash_join(table, JoinType::Inner)
            .build()
            .unwrap();
        let program = FaultyProgram {
            inner: base,
            poison: 17,
            at_projection,
        };
        let exec = lanejoin_exec::executor::JoinExecutor::new(
            JoinConfig::for_testing().with_groups(2),
            std::sync::Arc::new(relations),
            std::sync::Arc::new(program),
        );
        let out = run_join(&exec, &row_source(source.clone()), ROOMY_DEST);

        match out.result {
            Err(JoinError::Evaluation {
                depth: d, code: c, ..
            }) => {
                assert_eq!(d, depth);
                assert_eq!(c, code);
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
        assert!(matches!(
            out.control.status,
            JoinStatus::EvalError { depth: d, code: c, .. } if d == depth && c == code
        ));
        assert!(out.dest.nitems() < 40);
        assert_eq!(out.control.window(0).inner_nitems, 0);
    }
}
