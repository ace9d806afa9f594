//! Right and full outer join bookkeeping across devices.

use std::sync::Arc;

use lanejoin_common::config::JoinConfig;
use lanejoin_exec::executor::JoinExecutor;
use lanejoin_exec::program::EquiJoinProgram;
use lanejoin_exec::relation::{JoinType, MultiRelationSet, RowStore};
use lanejoin_test::fixtures::{
    hash_table, keyed_rows, random_rows, row_source, run_join, ROOMY_DEST,
};
use lanejoin_test::init_tracing;
use lanejoin_test::reference::{chain_join, unmatched_inner, ReferenceRelation};

fn inner_keys() -> Vec<Option<i64>> {
    (0..64).map(|i| Some(i * 3 % 97)).collect()
}

#[test]
fn test_right_outer_maps_merge_across_devices() {
    init_tracing();

    let source = random_rows(200, 97, 0, 42);
    let inner = keyed_rows(&inner_keys(), 1000);
    let (first, second) = source.split_at(120);

    let relations = Arc::new(
        MultiRelationSet::builder()
            .nest_loop(RowStore::from_rows(inner.clone()), JoinType::Right)
            .num_devices(2)
            .build()
            .unwrap(),
    );
    let program = Arc::new(EquiJoinProgram::key_chain(1));
    let config = JoinConfig::for_testing().with_devices(2);

    for (device, part) in [(0, first), (1, second)] {
        let exec = JoinExecutor::new(config.clone(), Arc::clone(&relations), program.clone())
            .on_device(device);
        let out = run_join(&exec, &row_source(part.to_vec()), ROOMY_DEST);
        let expected = chain_join(
            part,
            &[ReferenceRelation {
                rows: &inner,
                left_outer: false,
            }],
        );
        assert_eq!(out.sorted_tuples(), expected, "device {device}");
    }

    let maps = relations.outer_join_maps();
    assert_eq!(maps.unmatched_rows(1, 0), unmatched_inner(first, &inner));
    assert_eq!(maps.unmatched_rows(1, 1), unmatched_inner(second, &inner));

    relations.merge_outer_join_maps(0);
    assert_eq!(maps.unmatched_rows(1, 0), unmatched_inner(&source, &inner));
}

#[test]
fn test_full_outer_hash_join() {
    init_tracing();

    let source = random_rows(150, 97, 0, 7);
    let inner = keyed_rows(&inner_keys(), 1000);
    let program = EquiJoinProgram::key_chain(1);
    let relations = MultiRelationSet::builder()
        .hash_join(hash_table(&program, 1, &inner), JoinType::Full)
        .build()
        .unwrap();
    let relations = Arc::new(relations);
    let exec = JoinExecutor::new(
        JoinConfig::for_testing().with_groups(2),
        Arc::clone(&relations),
        Arc::new(program),
    );

    let out = run_join(&exec, &row_source(source.clone()), ROOMY_DEST);
    let expected = chain_join(
        &source,
        &[ReferenceRelation {
            rows: &inner,
            left_outer: true,
        }],
    );
    assert_eq!(out.sorted_tuples(), expected);

    relations.merge_outer_join_maps(0);
    let unmatched = relations.outer_join_maps().unmatched_rows(1, 0);
    assert_eq!(unmatched, unmatched_inner(&source, &inner));

    relations.outer_join_maps().reset();
    assert_eq!(relations.outer_join_maps().unmatched_rows(1, 0).len(), inner.len());
}

#[test]
fn test_inner_join_is_not_tracked() {
    let inner = keyed_rows(&inner_keys(), 1000);
    let relations = MultiRelationSet::builder()
        .nest_loop(RowStore::from_rows(inner), JoinType::Left)
        .build()
        .unwrap();
    assert!(!relations.has_right_outer());
    assert!(!relations.outer_join_maps().is_tracked(1));
    assert!(relations.outer_join_maps().unmatched_rows(1, 0).is_empty());
}
