use lanejoin_common::types::{Datum, Tuple};

use crate::fixtures::sort_tuples;

/// One inner relation of a reference join.
pub struct ReferenceRelation<'a> {
    /// Rows of the relation.
    pub rows: &'a [Tuple],
    /// Whether unmatched outer combinations are null-extended.
    pub left_outer: bool,
}

/// Joins `source` against `inners` the way
/// [`EquiJoinProgram::key_chain`](lanejoin_exec::program::EquiJoinProgram::key_chain)
/// describes: source column 0 equals inner column 0 at every depth, NULL
/// never matches, and the payload of every depth is projected.
pub fn chain_join(source: &[Tuple], inners: &[ReferenceRelation<'_>]) -> Vec<Tuple> {
    let mut partial: Vec<(Option<i64>, Vec<Datum>)> = source
        .iter()
        .map(|row| (key_of(row), vec![payload_of(Some(row))]))
        .collect();

    for inner in inners {
        let mut next = Vec::new();
        for (key, payloads) in partial {
            let mut matched = false;
            for row in inner.rows {
                if key.is_some() && key == key_of(row) {
                    matched = true;
                    let mut extended = payloads.clone();
                    extended.push(payload_of(Some(row)));
                    next.push((key, extended));
                }
            }
            if !matched && inner.left_outer {
                let mut extended = payloads;
                extended.push(payload_of(None));
                next.push((key, extended));
            }
        }
        partial = next;
    }

    sort_tuples(partial.into_iter().map(|(_, p)| Tuple::new(p)).collect())
}

/// Row ids of `inner` that no source row matches.
pub fn unmatched_inner(source: &[Tuple], inner: &[Tuple]) -> Vec<usize> {
    inner
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            let key = key_of(row);
            key.is_none() || !source.iter().any(|s| key_of(s) == key)
        })
        .map(|(rowid, _)| rowid)
        .collect()
}

fn key_of(row: &Tuple) -> Option<i64> {
    row.get(0).and_then(Datum::as_int)
}

fn payload_of(row: Option<&Tuple>) -> Datum {
    row.and_then(|r| r.get(1)).cloned().unwrap_or(Datum::Null)
}
