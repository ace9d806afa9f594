//! Per-query collaborator callbacks.
//!
//! A [`JoinProgram`] supplies everything plan-specific the join core needs:
//! the source prefilter, the join predicate of every depth, the join-key
//! hash of every hash-joined depth, and the projection. Generated programs
//! implement the trait directly; [`EquiJoinProgram`] is a declarative
//! program for equality joins.

use std::fmt;
use std::sync::Arc;

use lanejoin_common::error::EvalFault;
use lanejoin_common::types::{Datum, RowLocator, Tuple};

use crate::relation::{ChecksumTable, MultiRelationSet, SourceBatch};

static NULL_DATUM: Datum = Datum::Null;

/// Join-key hash of one outer combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashKey {
    /// Hash value; meaningless when `is_null`.
    pub hash: u32,
    /// Some key column is NULL: the combination cannot match.
    pub is_null: bool,
}

impl HashKey {
    /// A non-null key.
    #[must_use]
    pub const fn new(hash: u32) -> Self {
        Self {
            hash,
            is_null: false,
        }
    }

    /// A key with a NULL column.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            hash: 0,
            is_null: true,
        }
    }
}

impl From<Option<u32>> for HashKey {
    fn from(hash: Option<u32>) -> Self {
        hash.map_or(Self::null(), Self::new)
    }
}

/// A chain of row locators, one per depth, resolved on demand.
#[derive(Clone, Copy)]
pub struct RowCombination<'a> {
    relations: &'a MultiRelationSet,
    source: &'a SourceBatch,
    chain: &'a [RowLocator],
}

impl<'a> RowCombination<'a> {
    /// Wraps a locator chain covering depths `0..chain.len()`.
    #[must_use]
    pub fn new(
        relations: &'a MultiRelationSet,
        source: &'a SourceBatch,
        chain: &'a [RowLocator],
    ) -> Self {
        Self {
            relations,
            source,
            chain,
        }
    }

    /// Returns the deepest depth in the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.chain.len().saturating_sub(1)
    }

    /// Returns the locators.
    #[must_use]
    pub fn locators(&self) -> &'a [RowLocator] {
        self.chain
    }

    /// Returns the locator of `depth`.
    #[must_use]
    pub fn locator(&self, depth: usize) -> Option<RowLocator> {
        self.chain.get(depth).copied()
    }

    /// Returns the row of `depth`; `None` for a null-extended side.
    #[must_use]
    pub fn tuple(&self, depth: usize) -> Option<&'a Tuple> {
        let locator = self.locator(depth)?;
        if depth == 0 {
            self.source.resolve(locator)
        } else {
            self.relations.relation(depth).get(locator.index()?)
        }
    }

    /// Returns column `column` of the row of `depth`; NULL when the row is
    /// null-extended or too short.
    #[must_use]
    pub fn value(&self, depth: usize, column: usize) -> &'a Datum {
        self.tuple(depth)
            .and_then(|t| t.get(column))
            .unwrap_or(&NULL_DATUM)
    }
}

impl fmt::Debug for RowCombination<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RowCombination").field(&self.chain).finish()
    }
}

/// Plan-specific callbacks used by the join core.
///
/// Callbacks run concurrently on every lane and must not block.
pub trait JoinProgram: Send + Sync {
    /// Row visibility and pre-join filter on source rows.
    fn prefilter(&self, _row: &Tuple) -> Result<bool, EvalFault> {
        Ok(true)
    }

    /// Join predicate of `depth` between an outer combination (depths
    /// `0..depth`) and an inner row.
    fn join_quals(
        &self,
        depth: usize,
        outer: &RowCombination<'_>,
        inner: &Tuple,
    ) -> Result<bool, EvalFault>;

    /// Join-key hash of an outer combination at hash-joined `depth`.
    fn hash_value(
        &self,
        table: &ChecksumTable,
        depth: usize,
        outer: &RowCombination<'_>,
    ) -> Result<HashKey, EvalFault>;

    /// Builds the destination tuple of a full combination.
    fn project(&self, combination: &RowCombination<'_>) -> Result<Tuple, EvalFault>;
}

/// Reference to column `column` of the row at `depth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Depth of the row.
    pub depth: usize,
    /// Column index within the row.
    pub column: usize,
}

impl ColumnRef {
    /// Creates a column reference.
    #[must_use]
    pub const fn new(depth: usize, column: usize) -> Self {
        Self { depth, column }
    }
}

type RowFilter = Arc<dyn Fn(&Tuple) -> Result<bool, EvalFault> + Send + Sync>;

/// Declarative equality-join program.
///
/// Each depth joins on a list of `(outer column, inner column)` pairs that
/// must all be equal and non-null. Depths without keys form a cross join.
///
/// # Example
///
/// ```rust
/// use lanejoin_exec::program::{ColumnRef, EquiJoinProgram};
///
/// // source.0 = r1.0, project source.1 and r1.1
/// let program = EquiJoinProgram::new(1)
///     .join_on(1, ColumnRef::new(0, 0), 0)
///     .project(vec![ColumnRef::new(0, 1), ColumnRef::new(1, 1)]);
/// assert_eq!(program.keys(1).len(), 1);
/// ```
#[derive(Clone)]
pub struct EquiJoinProgram {
    keys: Vec<Vec<(ColumnRef, usize)>>,
    projection: Vec<ColumnRef>,
    filter: Option<RowFilter>,
}

impl EquiJoinProgram {
    /// Creates a program over `num_rels` inner relations.
    #[must_use]
    pub fn new(num_rels: usize) -> Self {
        Self {
            keys: vec![Vec::new(); num_rels],
            projection: Vec::new(),
            filter: None,
        }
    }

    /// Creates a program keying every depth on `source.0 = inner.0` and
    /// projecting column 1 of every depth, source first.
    ///
    /// This is the `(key, payload)` shape used by benchmarks and scenario
    /// tests.
    #[must_use]
    pub fn key_chain(num_rels: usize) -> Self {
        let mut program = Self::new(num_rels);
        for depth in 1..=num_rels {
            program = program.join_on(depth, ColumnRef::new(0, 0), 0);
        }
        program.project((0..=num_rels).map(|depth| ColumnRef::new(depth, 1)).collect())
    }

    /// Adds the key `outer = inner_column` to `depth`.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is not an inner depth or `outer` does not refer to
    /// a shallower depth.
    #[must_use]
    pub fn join_on(mut self, depth: usize, outer: ColumnRef, inner_column: usize) -> Self {
        assert!(
            (1..=self.keys.len()).contains(&depth),
            "depth {depth} is not an inner relation"
        );
        assert!(outer.depth < depth, "join key must refer to a shallower depth");
        self.keys[depth - 1].push((outer, inner_column));
        self
    }

    /// Sets the projected columns.
    #[must_use]
    pub fn project(mut self, columns: Vec<ColumnRef>) -> Self {
        self.projection = columns;
        self
    }

    /// Sets the source prefilter.
    #[must_use]
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Tuple) -> Result<bool, EvalFault> + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Returns the keys of `depth`.
    #[must_use]
    pub fn keys(&self, depth: usize) -> &[(ColumnRef, usize)] {
        &self.keys[depth - 1]
    }

    /// Returns the projected columns.
    #[must_use]
    pub fn projection(&self) -> &[ColumnRef] {
        &self.projection
    }

    /// Hashes the inner key columns of `row` for a hash table at `depth`.
    ///
    /// Returns `None` when a key is NULL; such rows can never match.
    #[must_use]
    pub fn inner_hash(&self, table: &ChecksumTable, depth: usize, row: &Tuple) -> Option<u32> {
        table.hash_datums(
            self.keys(depth)
                .iter()
                .map(|(_, column)| row.get(*column).unwrap_or(&NULL_DATUM)),
        )
    }
}

impl fmt::Debug for EquiJoinProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EquiJoinProgram")
            .field("keys", &self.keys)
            .field("projection", &self.projection)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl JoinProgram for EquiJoinProgram {
    fn prefilter(&self, row: &Tuple) -> Result<bool, EvalFault> {
        match &self.filter {
            Some(filter) => filter(row),
            None => Ok(true),
        }
    }

    fn join_quals(
        &self,
        depth: usize,
        outer: &RowCombination<'_>,
        inner: &Tuple,
    ) -> Result<bool, EvalFault> {
        for (outer_ref, inner_column) in self.keys(depth) {
            let left = outer.value(outer_ref.depth, outer_ref.column);
            let right = inner.get(*inner_column).unwrap_or(&NULL_DATUM);
            if left.is_null() || right.is_null() {
                return Ok(false);
            }
            if std::mem::discriminant(left) != std::mem::discriminant(right) {
                return Err(EvalFault::type_mismatch(format!(
                    "cannot compare {left} with {right} at depth {depth}"
                )));
            }
            if left != right {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn hash_value(
        &self,
        table: &ChecksumTable,
        depth: usize,
        outer: &RowCombination<'_>,
    ) -> Result<HashKey, EvalFault> {
        let keys = self
            .keys(depth)
            .iter()
            .map(|(outer_ref, _)| outer.value(outer_ref.depth, outer_ref.column));
        Ok(HashKey::from(table.hash_datums(keys)))
    }

    fn project(&self, combination: &RowCombination<'_>) -> Result<Tuple, EvalFault> {
        Ok(Tuple::new(
            self.projection
                .iter()
                .map(|c| combination.value(c.depth, c.column).clone())
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{JoinType, RowStore};

    fn fixture() -> (MultiRelationSet, SourceBatch) {
        let inner: RowStore = vec![
            Tuple::ints([Some(1), Some(100)]),
            Tuple::ints([None, Some(200)]),
            Tuple::new(vec![Datum::text("1"), Datum::Int(300)]),
        ]
        .into_iter()
        .collect();
        let rels = MultiRelationSet::builder()
            .nest_loop(inner, JoinType::Left)
            .build()
            .unwrap();
        let source = SourceBatch::Row(
            vec![Tuple::ints([Some(1), Some(10)]), Tuple::ints([None, Some(20)])]
                .into_iter()
                .collect(),
        );
        (rels, source)
    }

    fn program() -> EquiJoinProgram {
        EquiJoinProgram::new(1)
            .join_on(1, ColumnRef::new(0, 0), 0)
            .project(vec![ColumnRef::new(0, 1), ColumnRef::new(1, 1)])
    }

    #[test]
    fn test_row_combination_resolves_lazily() {
        let (rels, source) = fixture();
        let chain = [RowLocator::from_index(0), RowLocator::NULL];
        let combo = RowCombination::new(&rels, &source, &chain);
        assert_eq!(combo.depth(), 1);
        assert!(combo.tuple(0).is_some());
        assert!(combo.tuple(1).is_none());
        assert_eq!(combo.value(1, 0), &Datum::Null);
        assert_eq!(combo.value(0, 7), &Datum::Null);
    }

    #[test]
    fn test_join_quals() {
        let (rels, source) = fixture();
        let program = program();
        let chain = [RowLocator::from_index(0)];
        let outer = RowCombination::new(&rels, &source, &chain);
        let inner = rels.relation(1);

        assert!(program.join_quals(1, &outer, inner.get(0).unwrap()).unwrap());
        assert!(!program.join_quals(1, &outer, inner.get(1).unwrap()).unwrap());
        assert!(program.join_quals(1, &outer, inner.get(2).unwrap()).is_err());

        let null_chain = [RowLocator::from_index(1)];
        let null_outer = RowCombination::new(&rels, &source, &null_chain);
        assert!(!program
            .join_quals(1, &null_outer, inner.get(0).unwrap())
            .unwrap());
    }

    #[test]
    fn test_hash_agrees_with_inner_hash() {
        let (rels, source) = fixture();
        let program = program();
        let table = rels.checksum_table();

        let chain = [RowLocator::from_index(0)];
        let outer = RowCombination::new(&rels, &source, &chain);
        let key = program.hash_value(table, 1, &outer).unwrap();
        assert!(!key.is_null);
        assert_eq!(
            Some(key.hash),
            program.inner_hash(table, 1, rels.relation(1).get(0).unwrap())
        );

        let null_chain = [RowLocator::from_index(1)];
        let null_outer = RowCombination::new(&rels, &source, &null_chain);
        assert!(program.hash_value(table, 1, &null_outer).unwrap().is_null);
    }

    #[test]
    fn test_project_null_extended() {
        let (rels, source) = fixture();
        let chain = [RowLocator::from_index(1), RowLocator::NULL];
        let combo = RowCombination::new(&rels, &source, &chain);
        let tuple = JoinProgram::project(&program(), &combo).unwrap();
        assert_eq!(tuple, Tuple::ints([Some(20), None]));
    }

    #[test]
    fn test_key_chain() {
        let program = EquiJoinProgram::key_chain(3);
        for depth in 1..=3 {
            assert_eq!(program.keys(depth), &[(ColumnRef::new(0, 0), 0)]);
        }
        assert_eq!(
            program.projection(),
            &[
                ColumnRef::new(0, 1),
                ColumnRef::new(1, 1),
                ColumnRef::new(2, 1),
                ColumnRef::new(3, 1)
            ]
        );
        assert_eq!(EquiJoinProgram::key_chain(0).projection(), &[ColumnRef::new(0, 1)]);
    }

    #[test]
    fn test_filter() {
        let program = program().with_filter(|row| Ok(row.get(1) != Some(&Datum::Int(20))));
        assert!(program.prefilter(&Tuple::ints([Some(1), Some(10)])).unwrap());
        assert!(!program.prefilter(&Tuple::ints([Some(1), Some(20)])).unwrap());
    }
}
