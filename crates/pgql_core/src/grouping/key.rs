use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crate::expr::ExpressionRef;
use crate::scalar::ScalarValue;
use crate::scalar::hash::{NO_GROUPS_HASH_VALUE, combine_hashes, hash_scalar};
use crate::table::ResultTable;

/// Function used to hash a single grouping key value.
pub type KeyHashFn = fn(&ScalarValue) -> u64;

/// Identity of a group.
///
/// Equality requires matching hashes *and* pairwise equal key values. The
/// hash only ever narrows the search.
#[derive(Debug, Clone)]
pub struct GroupKey {
    /// Combined hash of the key values.
    pub hash: u64,
    /// Representative row for this group in the result table.
    pub row: usize,
    /// Key values evaluated on the representative row.
    pub values: Box<[ScalarValue]>,
}

impl GroupKey {
    fn values_eq(&self, values: &[ScalarValue]) -> bool {
        self.values.len() == values.len()
            && self
                .values
                .iter()
                .zip(values)
                .all(|(a, b)| a.group_eq(b))
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.values_eq(&other.values)
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

/// Build hasher that passes through the precomputed group key hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrecomputedHashState;

impl BuildHasher for PrecomputedHashState {
    type Hasher = PrecomputedHasher;

    fn build_hasher(&self) -> Self::Hasher {
        PrecomputedHasher(0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrecomputedHasher(u64);

impl Hasher for PrecomputedHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        // Only reached if something other than a `GroupKey` is hashed.
        for &b in bytes {
            self.0 = combine_hashes(self.0, b as u64);
        }
    }

    fn write_u64(&mut self, i: u64) {
        self.0 = i;
    }
}

/// Evaluates grouping-key expressions for rows and caches the evaluated values
/// between hashing and equality checks.
///
/// Exposed through two views: `RowHasher` computes a row's hash and fills the
/// cache, `RowEqualityComparer` compares the cached row against existing
/// groups without evaluating the row's expressions again.
///
/// Cloning shares the expression definitions and copies the cache, so every
/// worker gets independent cache state.
#[derive(Debug, Clone)]
pub struct RowKeyEvaluator {
    exprs: Arc<[ExpressionRef]>,
    hash_fn: KeyHashFn,
    cache: Vec<ScalarValue>,
    cached_row: Option<usize>,
    cached_hash: u64,
}

impl RowKeyEvaluator {
    pub fn new(exprs: impl Into<Arc<[ExpressionRef]>>) -> Self {
        Self::with_hash_fn(exprs, hash_scalar)
    }

    /// Create an evaluator using a custom per-value hash function.
    pub fn with_hash_fn(exprs: impl Into<Arc<[ExpressionRef]>>, hash_fn: KeyHashFn) -> Self {
        let exprs = exprs.into();
        let cache = vec![ScalarValue::Null; exprs.len()];
        RowKeyEvaluator {
            exprs,
            hash_fn,
            cache,
            cached_row: None,
            cached_hash: 0,
        }
    }

    pub fn hasher(&mut self) -> RowHasher<'_> {
        RowHasher { evaluator: self }
    }

    pub fn comparer(&self) -> RowEqualityComparer<'_> {
        RowEqualityComparer { evaluator: self }
    }

    fn hash_values(&self, values: &[ScalarValue]) -> u64 {
        if values.is_empty() {
            return NO_GROUPS_HASH_VALUE;
        }

        let mut hash = (self.hash_fn)(&values[0]);
        for value in &values[1..] {
            hash = combine_hashes(hash, (self.hash_fn)(value));
        }
        hash
    }
}

/// Hashing view over a `RowKeyEvaluator`.
#[derive(Debug)]
pub struct RowHasher<'a> {
    evaluator: &'a mut RowKeyEvaluator,
}

impl RowHasher<'_> {
    /// Evaluate the key expressions for `row` and return the combined hash.
    ///
    /// A key expression that fails to evaluate contributes a null. The values
    /// stay cached for the comparer until the next call.
    pub fn hash(&mut self, table: &dyn ResultTable, row: usize) -> u64 {
        let ev = &mut *self.evaluator;
        if ev.cached_row == Some(row) {
            return ev.cached_hash;
        }

        for (slot, expr) in ev.cache.iter_mut().zip(ev.exprs.iter()) {
            *slot = expr.eval(table, row).unwrap_or(ScalarValue::Null);
        }

        ev.cached_hash = ev.hash_values(&ev.cache);
        ev.cached_row = Some(row);
        ev.cached_hash
    }

    /// Hash `row` and build its full group key.
    pub fn key(&mut self, table: &dyn ResultTable, row: usize) -> GroupKey {
        let hash = self.hash(table, row);
        GroupKey {
            hash,
            row,
            values: self.evaluator.cache.clone().into_boxed_slice(),
        }
    }
}

/// Equality view over a `RowKeyEvaluator`.
#[derive(Debug, Clone, Copy)]
pub struct RowEqualityComparer<'a> {
    evaluator: &'a RowKeyEvaluator,
}

impl RowEqualityComparer<'_> {
    /// Check if the cached row belongs to the group identified by `key`.
    pub fn matches_key(&self, key: &GroupKey) -> bool {
        debug_assert!(self.evaluator.cached_row.is_some(), "comparer used before hasher");
        key.hash == self.evaluator.cached_hash && key.values_eq(&self.evaluator.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExpr;
    use crate::scalar::DataType;
    use crate::table::MaterializedTable;

    fn table() -> MaterializedTable {
        MaterializedTable::try_new(
            2,
            vec![
                vec![ScalarValue::Int64(1), ScalarValue::from("a")],
                vec![ScalarValue::Int64(1), ScalarValue::from("a")],
                vec![ScalarValue::Int64(1), ScalarValue::from("b")],
                vec![ScalarValue::Null, ScalarValue::from("b")],
            ],
        )
        .unwrap()
    }

    fn evaluator() -> RowKeyEvaluator {
        RowKeyEvaluator::new(vec![
            ColumnExpr::new(0, DataType::Int64).into_ref(),
            ColumnExpr::new(1, DataType::Utf8).into_ref(),
        ])
    }

    #[test]
    fn equal_rows_equal_hashes() {
        let table = table();
        let mut ev = evaluator();

        let h0 = ev.hasher().hash(&table, 0);
        let h1 = ev.hasher().hash(&table, 1);
        let h2 = ev.hasher().hash(&table, 2);

        assert_eq!(h0, h1);
        assert_ne!(h0, h2);
    }

    #[test]
    fn comparer_matches_cached_row() {
        let table = table();
        let mut ev = evaluator();

        let key = ev.hasher().key(&table, 0);
        assert_eq!(0, key.row);

        ev.hasher().hash(&table, 1);
        assert!(ev.comparer().matches_key(&key));

        ev.hasher().hash(&table, 2);
        assert!(!ev.comparer().matches_key(&key));

        ev.hasher().hash(&table, 3);
        assert!(!ev.comparer().matches_key(&key));
    }

    #[test]
    fn colliding_hashes_not_equal() {
        let table = table();
        let mut ev = RowKeyEvaluator::with_hash_fn(
            vec![ColumnExpr::new(1, DataType::Utf8).into_ref()],
            |_| 7,
        );

        let key = ev.hasher().key(&table, 0);
        let h2 = ev.hasher().hash(&table, 2);

        assert_eq!(key.hash, h2);
        assert!(!ev.comparer().matches_key(&key));
    }

    #[test]
    fn swapped_columns_hash_differently() {
        let table = MaterializedTable::try_new(
            2,
            vec![
                vec![ScalarValue::Int64(1), ScalarValue::Int64(2)],
                vec![ScalarValue::Int64(2), ScalarValue::Int64(1)],
            ],
        )
        .unwrap();
        let mut ev = RowKeyEvaluator::new(vec![
            ColumnExpr::new(0, DataType::Int64).into_ref(),
            ColumnExpr::new(1, DataType::Int64).into_ref(),
        ]);

        let h0 = ev.hasher().hash(&table, 0);
        let h1 = ev.hasher().hash(&table, 1);
        assert_ne!(h0, h1);
    }

    #[test]
    fn clone_has_independent_cache() {
        let table = table();
        let mut ev = evaluator();
        let key = ev.hasher().key(&table, 0);

        let mut cloned = ev.clone();
        cloned.hasher().hash(&table, 2);

        assert!(ev.comparer().matches_key(&key));
        assert!(!cloned.comparer().matches_key(&key));
        assert!(Arc::ptr_eq(&ev.exprs, &cloned.exprs));
    }

    #[test]
    fn hasher_key_uses_cache() {
        let table = table();
        let mut ev = evaluator();
        let hash = ev.hasher().hash(&table, 3);
        let key = ev.hasher().key(&table, 3);

        assert_eq!(3, key.row);
        assert_eq!(hash, key.hash);
        assert!(key.values[0].is_null());
        assert!(ev.comparer().matches_key(&key));
    }

    #[test]
    fn no_keys_single_hash() {
        let table = table();
        let mut ev = RowKeyEvaluator::new(Vec::<ExpressionRef>::new());
        let h0 = ev.hasher().hash(&table, 0);
        let h3 = ev.hasher().hash(&table, 3);
        assert_eq!(NO_GROUPS_HASH_VALUE, h0);
        assert_eq!(h0, h3);
    }
}
