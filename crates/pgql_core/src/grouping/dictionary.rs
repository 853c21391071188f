use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hashbrown::raw::RawTable;

use scc::Equivalent;

use super::key::{GroupKey, PrecomputedHashState, RowEqualityComparer, RowKeyEvaluator};
use crate::functions::aggregate::storage::AggregateBucket;
use crate::table::ResultTable;

/// Aggregate buckets for a single group, shared between workers.
pub type SharedBuckets = Arc<[AggregateBucket]>;

/// Single-threaded dictionary mapping group keys to dense group ordinals.
///
/// Ordinals are assigned in discovery order and are only meaningful for this
/// dictionary.
pub struct LocalDictionary {
    /// Ordinals hashed by their key's hash.
    table: RawTable<usize>,
    /// Keys indexed by ordinal.
    keys: Vec<GroupKey>,
}

impl fmt::Debug for LocalDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDictionary")
            .field("num_groups", &self.keys.len())
            .finish_non_exhaustive()
    }
}

impl Default for LocalDictionary {
    fn default() -> Self {
        LocalDictionary {
            table: RawTable::new(),
            keys: Vec::new(),
        }
    }
}

impl LocalDictionary {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[GroupKey] {
        &self.keys
    }

    pub fn into_keys(self) -> Vec<GroupKey> {
        self.keys
    }

    /// Find the group for `row`, creating it if it doesn't exist.
    ///
    /// Returns the group ordinal and if the group was newly created.
    pub fn find_or_insert(
        &mut self,
        evaluator: &mut RowKeyEvaluator,
        table: &dyn ResultTable,
        row: usize,
    ) -> (usize, bool) {
        let hash = evaluator.hasher().hash(table, row);
        let comparer = evaluator.comparer();

        if let Some(&ordinal) = self
            .table
            .get(hash, |&ordinal| comparer.matches_key(&self.keys[ordinal]))
        {
            return (ordinal, false);
        }

        // Row is still cached, this only copies the key values out.
        let key = evaluator.hasher().key(table, row);
        (self.insert_key(key), true)
    }

    /// Find the ordinal for an existing key.
    pub fn find_key(&self, key: &GroupKey) -> Option<usize> {
        self.table
            .get(key.hash, |&ordinal| self.keys[ordinal] == *key)
            .copied()
    }

    /// Insert a key that's not already in the dictionary, returning its new
    /// ordinal.
    pub fn insert_key(&mut self, key: GroupKey) -> usize {
        debug_assert!(self.find_key(&key).is_none());

        let ordinal = self.keys.len();
        let hash = key.hash;
        self.keys.push(key);

        let keys = &self.keys;
        self.table.insert(hash, ordinal, |&ordinal| keys[ordinal].hash);

        ordinal
    }
}

/// Concurrency-safe dictionary mapping group keys to shared aggregate buckets.
///
/// Mutation is get-or-add only. Aggregate updates happen on the returned
/// buckets outside of the map, so no lock is held while folding values.
pub struct GlobalDictionary {
    map: scc::HashMap<GroupKey, SharedBuckets, PrecomputedHashState>,
}

impl fmt::Debug for GlobalDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalDictionary")
            .field("num_groups", &self.map.len())
            .finish_non_exhaustive()
    }
}

impl Default for GlobalDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalDictionary {
    pub fn new() -> Self {
        GlobalDictionary {
            map: scc::HashMap::with_hasher(PrecomputedHashState),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get the buckets for the group `row` belongs to, inserting buckets
    /// produced by `init` if the group isn't present.
    ///
    /// Looks up by the evaluator's cached values. An owned key is only built
    /// when the group may be new.
    pub fn get_or_insert_row<F>(
        &self,
        evaluator: &mut RowKeyEvaluator,
        table: &dyn ResultTable,
        row: usize,
        init: F,
    ) -> SharedBuckets
    where
        F: FnOnce() -> SharedBuckets,
    {
        let hash = evaluator.hasher().hash(table, row);
        let lookup = CachedRowKey {
            hash,
            comparer: evaluator.comparer(),
        };
        if let Some(buckets) = self.map.read(&lookup, |_, buckets| buckets.clone()) {
            return buckets;
        }

        let key = evaluator.hasher().key(table, row);
        self.get_or_insert_with(key, init)
    }

    /// Get the buckets for a key, inserting buckets produced by `init` if the
    /// key isn't present.
    pub fn get_or_insert_with<F>(&self, key: GroupKey, init: F) -> SharedBuckets
    where
        F: FnOnce() -> SharedBuckets,
    {
        match self.map.entry(key) {
            scc::hash_map::Entry::Occupied(ent) => ent.get().clone(),
            scc::hash_map::Entry::Vacant(ent) => {
                let buckets = init();
                ent.insert_entry(buckets.clone());
                buckets
            }
        }
    }

    /// Try to donate buckets for a key.
    ///
    /// Returns None if this call inserted the buckets, or the buckets already
    /// in the map. `init` is only called when inserting.
    pub fn try_insert_with<F>(&self, key: GroupKey, init: F) -> Option<SharedBuckets>
    where
        F: FnOnce() -> SharedBuckets,
    {
        match self.map.entry(key) {
            scc::hash_map::Entry::Occupied(ent) => Some(ent.get().clone()),
            scc::hash_map::Entry::Vacant(ent) => {
                ent.insert_entry(init());
                None
            }
        }
    }

    /// Collect all groups.
    ///
    /// Should only be called once all writers are done.
    pub fn into_groups(self) -> Vec<(GroupKey, SharedBuckets)> {
        let mut groups = Vec::with_capacity(self.map.len());
        self.map.scan(|key, buckets| {
            groups.push((key.clone(), buckets.clone()));
        });
        groups
    }
}

/// Borrowed lookup key for the row currently cached in an evaluator.
struct CachedRowKey<'a> {
    hash: u64,
    comparer: RowEqualityComparer<'a>,
}

impl Hash for CachedRowKey<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Equivalent<GroupKey> for CachedRowKey<'_> {
    fn equivalent(&self, key: &GroupKey) -> bool {
        self.comparer.matches_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExpr;
    use crate::scalar::{DataType, ScalarValue};
    use crate::table::MaterializedTable;

    fn table() -> MaterializedTable {
        MaterializedTable::try_new(
            1,
            [3, 1, 3, 2, 1]
                .into_iter()
                .map(|v| vec![ScalarValue::Int64(v)])
                .collect(),
        )
        .unwrap()
    }

    fn evaluator() -> RowKeyEvaluator {
        RowKeyEvaluator::new(vec![ColumnExpr::new(0, DataType::Int64).into_ref()])
    }

    #[test]
    fn ordinals_in_discovery_order() {
        let table = table();
        let mut ev = evaluator();
        let mut dict = LocalDictionary::default();

        let ordinals: Vec<_> = (0..table.row_count())
            .map(|row| dict.find_or_insert(&mut ev, &table, row))
            .collect();

        assert_eq!(
            vec![(0, true), (1, true), (0, false), (2, true), (1, false)],
            ordinals
        );
        assert_eq!(3, dict.len());
        assert_eq!(0, dict.keys()[0].row);
        assert_eq!(3, dict.keys()[2].row);
    }

    #[test]
    fn find_key_across_dictionaries() {
        let table = table();
        let mut ev = evaluator();

        let mut a = LocalDictionary::default();
        a.find_or_insert(&mut ev, &table, 0);
        a.find_or_insert(&mut ev, &table, 1);

        let key = ev.hasher().key(&table, 4);
        assert_eq!(Some(1), a.find_key(&key));

        let missing = ev.hasher().key(&table, 3);
        assert_eq!(None, a.find_key(&missing));
        assert_eq!(2, a.insert_key(missing));
    }

    #[test]
    fn forced_collisions_stay_distinct() {
        let table = table();
        let mut ev = RowKeyEvaluator::with_hash_fn(
            vec![ColumnExpr::new(0, DataType::Int64).into_ref()],
            |_| 42,
        );
        let mut dict = LocalDictionary::default();

        for row in 0..table.row_count() {
            dict.find_or_insert(&mut ev, &table, row);
        }

        assert_eq!(3, dict.len());
    }

    #[test]
    fn global_get_or_insert() {
        let table = table();
        let mut ev = evaluator();
        let global = GlobalDictionary::new();

        let a = global.get_or_insert_with(ev.hasher().key(&table, 0), || {
            Arc::from(vec![AggregateBucket::default()])
        });
        let b = global.get_or_insert_with(ev.hasher().key(&table, 2), || {
            panic!("key should already exist")
        });

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(1, global.len());

        let donated = global.try_insert_with(ev.hasher().key(&table, 1), || {
            Arc::from(vec![AggregateBucket::default()])
        });
        assert!(donated.is_none());
        assert_eq!(2, global.into_groups().len());
    }

    #[test]
    fn global_get_or_insert_row() {
        let table = table();
        let mut ev = evaluator();
        let global = GlobalDictionary::new();
        let new_buckets = || Arc::from(vec![AggregateBucket::default()]);

        let a = global.get_or_insert_row(&mut ev, &table, 0, new_buckets);
        let b = global.get_or_insert_row(&mut ev, &table, 2, || {
            panic!("group should already exist")
        });
        assert!(Arc::ptr_eq(&a, &b));

        global.get_or_insert_row(&mut ev, &table, 1, new_buckets);
        global.get_or_insert_row(&mut ev, &table, 4, || {
            panic!("group should already exist")
        });
        assert_eq!(2, global.len());
    }

    #[test]
    fn global_rows_with_forced_collisions() {
        let table = table();
        let mut ev = RowKeyEvaluator::with_hash_fn(
            vec![ColumnExpr::new(0, DataType::Int64).into_ref()],
            |_| 42,
        );
        let global = GlobalDictionary::new();

        for row in 0..table.row_count() {
            global.get_or_insert_row(&mut ev, &table, row, || {
                Arc::from(vec![AggregateBucket::default()])
            });
        }

        let mut rows: Vec<_> = global
            .into_groups()
            .into_iter()
            .map(|(key, _)| key.row)
            .collect();
        rows.sort_unstable();
        assert_eq!(vec![0, 1, 3], rows);
    }
}
