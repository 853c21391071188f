use std::fmt::Debug;
use std::mem;
use std::sync::Arc;

use super::dictionary::SharedBuckets;
use crate::config::StorageMode;
use crate::functions::aggregate::AggregateExpr;
use crate::functions::aggregate::storage::{
    AggregateArray,
    AggregateBucket,
    AggregateList,
    PartialAggregate,
};
use crate::table::ResultTable;

/// Read access to finalized per-group aggregate state.
pub trait StateView: Debug + Send {
    /// Load the state for an aggregate in a group.
    fn load(&self, agg_idx: usize, ordinal: usize) -> PartialAggregate;
}

/// Aggregate state for all groups of a single local dictionary.
///
/// Groups are addressed by the dictionary's ordinals. A group must be created
/// with `push_group` before it's updated, and ordinals are handed out densely
/// from zero.
pub trait LocalStates: StateView + Sized + 'static {
    const MODE: StorageMode;

    /// Create states for `num_aggregates` aggregates expecting at most
    /// `max_groups` groups.
    ///
    /// `max_groups` is a sizing hint except for arrays, which allocate it up
    /// front.
    fn new(num_aggregates: usize, max_groups: usize) -> Self;

    fn num_groups(&self) -> usize;

    /// Create empty state for the next ordinal.
    fn push_group(&mut self);

    /// Fold `row` into every aggregate of the group.
    fn update(
        &mut self,
        aggregates: &[AggregateExpr],
        table: &dyn ResultTable,
        row: usize,
        ordinal: usize,
    );

    /// Fold a group from `source` into an existing group.
    fn merge_group(
        &mut self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        source: &Self,
        source_ordinal: usize,
    );

    /// Move a group from `source` into a new group, returning its ordinal.
    ///
    /// The source group must not be used afterwards.
    fn append_group(
        &mut self,
        aggregates: &[AggregateExpr],
        source: &mut Self,
        source_ordinal: usize,
    ) -> usize {
        let ordinal = self.num_groups();
        self.push_group();
        self.merge_group(aggregates, ordinal, source, source_ordinal);
        ordinal
    }

    /// Make room for `additional` groups.
    fn reserve(&mut self, additional: usize);

    /// Convert a group into shared buckets.
    ///
    /// The group must not be used afterwards.
    fn take_buckets(&mut self, ordinal: usize) -> SharedBuckets;

    /// Fold a group into buckets that may be concurrently modified.
    fn merge_into_buckets_thread_safe(
        &self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        target: &[AggregateBucket],
    );
}

fn new_buckets(num_aggregates: usize) -> Box<[AggregateBucket]> {
    (0..num_aggregates)
        .map(|_| AggregateBucket::default())
        .collect()
}

/// One bucket per aggregate per group.
#[derive(Debug)]
pub struct BucketStates {
    num_aggregates: usize,
    groups: Vec<Box<[AggregateBucket]>>,
}

impl StateView for BucketStates {
    fn load(&self, agg_idx: usize, ordinal: usize) -> PartialAggregate {
        self.groups[ordinal][agg_idx].load()
    }
}

impl LocalStates for BucketStates {
    const MODE: StorageMode = StorageMode::Bucket;

    fn new(num_aggregates: usize, max_groups: usize) -> Self {
        BucketStates {
            num_aggregates,
            groups: Vec::with_capacity(max_groups),
        }
    }

    fn num_groups(&self) -> usize {
        self.groups.len()
    }

    fn push_group(&mut self) {
        self.groups.push(new_buckets(self.num_aggregates));
    }

    fn update(
        &mut self,
        aggregates: &[AggregateExpr],
        table: &dyn ResultTable,
        row: usize,
        ordinal: usize,
    ) {
        for (agg, bucket) in aggregates.iter().zip(self.groups[ordinal].iter_mut()) {
            agg.apply_bucket(table, row, bucket);
        }
    }

    fn merge_group(
        &mut self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        source: &Self,
        source_ordinal: usize,
    ) {
        let targets = self.groups[ordinal].iter_mut();
        let sources = source.groups[source_ordinal].iter();
        for ((agg, target), source) in aggregates.iter().zip(targets).zip(sources) {
            agg.merge_buckets(target, source);
        }
    }

    fn append_group(
        &mut self,
        _aggregates: &[AggregateExpr],
        source: &mut Self,
        source_ordinal: usize,
    ) -> usize {
        let buckets = mem::take(&mut source.groups[source_ordinal]);
        self.groups.push(buckets);
        self.groups.len() - 1
    }

    fn reserve(&mut self, additional: usize) {
        self.groups.reserve(additional);
    }

    fn take_buckets(&mut self, ordinal: usize) -> SharedBuckets {
        Arc::from(mem::take(&mut self.groups[ordinal]))
    }

    fn merge_into_buckets_thread_safe(
        &self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        target: &[AggregateBucket],
    ) {
        let sources = self.groups[ordinal].iter();
        for ((agg, target), source) in aggregates.iter().zip(target).zip(sources) {
            agg.merge_buckets_thread_safe(target, source);
        }
    }
}

/// One growable list per aggregate.
#[derive(Debug)]
pub struct ListStates {
    lists: Vec<AggregateList>,
    num_groups: usize,
}

impl StateView for ListStates {
    fn load(&self, agg_idx: usize, ordinal: usize) -> PartialAggregate {
        self.lists[agg_idx].get(ordinal)
    }
}

impl LocalStates for ListStates {
    const MODE: StorageMode = StorageMode::List;

    fn new(num_aggregates: usize, max_groups: usize) -> Self {
        // Lists grow lazily, don't allocate for the worst case.
        let capacity = usize::min(max_groups, 1024);
        ListStates {
            lists: (0..num_aggregates)
                .map(|_| AggregateList::with_capacity(capacity))
                .collect(),
            num_groups: 0,
        }
    }

    fn num_groups(&self) -> usize {
        self.num_groups
    }

    fn push_group(&mut self) {
        self.num_groups += 1;
    }

    fn update(
        &mut self,
        aggregates: &[AggregateExpr],
        table: &dyn ResultTable,
        row: usize,
        ordinal: usize,
    ) {
        for (agg, list) in aggregates.iter().zip(self.lists.iter_mut()) {
            agg.apply_list(table, row, list, ordinal);
        }
    }

    fn merge_group(
        &mut self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        source: &Self,
        source_ordinal: usize,
    ) {
        let targets = self.lists.iter_mut();
        for ((agg, target), source) in aggregates.iter().zip(targets).zip(&source.lists) {
            agg.merge_lists(target, ordinal, source, source_ordinal);
        }
    }

    fn reserve(&mut self, _additional: usize) {}

    fn take_buckets(&mut self, ordinal: usize) -> SharedBuckets {
        self.lists
            .iter()
            .map(|list| AggregateBucket::from_partial(list.get(ordinal)))
            .collect()
    }

    fn merge_into_buckets_thread_safe(
        &self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        target: &[AggregateBucket],
    ) {
        for ((agg, target), source) in aggregates.iter().zip(target).zip(&self.lists) {
            agg.merge_list_into_bucket_thread_safe(target, source, ordinal);
        }
    }
}

/// One pre-sized array per aggregate.
#[derive(Debug)]
pub struct ArrayStates {
    arrays: Vec<AggregateArray>,
    num_groups: usize,
}

impl ArrayStates {
    fn capacity(&self) -> usize {
        self.arrays.first().map(|arr| arr.capacity()).unwrap_or(0)
    }

    fn ensure_capacity(&mut self, needed: usize) {
        let capacity = self.capacity();
        if needed > capacity {
            for arr in &mut self.arrays {
                arr.grow(needed - capacity);
            }
        }
    }
}

impl StateView for ArrayStates {
    fn load(&self, agg_idx: usize, ordinal: usize) -> PartialAggregate {
        self.arrays[agg_idx].get(ordinal)
    }
}

impl LocalStates for ArrayStates {
    const MODE: StorageMode = StorageMode::Array;

    fn new(num_aggregates: usize, max_groups: usize) -> Self {
        ArrayStates {
            arrays: (0..num_aggregates)
                .map(|_| AggregateArray::with_capacity(max_groups))
                .collect(),
            num_groups: 0,
        }
    }

    fn num_groups(&self) -> usize {
        self.num_groups
    }

    fn push_group(&mut self) {
        // Only reached past the initial capacity if the caller's bound was
        // wrong. Double to keep this amortized.
        if self.num_groups == self.capacity() {
            self.ensure_capacity(usize::max(self.num_groups * 2, 1));
        }
        self.num_groups += 1;
    }

    fn update(
        &mut self,
        aggregates: &[AggregateExpr],
        table: &dyn ResultTable,
        row: usize,
        ordinal: usize,
    ) {
        for (agg, arr) in aggregates.iter().zip(self.arrays.iter_mut()) {
            agg.apply_array(table, row, arr, ordinal);
        }
    }

    fn merge_group(
        &mut self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        source: &Self,
        source_ordinal: usize,
    ) {
        let targets = self.arrays.iter_mut();
        for ((agg, target), source) in aggregates.iter().zip(targets).zip(&source.arrays) {
            agg.merge_arrays(target, ordinal, source, source_ordinal);
        }
    }

    fn reserve(&mut self, additional: usize) {
        self.ensure_capacity(self.num_groups + additional);
    }

    fn take_buckets(&mut self, ordinal: usize) -> SharedBuckets {
        self.arrays
            .iter()
            .map(|arr| AggregateBucket::from_partial(arr.get(ordinal)))
            .collect()
    }

    fn merge_into_buckets_thread_safe(
        &self,
        aggregates: &[AggregateExpr],
        ordinal: usize,
        target: &[AggregateBucket],
    ) {
        for ((agg, target), source) in aggregates.iter().zip(target).zip(&self.arrays) {
            agg.merge_array_into_bucket_thread_safe(target, source, ordinal);
        }
    }
}

/// Finalized state held in shared buckets, one entry per group.
#[derive(Debug)]
pub struct SharedBucketStates {
    pub groups: Vec<SharedBuckets>,
}

impl StateView for SharedBucketStates {
    fn load(&self, agg_idx: usize, ordinal: usize) -> PartialAggregate {
        self.groups[ordinal][agg_idx].load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExpr;
    use crate::functions::aggregate::AggregateKind;
    use crate::scalar::{DataType, ScalarValue};
    use crate::table::MaterializedTable;

    fn table() -> MaterializedTable {
        MaterializedTable::try_new(
            1,
            [4, 9, -2, 7]
                .into_iter()
                .map(|v| vec![ScalarValue::Int64(v)])
                .collect(),
        )
        .unwrap()
    }

    fn aggregates() -> Vec<AggregateExpr> {
        let input = Some(ColumnExpr::new(0, DataType::Int64).into_ref());
        vec![
            AggregateExpr::try_new(AggregateKind::Sum, input.clone()).unwrap(),
            AggregateExpr::try_new(AggregateKind::Min, input).unwrap(),
            AggregateExpr::count_star(),
        ]
    }

    /// Rows 0 and 1 into `a`, rows 2 and 3 into `b`, then merge and move.
    fn merge_and_append<S: LocalStates>() {
        let table = table();
        let aggs = aggregates();

        let mut a = S::new(aggs.len(), 1);
        a.push_group();
        a.update(&aggs, &table, 0, 0);
        a.update(&aggs, &table, 1, 0);

        let mut b = S::new(aggs.len(), 2);
        b.push_group();
        b.push_group();
        b.update(&aggs, &table, 2, 0);
        b.update(&aggs, &table, 3, 1);

        a.reserve(b.num_groups());
        a.merge_group(&aggs, 0, &b, 0);
        let moved = a.append_group(&aggs, &mut b, 1);

        assert_eq!(1, moved);
        assert_eq!(2, a.num_groups());

        assert_eq!(ScalarValue::Int64(11), aggs[0].finalize(&a.load(0, 0)));
        assert_eq!(ScalarValue::Int64(-2), aggs[1].finalize(&a.load(1, 0)));
        assert_eq!(ScalarValue::Int64(3), aggs[2].finalize(&a.load(2, 0)));
        assert_eq!(ScalarValue::Int64(7), aggs[0].finalize(&a.load(0, 1)));

        let shared = a.take_buckets(1);
        a.merge_into_buckets_thread_safe(&aggs, 0, &shared);
        assert_eq!(ScalarValue::Int64(18), aggs[0].finalize(&shared[0].load()));
        assert_eq!(ScalarValue::Int64(-2), aggs[1].finalize(&shared[1].load()));
        assert_eq!(ScalarValue::Int64(4), aggs[2].finalize(&shared[2].load()));
    }

    #[test]
    fn buckets() {
        merge_and_append::<BucketStates>();
    }

    #[test]
    fn lists() {
        merge_and_append::<ListStates>();
    }

    #[test]
    fn arrays() {
        merge_and_append::<ArrayStates>();
    }

    #[test]
    fn array_grows_past_hint() {
        let table = table();
        let aggs = aggregates();
        let mut states = ArrayStates::new(aggs.len(), 0);

        for row in 0..4 {
            states.push_group();
            states.update(&aggs, &table, row, row);
        }

        assert_eq!(4, states.num_groups());
        assert_eq!(ScalarValue::Int64(7), aggs[0].finalize(&states.load(0, 3)));
    }
}
