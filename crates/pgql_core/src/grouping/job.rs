use std::ops::Range;

use pgql_error::{DbError, Result};
use tracing::trace;

use super::dictionary::{GlobalDictionary, LocalDictionary};
use super::key::{GroupKey, RowKeyEvaluator};
use super::states::LocalStates;
use crate::functions::aggregate::AggregateExpr;
use crate::table::ResultTable;

/// Split `row_count` rows into `threads` contiguous ranges.
///
/// Every range gets `row_count / threads` rows with the last range absorbing
/// the remainder. Errors if that share is zero.
pub fn partition_rows(row_count: usize, threads: usize) -> Result<Vec<Range<usize>>> {
    if threads == 0 {
        return Err(DbError::new("Thread count must be greater than zero"));
    }

    let share = row_count / threads;
    if share == 0 {
        return Err(
            DbError::new("Thread count leaves some threads with no rows to group")
                .with_field("rows", row_count)
                .with_field("threads", threads),
        );
    }

    let ranges = (0..threads)
        .map(|idx| {
            let start = idx * share;
            let end = if idx == threads - 1 {
                row_count
            } else {
                start + share
            };
            start..end
        })
        .collect();

    Ok(ranges)
}

/// A single worker's unit of grouping.
///
/// Owns everything it mutates: its own key evaluator (and so its own key
/// cache), a local dictionary, and local aggregate state.
#[derive(Debug)]
pub struct Job<S> {
    pub idx: usize,
    /// Rows this job is responsible for. Covers the rows of all jobs merged
    /// into this one.
    pub rows: Range<usize>,
    num_aggregates: usize,
    evaluator: RowKeyEvaluator,
    dictionary: LocalDictionary,
    states: S,
}

impl<S: LocalStates> Job<S> {
    pub fn new(
        idx: usize,
        rows: Range<usize>,
        evaluator: RowKeyEvaluator,
        num_aggregates: usize,
    ) -> Self {
        let states = S::new(num_aggregates, rows.len());
        Job {
            idx,
            rows,
            num_aggregates,
            evaluator,
            dictionary: LocalDictionary::default(),
            states,
        }
    }

    pub fn num_groups(&self) -> usize {
        self.dictionary.len()
    }

    /// Group every row in this job's range.
    pub fn scan(&mut self, table: &dyn ResultTable, aggregates: &[AggregateExpr]) {
        debug_assert_eq!(self.num_aggregates, aggregates.len());

        for row in self.rows.clone() {
            let (ordinal, created) =
                self.dictionary
                    .find_or_insert(&mut self.evaluator, table, row);
            if created {
                self.states.push_group();
            }
            debug_assert_eq!(self.dictionary.len(), self.states.num_groups());

            self.states.update(aggregates, table, row, ordinal);
        }

        trace!(
            job = self.idx,
            rows = self.rows.len(),
            groups = self.dictionary.len(),
            "scanned job"
        );
    }

    /// Merge all groups from `other` into this job.
    ///
    /// `other`'s ordinals are remapped into this job's ordinal space. Groups
    /// already present are folded, new groups are moved over unmodified.
    pub fn merge_from(&mut self, aggregates: &[AggregateExpr], mut other: Job<S>) -> Result<()> {
        if self.num_aggregates != other.num_aggregates {
            return Err(DbError::new("Cannot merge jobs with different aggregates")
                .with_field("left", self.num_aggregates)
                .with_field("right", other.num_aggregates));
        }

        let other_groups = other.dictionary.len();
        self.states.reserve(other_groups);

        for (source_ordinal, key) in other.dictionary.into_keys().into_iter().enumerate() {
            match self.dictionary.find_key(&key) {
                Some(ordinal) => {
                    self.states
                        .merge_group(aggregates, ordinal, &other.states, source_ordinal);
                }
                None => {
                    let ordinal = self.dictionary.insert_key(key);
                    let state_ordinal =
                        self.states
                            .append_group(aggregates, &mut other.states, source_ordinal);
                    debug_assert_eq!(ordinal, state_ordinal);
                }
            }
        }

        self.rows = usize::min(self.rows.start, other.rows.start)
            ..usize::max(self.rows.end, other.rows.end);

        trace!(
            job = self.idx,
            merged = other.idx,
            merged_groups = other_groups,
            groups = self.dictionary.len(),
            "merged jobs"
        );

        Ok(())
    }

    /// Flush all groups into a shared dictionary.
    ///
    /// Groups not yet in the dictionary are donated as-is, groups already
    /// present are folded in with thread-safe merges. Returns the number of
    /// groups donated.
    pub fn flush_into_global(
        mut self,
        aggregates: &[AggregateExpr],
        global: &GlobalDictionary,
    ) -> usize {
        let num_groups = self.dictionary.len();
        let mut donated = 0;

        for (ordinal, key) in self.dictionary.into_keys().into_iter().enumerate() {
            match global.try_insert_with(key, || self.states.take_buckets(ordinal)) {
                None => donated += 1,
                Some(existing) => {
                    self.states
                        .merge_into_buckets_thread_safe(aggregates, ordinal, &existing);
                }
            }
        }

        trace!(
            job = self.idx,
            groups = num_groups,
            donated,
            "flushed job to global dictionary"
        );

        donated
    }

    pub fn into_parts(self) -> (Vec<GroupKey>, S) {
        (self.dictionary.into_keys(), self.states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExpr;
    use crate::functions::aggregate::AggregateKind;
    use crate::grouping::states::{ArrayStates, BucketStates, ListStates, StateView};
    use crate::scalar::{DataType, ScalarValue};
    use crate::table::MaterializedTable;

    #[test]
    fn partition_even() {
        let ranges = partition_rows(9, 3).unwrap();
        assert_eq!(vec![0..3, 3..6, 6..9], ranges);
    }

    #[test]
    fn partition_last_absorbs_remainder() {
        let ranges = partition_rows(11, 3).unwrap();
        assert_eq!(vec![0..3, 3..6, 6..11], ranges);
    }

    #[test]
    fn partition_zero_share() {
        let err = partition_rows(2, 3).unwrap_err();
        assert_eq!(Some("2"), err.get_field("rows"));
        assert_eq!(Some("3"), err.get_field("threads"));

        partition_rows(5, 0).unwrap_err();
    }

    fn table() -> MaterializedTable {
        // (k, v)
        MaterializedTable::try_new(
            2,
            [(1, 10), (2, 5), (1, 20), (3, 1), (2, 2), (1, 3)]
                .into_iter()
                .map(|(k, v)| vec![ScalarValue::Int64(k), ScalarValue::Int64(v)])
                .collect(),
        )
        .unwrap()
    }

    fn evaluator() -> RowKeyEvaluator {
        RowKeyEvaluator::new(vec![ColumnExpr::new(0, DataType::Int64).into_ref()])
    }

    fn sum_v() -> Vec<AggregateExpr> {
        vec![
            AggregateExpr::try_new(
                AggregateKind::Sum,
                Some(ColumnExpr::new(1, DataType::Int64).into_ref()),
            )
            .unwrap(),
        ]
    }

    fn sums<S: LocalStates>(job: Job<S>, aggs: &[AggregateExpr]) -> Vec<(ScalarValue, ScalarValue)> {
        let (keys, states) = job.into_parts();
        let mut out: Vec<_> = keys
            .iter()
            .enumerate()
            .map(|(ordinal, key)| {
                let sum = aggs[0].finalize(&states.load(0, ordinal));
                (key.values[0].clone(), sum)
            })
            .collect();
        out.sort_by(|a, b| a.0.sort_cmp(&b.0));
        out
    }

    fn scan_and_merge<S: LocalStates>() {
        let table = table();
        let aggs = sum_v();

        let mut a = Job::<S>::new(0, 0..3, evaluator(), aggs.len());
        let mut b = Job::<S>::new(1, 3..6, evaluator(), aggs.len());
        a.scan(&table, &aggs);
        b.scan(&table, &aggs);
        assert_eq!(2, a.num_groups());
        assert_eq!(3, b.num_groups());

        a.merge_from(&aggs, b).unwrap();
        assert_eq!(0..6, a.rows);

        assert_eq!(
            vec![
                (ScalarValue::Int64(1), ScalarValue::Int64(33)),
                (ScalarValue::Int64(2), ScalarValue::Int64(7)),
                (ScalarValue::Int64(3), ScalarValue::Int64(1)),
            ],
            sums(a, &aggs)
        );
    }

    #[test]
    fn scan_and_merge_buckets() {
        scan_and_merge::<BucketStates>();
    }

    #[test]
    fn scan_and_merge_lists() {
        scan_and_merge::<ListStates>();
    }

    #[test]
    fn scan_and_merge_arrays() {
        scan_and_merge::<ArrayStates>();
    }

    #[test]
    fn merge_mismatched_aggregates() {
        let aggs = sum_v();
        let mut a = Job::<ListStates>::new(0, 0..3, evaluator(), 1);
        let b = Job::<ListStates>::new(1, 3..6, evaluator(), 2);
        a.merge_from(&aggs, b).unwrap_err();
    }

    #[test]
    fn flush_donates_then_merges() {
        let table = table();
        let aggs = sum_v();
        let global = GlobalDictionary::new();

        let mut a = Job::<ListStates>::new(0, 0..3, evaluator(), aggs.len());
        let mut b = Job::<ListStates>::new(1, 3..6, evaluator(), aggs.len());
        a.scan(&table, &aggs);
        b.scan(&table, &aggs);

        assert_eq!(2, a.flush_into_global(&aggs, &global));
        // Only key 3 is new.
        assert_eq!(1, b.flush_into_global(&aggs, &global));

        let mut groups: Vec<_> = global
            .into_groups()
            .into_iter()
            .map(|(key, buckets)| (key.values[0].clone(), aggs[0].finalize(&buckets[0].load())))
            .collect();
        groups.sort_by(|a, b| a.0.sort_cmp(&b.0));

        assert_eq!(
            vec![
                (ScalarValue::Int64(1), ScalarValue::Int64(33)),
                (ScalarValue::Int64(2), ScalarValue::Int64(7)),
                (ScalarValue::Int64(3), ScalarValue::Int64(1)),
            ],
            groups
        );
    }
}
