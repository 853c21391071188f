use std::fmt;
use std::marker::PhantomData;

use pgql_error::{OptionExt, Result};
use tracing::debug;

use super::{Grouper, GrouperParams};
use crate::config::GroupingStrategy;
use crate::functions::aggregate::AggregateExpr;
use crate::grouping::job::{Job, partition_rows};
use crate::grouping::results::GroupResults;
use crate::grouping::states::LocalStates;
use crate::runtime::WorkerPool;
use crate::table::ResultTable;

/// Subtrees with at most this many jobs scan their jobs concurrently then
/// merge them sequentially.
const LEAF_JOBS: usize = 3;

/// Groups rows into per-worker dictionaries, then merges the dictionaries
/// pairwise up a balanced binary tree.
///
/// No state is shared during the scan. Merge depth is logarithmic in the
/// number of workers.
pub struct LocalMergeGrouper<S> {
    params: GrouperParams,
    _states: PhantomData<fn() -> S>,
}

impl<S: LocalStates> fmt::Debug for LocalMergeGrouper<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalMergeGrouper")
            .field("threads", &self.params.threads)
            .field("storage", &S::MODE)
            .finish_non_exhaustive()
    }
}

impl<S: LocalStates> LocalMergeGrouper<S> {
    pub fn new(params: GrouperParams) -> Self {
        LocalMergeGrouper {
            params,
            _states: PhantomData,
        }
    }
}

impl<S: LocalStates> Grouper for LocalMergeGrouper<S> {
    fn strategy(&self) -> GroupingStrategy {
        GroupingStrategy::LocalMerge
    }

    fn group<'a>(self: Box<Self>, table: &'a dyn ResultTable) -> Result<GroupResults<'a>> {
        let params = self.params;
        let row_count = table.row_count();

        debug!(
            rows = row_count,
            threads = params.threads,
            storage = %S::MODE,
            "grouping with local merge"
        );

        if row_count == 0 {
            return Ok(params.empty_results(table));
        }

        let ranges = partition_rows(row_count, params.threads)?;
        if params.threads == 1 {
            return Ok(params.group_single::<S>(table, 0..row_count));
        }

        let jobs = params.create_jobs::<S>(ranges);
        let pool = WorkerPool::try_new(params.threads)?;
        let aggregates = &params.aggregates;
        let job = pool.install(|| merge_tree(table, aggregates, jobs))?;

        debug!(groups = job.num_groups(), "local merge complete");

        let (keys, states) = job.into_parts();
        Ok(GroupResults::new(
            table,
            params.aggregates.clone(),
            params.group_names.clone(),
            keys,
            Box::new(states),
        ))
    }
}

/// Scan and merge a set of jobs into a single job.
///
/// The left half of the jobs is merged on the current worker while the right
/// half is forked, then the right result is folded into the left.
fn merge_tree<S: LocalStates>(
    table: &dyn ResultTable,
    aggregates: &[AggregateExpr],
    mut jobs: Vec<Job<S>>,
) -> Result<Job<S>> {
    if jobs.len() <= LEAF_JOBS {
        rayon::scope(|s| {
            for job in jobs.iter_mut() {
                s.spawn(move |_| job.scan(table, aggregates));
            }
        });

        let mut jobs = jobs.into_iter();
        let mut target = jobs.next().required("at least one job to merge")?;
        for job in jobs {
            target.merge_from(aggregates, job)?;
        }
        return Ok(target);
    }

    let right = jobs.split_off(jobs.len() / 2);
    let (left, right) = rayon::join(
        || merge_tree(table, aggregates, jobs),
        || merge_tree(table, aggregates, right),
    );

    let mut left = left?;
    left.merge_from(aggregates, right?)?;

    Ok(left)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::expr::ColumnExpr;
    use crate::functions::aggregate::AggregateKind;
    use crate::grouping::key::RowKeyEvaluator;
    use crate::grouping::states::{ArrayStates, BucketStates, ListStates};
    use crate::scalar::{DataType, ScalarValue};
    use crate::table::MaterializedTable;

    fn table(rows: usize) -> MaterializedTable {
        MaterializedTable::try_new(
            2,
            (0..rows as i64)
                .map(|i| vec![ScalarValue::Int64(i % 5), ScalarValue::Int64(i)])
                .collect(),
        )
        .unwrap()
    }

    fn params(threads: usize) -> GrouperParams {
        GrouperParams {
            threads,
            aggregates: Arc::from(vec![
                AggregateExpr::try_new(
                    AggregateKind::Sum,
                    Some(ColumnExpr::new(1, DataType::Int64).into_ref()),
                )
                .unwrap(),
                AggregateExpr::count_star(),
            ]),
            evaluator: RowKeyEvaluator::new(vec![
                ColumnExpr::new(0, DataType::Int64).into_ref(),
            ]),
            group_names: Arc::from(vec!["#0".to_string()]),
        }
    }

    fn expected(rows: usize) -> Vec<(Vec<ScalarValue>, Vec<ScalarValue>)> {
        (0..5_i64)
            .map(|k| {
                let members: Vec<i64> = (0..rows as i64).filter(|i| i % 5 == k).collect();
                (
                    vec![ScalarValue::Int64(k)],
                    vec![
                        ScalarValue::Int64(members.iter().sum()),
                        ScalarValue::Int64(members.len() as i64),
                    ],
                )
            })
            .collect()
    }

    fn check<S: LocalStates>() {
        let table = table(100);
        // Covers leaf-only trees (2, 3) and trees with inner merges.
        for threads in [1, 2, 3, 4, 7, 16] {
            let grouper = Box::new(LocalMergeGrouper::<S>::new(params(threads)));
            let results = grouper.group(&table).unwrap();
            assert_eq!(expected(100), results.to_sorted_rows(), "threads: {threads}");
        }
    }

    #[test]
    fn buckets() {
        check::<BucketStates>();
    }

    #[test]
    fn lists() {
        check::<ListStates>();
    }

    #[test]
    fn arrays() {
        check::<ArrayStates>();
    }

    #[test]
    fn more_threads_than_rows() {
        let table = table(3);
        let grouper = Box::new(LocalMergeGrouper::<ListStates>::new(params(4)));
        grouper.group(&table).unwrap_err();
    }
}
