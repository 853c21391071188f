use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use pgql_error::Result;
use tracing::{debug, trace};

use super::{Grouper, GrouperParams};
use crate::config::GroupingStrategy;
use crate::functions::aggregate::AggregateExpr;
use crate::functions::aggregate::storage::AggregateBucket;
use crate::grouping::dictionary::{GlobalDictionary, SharedBuckets};
use crate::grouping::job::partition_rows;
use crate::grouping::key::RowKeyEvaluator;
use crate::grouping::results::GroupResults;
use crate::grouping::states::SharedBucketStates;
use crate::runtime::WorkerPool;
use crate::table::ResultTable;

/// Every worker groups its rows directly into one shared dictionary, updating
/// shared buckets with atomic operations.
///
/// Works best with few distinct groups since every row goes through the shared
/// dictionary.
pub struct GlobalMergeGrouper {
    params: GrouperParams,
}

impl fmt::Debug for GlobalMergeGrouper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalMergeGrouper")
            .field("threads", &self.params.threads)
            .finish_non_exhaustive()
    }
}

impl GlobalMergeGrouper {
    pub fn new(params: GrouperParams) -> Self {
        GlobalMergeGrouper { params }
    }
}

impl Grouper for GlobalMergeGrouper {
    fn strategy(&self) -> GroupingStrategy {
        GroupingStrategy::GlobalMerge
    }

    fn group<'a>(self: Box<Self>, table: &'a dyn ResultTable) -> Result<GroupResults<'a>> {
        let params = self.params;
        let row_count = table.row_count();

        debug!(
            rows = row_count,
            threads = params.threads,
            "grouping with global merge"
        );

        if row_count == 0 {
            return Ok(params.empty_results(table));
        }

        let ranges = partition_rows(row_count, params.threads)?;
        let global = GlobalDictionary::new();
        let aggregates: &[_] = &params.aggregates;

        if params.threads == 1 {
            let mut evaluator = params.evaluator.clone();
            scan_into_global(table, aggregates, 0..row_count, &mut evaluator, &global);
        } else {
            let pool = WorkerPool::try_new(params.threads)?;
            pool.install(|| {
                rayon::scope(|s| {
                    for rows in ranges {
                        let mut evaluator = params.evaluator.clone();
                        let global = &global;
                        s.spawn(move |_| {
                            scan_into_global(table, aggregates, rows, &mut evaluator, global);
                        });
                    }
                })
            });
        }

        debug!(groups = global.len(), "global merge complete");

        let (keys, groups) = global.into_groups().into_iter().unzip();
        Ok(GroupResults::new(
            table,
            params.aggregates.clone(),
            params.group_names.clone(),
            keys,
            Box::new(SharedBucketStates { groups }),
        ))
    }
}

fn new_shared_buckets(num_aggregates: usize) -> SharedBuckets {
    (0..num_aggregates)
        .map(|_| AggregateBucket::default())
        .collect::<Arc<[_]>>()
}

fn scan_into_global(
    table: &dyn ResultTable,
    aggregates: &[AggregateExpr],
    rows: Range<usize>,
    evaluator: &mut RowKeyEvaluator,
    global: &GlobalDictionary,
) {
    let num_rows = rows.len();
    for row in rows {
        let buckets = global.get_or_insert_row(evaluator, table, row, || {
            new_shared_buckets(aggregates.len())
        });

        for (agg, bucket) in aggregates.iter().zip(buckets.iter()) {
            agg.apply_bucket_thread_safe(table, row, bucket);
        }
    }

    trace!(rows = num_rows, "scanned rows into global dictionary");
}
