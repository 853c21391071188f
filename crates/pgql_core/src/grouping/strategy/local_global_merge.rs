use std::fmt;
use std::marker::PhantomData;

use pgql_error::Result;
use tracing::debug;

use super::{Grouper, GrouperParams};
use crate::config::GroupingStrategy;
use crate::grouping::dictionary::GlobalDictionary;
use crate::grouping::job::partition_rows;
use crate::grouping::results::GroupResults;
use crate::grouping::states::{LocalStates, SharedBucketStates};
use crate::runtime::WorkerPool;
use crate::table::ResultTable;

/// Groups rows into per-worker dictionaries, then each worker flushes its
/// groups into one shared dictionary as soon as its scan completes.
///
/// The first worker to flush a group donates its state. Later workers fold
/// into that state with thread-safe merges.
pub struct LocalGlobalMergeGrouper<S> {
    params: GrouperParams,
    _states: PhantomData<fn() -> S>,
}

impl<S: LocalStates> fmt::Debug for LocalGlobalMergeGrouper<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalGlobalMergeGrouper")
            .field("threads", &self.params.threads)
            .field("storage", &S::MODE)
            .finish_non_exhaustive()
    }
}

impl<S: LocalStates> LocalGlobalMergeGrouper<S> {
    pub fn new(params: GrouperParams) -> Self {
        LocalGlobalMergeGrouper {
            params,
            _states: PhantomData,
        }
    }
}

impl<S: LocalStates> Grouper for LocalGlobalMergeGrouper<S> {
    fn strategy(&self) -> GroupingStrategy {
        GroupingStrategy::LocalGlobalMerge
    }

    fn group<'a>(self: Box<Self>, table: &'a dyn ResultTable) -> Result<GroupResults<'a>> {
        let params = self.params;
        let row_count = table.row_count();

        debug!(
            rows = row_count,
            threads = params.threads,
            storage = %S::MODE,
            "grouping with local global merge"
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
        let global = GlobalDictionary::new();
        let aggregates: &[_] = &params.aggregates;

        pool.install(|| {
            rayon::scope(|s| {
                for mut job in jobs {
                    let global = &global;
                    s.spawn(move |_| {
                        job.scan(table, aggregates);
                        job.flush_into_global(aggregates, global);
                    });
                }
            })
        });

        debug!(groups = global.len(), "local global merge complete");

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
