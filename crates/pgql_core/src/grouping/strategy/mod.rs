//! Grouping strategies.
//!
//! Every strategy partitions the rows of a result table into one contiguous
//! range per worker, then differs in how per-worker state is combined:
//!
//! - `LocalMergeGrouper`: workers group into private dictionaries which are
//!   merged pairwise up a binary tree.
//! - `LocalGlobalMergeGrouper`: workers group into private dictionaries then
//!   flush them into a shared dictionary.
//! - `GlobalMergeGrouper`: workers group straight into a shared dictionary.
//!
//! A single thread never builds a pool and never merges.

mod global_merge;
mod local_global_merge;
mod local_merge;

use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::{Arc, LazyLock};

pub use global_merge::GlobalMergeGrouper;
pub use local_global_merge::LocalGlobalMergeGrouper;
pub use local_merge::LocalMergeGrouper;
use pgql_error::{DbError, Result};

use super::job::Job;
use super::key::RowKeyEvaluator;
use super::results::GroupResults;
use super::states::{ArrayStates, BucketStates, ListStates, LocalStates};
use crate::config::{GroupingStrategy, StorageMode};
use crate::functions::aggregate::AggregateExpr;
use crate::table::ResultTable;

/// A grouping algorithm.
///
/// Single use, grouping consumes the grouper.
pub trait Grouper: Debug + Send {
    fn strategy(&self) -> GroupingStrategy;

    /// Group all rows in `table`.
    fn group<'a>(self: Box<Self>, table: &'a dyn ResultTable) -> Result<GroupResults<'a>>;
}

/// Inputs shared by all groupers.
#[derive(Debug, Clone)]
pub struct GrouperParams {
    pub threads: usize,
    pub aggregates: Arc<[AggregateExpr]>,
    /// Template evaluator, cloned for every worker.
    pub evaluator: RowKeyEvaluator,
    pub group_names: Arc<[String]>,
}

impl GrouperParams {
    fn create_jobs<S: LocalStates>(&self, ranges: Vec<Range<usize>>) -> Vec<Job<S>> {
        ranges
            .into_iter()
            .enumerate()
            .map(|(idx, rows)| Job::new(idx, rows, self.evaluator.clone(), self.aggregates.len()))
            .collect()
    }

    fn empty_results<'a>(&self, table: &'a dyn ResultTable) -> GroupResults<'a> {
        GroupResults::empty(table, self.aggregates.clone(), self.group_names.clone())
    }

    /// Group everything with a single job, no pool and no merging.
    fn group_single<'a, S: LocalStates>(
        &self,
        table: &'a dyn ResultTable,
        rows: Range<usize>,
    ) -> GroupResults<'a> {
        let mut job = Job::<S>::new(0, rows, self.evaluator.clone(), self.aggregates.len());
        job.scan(table, &self.aggregates);
        let (keys, states) = job.into_parts();

        GroupResults::new(
            table,
            self.aggregates.clone(),
            self.group_names.clone(),
            keys,
            Box::new(states),
        )
    }
}

/// Constructs a grouper for a storage mode.
pub type GrouperFactory = fn(params: GrouperParams, storage: StorageMode) -> Box<dyn Grouper>;

fn insert_factory(
    map: &mut HashMap<GroupingStrategy, GrouperFactory>,
    strategy: GroupingStrategy,
    factory: GrouperFactory,
) {
    if map.insert(strategy, factory).is_some() {
        panic!("Duplicate grouper factory: {strategy}");
    }
}

static GROUPER_FACTORIES: LazyLock<HashMap<GroupingStrategy, GrouperFactory>> =
    LazyLock::new(|| {
        let mut map = HashMap::new();

        insert_factory(&mut map, GroupingStrategy::LocalMerge, local_merge_factory);
        insert_factory(
            &mut map,
            GroupingStrategy::LocalGlobalMerge,
            local_global_merge_factory,
        );
        insert_factory(&mut map, GroupingStrategy::GlobalMerge, global_merge_factory);

        map
    });

fn local_merge_factory(params: GrouperParams, storage: StorageMode) -> Box<dyn Grouper> {
    match storage {
        StorageMode::Bucket => Box::new(LocalMergeGrouper::<BucketStates>::new(params)),
        StorageMode::List => Box::new(LocalMergeGrouper::<ListStates>::new(params)),
        StorageMode::Array => Box::new(LocalMergeGrouper::<ArrayStates>::new(params)),
    }
}

fn local_global_merge_factory(params: GrouperParams, storage: StorageMode) -> Box<dyn Grouper> {
    match storage {
        StorageMode::Bucket => Box::new(LocalGlobalMergeGrouper::<BucketStates>::new(params)),
        StorageMode::List => Box::new(LocalGlobalMergeGrouper::<ListStates>::new(params)),
        StorageMode::Array => Box::new(LocalGlobalMergeGrouper::<ArrayStates>::new(params)),
    }
}

/// Global merging always aggregates into shared buckets.
fn global_merge_factory(params: GrouperParams, _storage: StorageMode) -> Box<dyn Grouper> {
    Box::new(GlobalMergeGrouper::new(params))
}

/// Create a grouper for a strategy using the registered factory.
pub fn new_grouper(
    strategy: GroupingStrategy,
    storage: StorageMode,
    params: GrouperParams,
) -> Result<Box<dyn Grouper>> {
    let factory = GROUPER_FACTORIES
        .get(&strategy)
        .ok_or_else(|| DbError::new("Missing grouper factory").with_field("strategy", strategy))?;
    Ok(factory(params, storage))
}
