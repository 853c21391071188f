pub mod dictionary;
pub mod job;
pub mod key;
pub mod results;
pub mod states;
pub mod strategy;

use std::sync::Arc;

use key::{KeyHashFn, RowKeyEvaluator};
use pgql_error::{DbError, Result};
use results::GroupResults;
use strategy::{Grouper, GrouperParams, new_grouper};

use crate::config::{GroupingConfig, GroupingStrategy};
use crate::expr::ExpressionRef;
use crate::functions::aggregate::AggregateExpr;
use crate::scalar::hash::hash_scalar;
use crate::table::ResultTable;

/// What to group by and what to compute per group.
#[derive(Debug, Clone)]
pub struct GroupingSpec {
    /// Grouping key expressions. Empty groups every row into a single group.
    pub group_exprs: Vec<ExpressionRef>,
    pub aggregates: Vec<AggregateExpr>,
    /// Hash function for individual key values.
    pub key_hash: KeyHashFn,
}

impl GroupingSpec {
    pub fn new(group_exprs: Vec<ExpressionRef>, aggregates: Vec<AggregateExpr>) -> Self {
        GroupingSpec {
            group_exprs,
            aggregates,
            key_hash: hash_scalar,
        }
    }

    pub fn with_key_hash(mut self, key_hash: KeyHashFn) -> Self {
        self.key_hash = key_hash;
        self
    }
}

/// Entry point for grouping a result table.
///
/// All configuration is validated on construction. An engine groups exactly
/// one table.
#[derive(Debug)]
pub struct GroupingEngine {
    grouper: Box<dyn Grouper>,
}

impl GroupingEngine {
    pub fn try_new(config: &GroupingConfig, spec: GroupingSpec) -> Result<Self> {
        config.validate()?;

        if spec.group_exprs.is_empty() && spec.aggregates.is_empty() {
            return Err(DbError::new(
                "Grouping requires at least one grouping expression or aggregate",
            ));
        }

        let group_names: Arc<[String]> = spec.group_exprs.iter().map(|expr| expr.name()).collect();
        let params = GrouperParams {
            threads: config.threads,
            aggregates: spec.aggregates.into(),
            evaluator: RowKeyEvaluator::with_hash_fn(spec.group_exprs, spec.key_hash),
            group_names,
        };

        let grouper = new_grouper(config.strategy, config.storage, params)?;

        Ok(GroupingEngine { grouper })
    }

    pub fn strategy(&self) -> GroupingStrategy {
        self.grouper.strategy()
    }

    /// Group every row in `table`.
    ///
    /// Errors if there are rows but fewer than one per thread.
    pub fn group(self, table: &dyn ResultTable) -> Result<GroupResults<'_>> {
        self.grouper.group(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageMode;
    use crate::expr::ColumnExpr;
    use crate::functions::aggregate::AggregateKind;
    use crate::scalar::{DataType, ScalarValue};
    use crate::table::MaterializedTable;

    #[test]
    fn zero_threads_rejected_on_construction() {
        let config = GroupingConfig::new(0, GroupingStrategy::LocalMerge, StorageMode::List);
        let spec = GroupingSpec::new(Vec::new(), vec![AggregateExpr::count_star()]);
        GroupingEngine::try_new(&config, spec).unwrap_err();
    }

    #[test]
    fn nothing_to_compute_rejected() {
        let config = GroupingConfig::new(1, GroupingStrategy::LocalMerge, StorageMode::List);
        GroupingEngine::try_new(&config, GroupingSpec::new(Vec::new(), Vec::new())).unwrap_err();
    }

    #[test]
    fn ungrouped_aggregate() {
        let table = MaterializedTable::try_new(
            1,
            (1..=10_i64).map(|v| vec![ScalarValue::Int64(v)]).collect(),
        )
        .unwrap();

        for strategy in GroupingStrategy::ALL {
            let config = GroupingConfig::new(2, strategy, StorageMode::Array);
            let spec = GroupingSpec::new(
                Vec::new(),
                vec![
                    AggregateExpr::try_new(
                        AggregateKind::Sum,
                        Some(ColumnExpr::new(0, DataType::Int64).into_ref()),
                    )
                    .unwrap(),
                ],
            );
            let engine = GroupingEngine::try_new(&config, spec).unwrap();
            assert_eq!(strategy, engine.strategy());

            let results = engine.group(&table).unwrap();
            assert_eq!(
                vec![(Vec::new(), vec![ScalarValue::Int64(55)])],
                results.to_sorted_rows()
            );
        }
    }

    #[test]
    fn group_names_from_expressions() {
        let config = GroupingConfig::new(1, GroupingStrategy::GlobalMerge, StorageMode::Bucket);
        let spec = GroupingSpec::new(
            vec![ColumnExpr::new(0, DataType::Int64).with_name("k").into_ref()],
            vec![AggregateExpr::count_star()],
        );
        let table = MaterializedTable::try_new(1, vec![vec![ScalarValue::Int64(1)]]).unwrap();
        let results = GroupingEngine::try_new(&config, spec)
            .unwrap()
            .group(&table)
            .unwrap();
        assert_eq!(&["k".to_string()], results.group_names());
    }
}
