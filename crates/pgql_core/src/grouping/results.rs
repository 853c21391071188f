use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::key::GroupKey;
use super::states::StateView;
use crate::functions::aggregate::AggregateExpr;
use crate::scalar::ScalarValue;
use crate::table::ResultTable;

/// Output of a grouping run.
///
/// Holds the final group keys alongside the aggregate state they index into.
/// Aggregate values are finalized on read, reading never mutates anything.
pub struct GroupResults<'a> {
    table: &'a dyn ResultTable,
    aggregates: Arc<[AggregateExpr]>,
    group_names: Arc<[String]>,
    /// Keys indexed by group ordinal into `states`.
    keys: Vec<GroupKey>,
    states: Box<dyn StateView>,
}

impl fmt::Debug for GroupResults<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupResults")
            .field("num_groups", &self.keys.len())
            .field("group_names", &self.group_names)
            .field("aggregate_names", &self.aggregate_names())
            .finish_non_exhaustive()
    }
}

impl<'a> GroupResults<'a> {
    pub(crate) fn new(
        table: &'a dyn ResultTable,
        aggregates: Arc<[AggregateExpr]>,
        group_names: Arc<[String]>,
        keys: Vec<GroupKey>,
        states: Box<dyn StateView>,
    ) -> Self {
        GroupResults {
            table,
            aggregates,
            group_names,
            keys,
            states,
        }
    }

    /// Results containing no groups.
    pub(crate) fn empty(
        table: &'a dyn ResultTable,
        aggregates: Arc<[AggregateExpr]>,
        group_names: Arc<[String]>,
    ) -> Self {
        Self::new(
            table,
            aggregates,
            group_names,
            Vec::new(),
            Box::new(super::states::SharedBucketStates { groups: Vec::new() }),
        )
    }

    pub fn num_groups(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The table representative rows point into.
    pub fn table(&self) -> &'a dyn ResultTable {
        self.table
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub fn aggregate_names(&self) -> Vec<String> {
        self.aggregates.iter().map(|agg| agg.name()).collect()
    }

    pub fn group(&self, idx: usize) -> Option<GroupRow<'_>> {
        let key = self.keys.get(idx)?;
        Some(GroupRow {
            table: self.table,
            key,
            ordinal: idx,
            aggregates: &self.aggregates,
            states: self.states.as_ref(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = GroupRow<'_>> + '_ {
        (0..self.keys.len()).filter_map(|idx| self.group(idx))
    }

    /// All groups as (key values, aggregate values), sorted by key values.
    pub fn to_sorted_rows(&self) -> Vec<(Vec<ScalarValue>, Vec<ScalarValue>)> {
        let mut rows: Vec<_> = self
            .iter()
            .map(|group| (group.key_values().to_vec(), group.aggregates()))
            .collect();
        rows.sort_by(|(a, _), (b, _)| compare_keys(a, b));
        rows
    }
}

fn compare_keys(a: &[ScalarValue], b: &[ScalarValue]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(a, b)| a.sort_cmp(b))
        .find(|ord| ord.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

/// A single group in the results.
#[derive(Clone, Copy)]
pub struct GroupRow<'r> {
    table: &'r dyn ResultTable,
    key: &'r GroupKey,
    ordinal: usize,
    aggregates: &'r [AggregateExpr],
    states: &'r dyn StateView,
}

impl fmt::Debug for GroupRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRow")
            .field("row_index", &self.key.row)
            .field("key_values", &self.key.values)
            .field("aggregates", &self.aggregates())
            .finish()
    }
}

impl<'r> GroupRow<'r> {
    /// Index of the representative row in the result table.
    pub fn row_index(&self) -> usize {
        self.key.row
    }

    /// Read a column from the representative row.
    pub fn row_value(&self, column: usize) -> Option<&'r ScalarValue> {
        self.table.value(self.key.row, column)
    }

    pub fn key_values(&self) -> &'r [ScalarValue] {
        &self.key.values
    }

    /// Final value for the aggregate at `idx`.
    pub fn aggregate(&self, idx: usize) -> Option<ScalarValue> {
        let agg = self.aggregates.get(idx)?;
        Some(agg.finalize(&self.states.load(idx, self.ordinal)))
    }

    /// Final values for all aggregates, in order.
    pub fn aggregates(&self) -> Vec<ScalarValue> {
        self.aggregates
            .iter()
            .enumerate()
            .map(|(idx, agg)| agg.finalize(&self.states.load(idx, self.ordinal)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ColumnExpr;
    use crate::functions::aggregate::AggregateKind;
    use crate::grouping::job::Job;
    use crate::grouping::key::RowKeyEvaluator;
    use crate::grouping::states::ListStates;
    use crate::scalar::DataType;
    use crate::table::MaterializedTable;

    fn table() -> MaterializedTable {
        MaterializedTable::try_new(
            2,
            [(2, 5), (1, 10), (1, 20)]
                .into_iter()
                .map(|(k, v)| vec![ScalarValue::Int64(k), ScalarValue::Int64(v)])
                .collect(),
        )
        .unwrap()
    }

    fn results(table: &MaterializedTable) -> GroupResults<'_> {
        let aggregates: Arc<[AggregateExpr]> = Arc::from(vec![
            AggregateExpr::try_new(
                AggregateKind::Sum,
                Some(ColumnExpr::new(1, DataType::Int64).with_name("v").into_ref()),
            )
            .unwrap(),
            AggregateExpr::count_star(),
        ]);
        let evaluator = RowKeyEvaluator::new(vec![
            ColumnExpr::new(0, DataType::Int64).with_name("k").into_ref(),
        ]);

        let mut job = Job::<ListStates>::new(0, 0..3, evaluator, aggregates.len());
        job.scan(table, &aggregates);
        let (keys, states) = job.into_parts();

        GroupResults::new(
            table,
            aggregates,
            Arc::from(vec!["k".to_string()]),
            keys,
            Box::new(states),
        )
    }

    #[test]
    fn discovery_order_for_single_job() {
        let table = table();
        let results = results(&table);

        assert_eq!(2, results.num_groups());
        let rows: Vec<_> = results.iter().map(|g| g.row_index()).collect();
        assert_eq!(vec![0, 1], rows);

        let first = results.group(0).unwrap();
        assert_eq!(Some(&ScalarValue::Int64(5)), first.row_value(1));
        assert_eq!(Some(ScalarValue::Int64(5)), first.aggregate(0));
        assert_eq!(None, first.aggregate(2));
    }

    #[test]
    fn sorted_rows() {
        let table = table();
        let results = results(&table);

        assert_eq!(
            vec![
                (
                    vec![ScalarValue::Int64(1)],
                    vec![ScalarValue::Int64(30), ScalarValue::Int64(2)]
                ),
                (
                    vec![ScalarValue::Int64(2)],
                    vec![ScalarValue::Int64(5), ScalarValue::Int64(1)]
                ),
            ],
            results.to_sorted_rows()
        );
    }

    #[test]
    fn reading_twice_is_identical() {
        let table = table();
        let results = results(&table);
        assert_eq!(results.to_sorted_rows(), results.to_sorted_rows());
    }

    #[test]
    fn names() {
        let table = table();
        let results = results(&table);
        assert_eq!(&["k".to_string()], results.group_names());
        assert_eq!(vec!["sum(v)", "count(*)"], results.aggregate_names());
    }

    #[test]
    fn empty_results() {
        let table = MaterializedTable::empty(2);
        let results = GroupResults::empty(
            &table,
            Arc::from(vec![AggregateExpr::count_star()]),
            Arc::from(Vec::<String>::new()),
        );
        assert!(results.is_empty());
        assert_eq!(0, results.iter().count());
        assert!(results.to_sorted_rows().is_empty());
    }
}
