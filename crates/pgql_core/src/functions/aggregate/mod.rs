pub mod numeric;
pub mod storage;

use std::fmt;
use std::str::FromStr;

use numeric::NumericType;
use pgql_error::{DbError, Result};
use storage::{AggregateArray, AggregateBucket, AggregateList, PartialAggregate};

use crate::expr::ExpressionRef;
use crate::scalar::{DataType, ScalarValue};
use crate::table::ResultTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AggregateKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return Err(DbError::new(format!("Unknown aggregate function '{s}'"))),
        })
    }
}

/// Stateless description of how an aggregate folds values.
///
/// All mutable state lives in the storage the function is applied against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateFunction {
    pub kind: AggregateKind,
    pub numeric: NumericType,
}

impl AggregateFunction {
    pub const fn return_type(&self) -> DataType {
        match self.kind {
            AggregateKind::Count => DataType::Int64,
            AggregateKind::Avg => DataType::Float64,
            AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max => {
                self.numeric.datatype()
            }
        }
    }

    /// If `candidate` should replace `current` for min/max.
    pub fn improves(&self, candidate: u64, current: u64) -> bool {
        match self.kind {
            AggregateKind::Min => self.numeric.less_than(candidate, current),
            AggregateKind::Max => self.numeric.less_than(current, candidate),
            _ => false,
        }
    }

    /// Fold a single encoded input into a state.
    pub fn update(&self, state: &mut PartialAggregate, input: u64) {
        match self.kind {
            AggregateKind::Count => (),
            AggregateKind::Sum | AggregateKind::Avg => {
                state.value = self.numeric.add(state.value, input);
            }
            AggregateKind::Min | AggregateKind::Max => {
                if !state.is_set || self.improves(input, state.value) {
                    state.value = input;
                    state.is_set = true;
                }
            }
        }
        state.count += 1;
    }

    /// Fold `other` into `state`.
    pub fn merge(&self, state: &mut PartialAggregate, other: &PartialAggregate) {
        match self.kind {
            AggregateKind::Count => (),
            AggregateKind::Sum | AggregateKind::Avg => {
                if other.count == 0 {
                    return;
                }
                state.value = self.numeric.add(state.value, other.value);
            }
            AggregateKind::Min | AggregateKind::Max => {
                if !other.is_set {
                    return;
                }
                if !state.is_set || self.improves(other.value, state.value) {
                    state.value = other.value;
                    state.is_set = true;
                }
            }
        }
        state.count += other.count;
    }

    /// Produce the final value for a state.
    ///
    /// Averages are only divided here.
    pub fn finalize(&self, state: &PartialAggregate) -> ScalarValue {
        match self.kind {
            AggregateKind::Count => ScalarValue::Int64(state.count as i64),
            AggregateKind::Sum => {
                if state.count == 0 {
                    ScalarValue::Null
                } else {
                    self.numeric.decode(state.value)
                }
            }
            AggregateKind::Avg => {
                if state.count == 0 {
                    ScalarValue::Null
                } else {
                    ScalarValue::Float64(self.numeric.to_f64(state.value) / state.count as f64)
                }
            }
            AggregateKind::Min | AggregateKind::Max => {
                if state.is_set {
                    self.numeric.decode(state.value)
                } else {
                    ScalarValue::Null
                }
            }
        }
    }
}

/// An aggregate function bound to its input expression.
#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub function: AggregateFunction,
    /// Input expression. None only for `count`, meaning count every row.
    pub input: Option<ExpressionRef>,
}

impl AggregateExpr {
    pub fn try_new(kind: AggregateKind, input: Option<ExpressionRef>) -> Result<Self> {
        let numeric = match (&input, kind) {
            (None, AggregateKind::Count) => NumericType::Int64,
            (None, kind) => {
                return Err(DbError::new("Aggregate requires an input expression")
                    .with_field("function", kind));
            }
            (Some(_), AggregateKind::Count) => NumericType::Int64,
            (Some(expr), kind) => {
                let datatype = expr.datatype();
                let numeric = NumericType::try_from_datatype(datatype).map_err(|_| {
                    DbError::new("Aggregate requires a numeric input")
                        .with_field("function", kind)
                        .with_field("datatype", datatype)
                })?;
                // Averages accumulate in f64, integer inputs are widened on
                // encode and never wrap.
                if kind == AggregateKind::Avg {
                    NumericType::Float64
                } else {
                    numeric
                }
            }
        };

        Ok(AggregateExpr {
            function: AggregateFunction { kind, numeric },
            input,
        })
    }

    /// `count(*)`
    pub fn count_star() -> Self {
        AggregateExpr {
            function: AggregateFunction {
                kind: AggregateKind::Count,
                numeric: NumericType::Int64,
            },
            input: None,
        }
    }

    pub fn name(&self) -> String {
        match &self.input {
            Some(input) => format!("{}({})", self.function.kind, input.name()),
            None => format!("{}(*)", self.function.kind),
        }
    }

    pub const fn return_type(&self) -> DataType {
        self.function.return_type()
    }

    /// Evaluate the input for a row, encoding it for the state.
    ///
    /// None means the row contributes nothing.
    pub fn eval_input(&self, table: &dyn ResultTable, row: usize) -> Option<u64> {
        match &self.input {
            None => Some(0),
            Some(expr) => {
                let value = expr.eval(table, row)?;
                match self.function.kind {
                    AggregateKind::Count => Some(0),
                    _ => self.function.numeric.encode(&value),
                }
            }
        }
    }

    pub fn apply_bucket(&self, table: &dyn ResultTable, row: usize, bucket: &mut AggregateBucket) {
        if let Some(input) = self.eval_input(table, row) {
            bucket.update(&self.function, input);
        }
    }

    /// Same as `apply_bucket`, but safe to call concurrently against the same
    /// bucket.
    pub fn apply_bucket_thread_safe(
        &self,
        table: &dyn ResultTable,
        row: usize,
        bucket: &AggregateBucket,
    ) {
        if let Some(input) = self.eval_input(table, row) {
            bucket.update_thread_safe(&self.function, input);
        }
    }

    pub fn apply_list(
        &self,
        table: &dyn ResultTable,
        row: usize,
        list: &mut AggregateList,
        ordinal: usize,
    ) {
        // The slot is created even when the row misses so the group exists
        // with an empty state.
        let state = list.get_or_create_mut(ordinal);
        if let Some(input) = self.eval_input(table, row) {
            self.function.update(state, input);
        }
    }

    pub fn apply_array(
        &self,
        table: &dyn ResultTable,
        row: usize,
        array: &mut AggregateArray,
        ordinal: usize,
    ) {
        let state = array.get_mut(ordinal);
        if let Some(input) = self.eval_input(table, row) {
            self.function.update(state, input);
        }
    }

    pub fn merge_buckets(&self, target: &mut AggregateBucket, source: &AggregateBucket) {
        target.merge(&self.function, &source.load());
    }

    pub fn merge_buckets_thread_safe(&self, target: &AggregateBucket, source: &AggregateBucket) {
        target.merge_thread_safe(&self.function, &source.load());
    }

    pub fn merge_lists(
        &self,
        target: &mut AggregateList,
        target_ordinal: usize,
        source: &AggregateList,
        source_ordinal: usize,
    ) {
        let other = source.get(source_ordinal);
        self.function
            .merge(target.get_or_create_mut(target_ordinal), &other);
    }

    pub fn merge_arrays(
        &self,
        target: &mut AggregateArray,
        target_ordinal: usize,
        source: &AggregateArray,
        source_ordinal: usize,
    ) {
        let other = source.get(source_ordinal);
        self.function.merge(target.get_mut(target_ordinal), &other);
    }

    /// Merge a list position into a shared bucket.
    pub fn merge_list_into_bucket_thread_safe(
        &self,
        target: &AggregateBucket,
        source: &AggregateList,
        source_ordinal: usize,
    ) {
        target.merge_thread_safe(&self.function, &source.get(source_ordinal));
    }

    /// Merge an array position into a shared bucket.
    pub fn merge_array_into_bucket_thread_safe(
        &self,
        target: &AggregateBucket,
        source: &AggregateArray,
        source_ordinal: usize,
    ) {
        target.merge_thread_safe(&self.function, &source.get(source_ordinal));
    }

    pub fn finalize(&self, state: &PartialAggregate) -> ScalarValue {
        self.function.finalize(state)
    }
}
