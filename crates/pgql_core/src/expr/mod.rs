//! Scalar expressions evaluated against result rows.
//!
//! Expressions are produced by query analysis, grouping only evaluates them.

use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::scalar::{DataType, ScalarValue};
use crate::table::ResultTable;

/// An expression that can be evaluated against a single row.
pub trait RowExpression: Debug + Sync + Send {
    /// The type this expression produces when evaluation succeeds.
    fn datatype(&self) -> DataType;

    /// Evaluate the expression for `row`.
    ///
    /// Returns None when evaluation fails for this row (missing property, type
    /// mismatch, null). Failure is a normal per-row outcome, not an error.
    fn eval(&self, table: &dyn ResultTable, row: usize) -> Option<ScalarValue>;

    /// Name used when printing this expression as an output column.
    fn name(&self) -> String {
        format!("{self:?}")
    }
}

/// Shared handle to an expression.
pub type ExpressionRef = Arc<dyn RowExpression>;

/// Reference to a column of the result table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnExpr {
    pub column: usize,
    pub datatype: DataType,
    pub name: Option<String>,
}

impl ColumnExpr {
    pub fn new(column: usize, datatype: DataType) -> Self {
        ColumnExpr {
            column,
            datatype,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn into_ref(self) -> ExpressionRef {
        Arc::new(self)
    }
}

impl RowExpression for ColumnExpr {
    fn datatype(&self) -> DataType {
        self.datatype
    }

    fn eval(&self, table: &dyn ResultTable, row: usize) -> Option<ScalarValue> {
        match table.value(row, self.column)? {
            ScalarValue::Null => None,
            v => Some(v.clone()),
        }
    }

    fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "#{}", self.column),
        }
    }
}

/// A constant.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub value: ScalarValue,
}

impl LiteralExpr {
    pub fn new(value: impl Into<ScalarValue>) -> Self {
        LiteralExpr {
            value: value.into(),
        }
    }

    pub fn into_ref(self) -> ExpressionRef {
        Arc::new(self)
    }
}

impl RowExpression for LiteralExpr {
    fn datatype(&self) -> DataType {
        self.value.datatype()
    }

    fn eval(&self, _table: &dyn ResultTable, _row: usize) -> Option<ScalarValue> {
        match &self.value {
            ScalarValue::Null => None,
            v => Some(v.clone()),
        }
    }

    fn name(&self) -> String {
        self.value.to_string()
    }
}
