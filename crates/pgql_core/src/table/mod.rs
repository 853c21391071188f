//! Row sources produced by pattern matching.

use std::fmt::Debug;

use pgql_error::{DbError, Result};

use crate::scalar::ScalarValue;

/// Row-indexable table of match results.
///
/// Grouping only ever reads from the table, and reads happen concurrently from
/// every worker.
pub trait ResultTable: Debug + Sync {
    /// Number of rows in the table.
    fn row_count(&self) -> usize;

    /// Number of columns per row.
    fn column_count(&self) -> usize;

    /// Get the value at the given row and column.
    ///
    /// Returns None if either index is out of bounds.
    fn value(&self, row: usize, column: usize) -> Option<&ScalarValue>;
}

/// Row-major in-memory result table.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedTable {
    num_columns: usize,
    rows: Vec<Vec<ScalarValue>>,
}

impl MaterializedTable {
    pub fn try_new(num_columns: usize, rows: Vec<Vec<ScalarValue>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != num_columns {
                return Err(DbError::new("Row has an unexpected number of columns")
                    .with_field("row", idx)
                    .with_field("expected", num_columns)
                    .with_field("got", row.len()));
            }
        }

        Ok(MaterializedTable { num_columns, rows })
    }

    pub fn empty(num_columns: usize) -> Self {
        MaterializedTable {
            num_columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<ScalarValue>) -> Result<()> {
        if row.len() != self.num_columns {
            return Err(DbError::new("Row has an unexpected number of columns")
                .with_field("expected", self.num_columns)
                .with_field("got", row.len()));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row(&self, idx: usize) -> Option<&[ScalarValue]> {
        self.rows.get(idx).map(|row| row.as_slice())
    }
}

impl ResultTable for MaterializedTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_count(&self) -> usize {
        self.num_columns
    }

    fn value(&self, row: usize, column: usize) -> Option<&ScalarValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_rows() {
        let rows = vec![
            vec![ScalarValue::Int64(1), ScalarValue::Int64(2)],
            vec![ScalarValue::Int64(1)],
        ];
        let err = MaterializedTable::try_new(2, rows).unwrap_err();
        assert_eq!(Some("1"), err.get_field("row"));
    }

    #[test]
    fn value_out_of_bounds() {
        let table =
            MaterializedTable::try_new(1, vec![vec![ScalarValue::Int64(4)]]).unwrap();
        assert_eq!(Some(&ScalarValue::Int64(4)), table.value(0, 0));
        assert_eq!(None, table.value(0, 1));
        assert_eq!(None, table.value(1, 0));
    }
}
