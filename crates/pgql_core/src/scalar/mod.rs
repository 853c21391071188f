pub mod hash;

use std::fmt;

use pgql_error::{DbError, Result};

/// Logical type of a scalar value or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float64 => write!(f, "Float64"),
            Self::Utf8 => write!(f, "Utf8"),
        }
    }
}

/// A single value produced by evaluating an expression against a row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl ScalarValue {
    pub const fn datatype(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Boolean(_) => DataType::Boolean,
            Self::Int64(_) => DataType::Int64,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Equality used when comparing grouping keys.
    ///
    /// Nulls compare equal to each other, and floats compare by bit pattern to
    /// stay consistent with `hash::hash_scalar`.
    pub fn group_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            _ => false,
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int64(v) => Ok(*v),
            other => Err(DbError::new("Not an i64").with_field("value", other)),
        }
    }

    /// Total ordering used when sorting group output.
    ///
    /// Nulls sort first, then values ordered by type tag and value.
    pub fn sort_cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(v: &ScalarValue) -> u8 {
            match v {
                ScalarValue::Null => 0,
                ScalarValue::Boolean(_) => 1,
                ScalarValue::Int64(_) => 2,
                ScalarValue::Float64(_) => 3,
                ScalarValue::Utf8(_) => 4,
            }
        }

        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl<T> From<Option<T>> for ScalarValue
where
    T: Into<ScalarValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_eq_nulls_and_floats() {
        assert!(ScalarValue::Null.group_eq(&ScalarValue::Null));
        assert!(ScalarValue::Float64(f64::NAN).group_eq(&ScalarValue::Float64(f64::NAN)));
        assert!(!ScalarValue::Int64(1).group_eq(&ScalarValue::Float64(1.0)));
        assert!(!ScalarValue::Null.group_eq(&ScalarValue::Int64(0)));
    }

    #[test]
    fn display_natural_types() {
        assert_eq!("4", ScalarValue::Int64(4).to_string());
        assert_eq!("2.5", ScalarValue::Float64(2.5).to_string());
        assert_eq!("abc", ScalarValue::from("abc").to_string());
        assert_eq!("NULL", ScalarValue::from(None::<i64>).to_string());
    }

    #[test]
    fn sort_nulls_first() {
        let mut vals = vec![
            ScalarValue::Int64(3),
            ScalarValue::Null,
            ScalarValue::Int64(-1),
        ];
        vals.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::Int64(-1), ScalarValue::Int64(3)],
            vals
        );
    }
}
