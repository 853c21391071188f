use pgql_error::{DbError, Result};

use crate::scalar::{DataType, ScalarValue};

/// Numeric domain an aggregate folds its inputs in.
///
/// All aggregate state is stored as raw `u64` bits so that the same cells can
/// back both single-threaded and atomic updates. Integers are stored as two's
/// complement, floats by their IEEE bit pattern. Zero bits are zero in both
/// domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericType {
    Int64,
    Float64,
}

impl NumericType {
    pub fn try_from_datatype(datatype: DataType) -> Result<Self> {
        match datatype {
            DataType::Int64 => Ok(NumericType::Int64),
            DataType::Float64 => Ok(NumericType::Float64),
            other => Err(DbError::new("Expected a numeric type").with_field("datatype", other)),
        }
    }

    pub const fn datatype(&self) -> DataType {
        match self {
            Self::Int64 => DataType::Int64,
            Self::Float64 => DataType::Float64,
        }
    }

    /// Encode a value into this domain.
    ///
    /// Returns None if the value can't be represented, which callers treat as
    /// an evaluation miss.
    pub fn encode(&self, value: &ScalarValue) -> Option<u64> {
        match (self, value) {
            (Self::Int64, ScalarValue::Int64(v)) => Some(*v as u64),
            (Self::Float64, ScalarValue::Float64(v)) => Some(v.to_bits()),
            (Self::Float64, ScalarValue::Int64(v)) => Some((*v as f64).to_bits()),
            _ => None,
        }
    }

    pub fn decode(&self, bits: u64) -> ScalarValue {
        match self {
            Self::Int64 => ScalarValue::Int64(bits as i64),
            Self::Float64 => ScalarValue::Float64(f64::from_bits(bits)),
        }
    }

    pub fn to_f64(&self, bits: u64) -> f64 {
        match self {
            Self::Int64 => bits as i64 as f64,
            Self::Float64 => f64::from_bits(bits),
        }
    }

    /// Add two encoded values.
    ///
    /// Integer addition wraps, matching `AtomicU64::fetch_add`.
    pub fn add(&self, a: u64, b: u64) -> u64 {
        match self {
            Self::Int64 => a.wrapping_add(b),
            Self::Float64 => (f64::from_bits(a) + f64::from_bits(b)).to_bits(),
        }
    }

    /// Total order over encoded values.
    ///
    /// Floats use `total_cmp`, NaN sorts above infinity.
    pub fn less_than(&self, a: u64, b: u64) -> bool {
        match self {
            Self::Int64 => (a as i64) < (b as i64),
            Self::Float64 => f64::from_bits(a).total_cmp(&f64::from_bits(b)).is_lt(),
        }
    }
}
