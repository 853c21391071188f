//! Storage representations for per-group aggregate state.
//!
//! - `AggregateBucket`: one cell per (aggregate, group), supports atomic
//!   updates.
//! - `AggregateList`: one growable list per aggregate indexed by group ordinal.
//! - `AggregateArray`: one pre-sized array per aggregate indexed by group
//!   ordinal.
//!
//! All three hold the same logical state (`PartialAggregate`), so any of them
//! can be folded into any other.

mod array;
mod bucket;
mod list;

pub use array::AggregateArray;
pub use bucket::AggregateBucket;
pub use list::AggregateList;

/// Plain (non-atomic) aggregate state for a single group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialAggregate {
    /// Running sum for sum/avg, current extremum for min/max. Encoded in the
    /// aggregate's numeric domain.
    pub value: u64,
    /// Number of inputs that contributed to this state.
    pub count: u64,
    /// If `value` holds a real min/max value.
    pub is_set: bool,
}
