use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::PartialAggregate;
use crate::functions::aggregate::numeric::NumericType;
use crate::functions::aggregate::{AggregateFunction, AggregateKind};

/// A single mutable aggregate cell for one group.
///
/// Exclusive access (`&mut self`) goes through plain loads and stores on the
/// atomics. Shared access (`&self`) uses fetch-add and compare-and-swap so
/// concurrent updates to the same bucket never lose a contribution.
#[derive(Debug, Default)]
pub struct AggregateBucket {
    value: AtomicU64,
    count: AtomicU64,
    is_set: AtomicBool,
    /// Guards the first write of a min/max value.
    init: Mutex<()>,
}

impl AggregateBucket {
    pub fn from_partial(state: PartialAggregate) -> Self {
        AggregateBucket {
            value: AtomicU64::new(state.value),
            count: AtomicU64::new(state.count),
            is_set: AtomicBool::new(state.is_set),
            init: Mutex::new(()),
        }
    }

    /// Read the current state.
    ///
    /// Only consistent once all concurrent writers are done.
    pub fn load(&self) -> PartialAggregate {
        let is_set = self.is_set.load(Ordering::Acquire);
        PartialAggregate {
            value: self.value.load(Ordering::Acquire),
            count: self.count.load(Ordering::Acquire),
            is_set,
        }
    }

    fn with_partial_mut(&mut self, op: impl FnOnce(&mut PartialAggregate)) {
        let mut state = PartialAggregate {
            value: *self.value.get_mut(),
            count: *self.count.get_mut(),
            is_set: *self.is_set.get_mut(),
        };
        op(&mut state);
        *self.value.get_mut() = state.value;
        *self.count.get_mut() = state.count;
        *self.is_set.get_mut() = state.is_set;
    }

    pub fn update(&mut self, function: &AggregateFunction, input: u64) {
        self.with_partial_mut(|state| function.update(state, input));
    }

    pub fn merge(&mut self, function: &AggregateFunction, other: &PartialAggregate) {
        self.with_partial_mut(|state| function.merge(state, other));
    }

    pub fn update_thread_safe(&self, function: &AggregateFunction, input: u64) {
        match function.kind {
            AggregateKind::Count => (),
            AggregateKind::Sum | AggregateKind::Avg => self.add_value(function.numeric, input),
            AggregateKind::Min | AggregateKind::Max => self.set_extremum(function, input),
        }
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    pub fn merge_thread_safe(&self, function: &AggregateFunction, other: &PartialAggregate) {
        match function.kind {
            AggregateKind::Count => (),
            AggregateKind::Sum | AggregateKind::Avg => {
                if other.count == 0 {
                    return;
                }
                self.add_value(function.numeric, other.value);
            }
            AggregateKind::Min | AggregateKind::Max => {
                if !other.is_set {
                    return;
                }
                self.set_extremum(function, other.value);
            }
        }
        self.count.fetch_add(other.count, Ordering::AcqRel);
    }

    fn add_value(&self, numeric: NumericType, input: u64) {
        match numeric {
            // Two's complement addition on the raw bits is i64 wrapping
            // addition.
            NumericType::Int64 => {
                self.value.fetch_add(input, Ordering::AcqRel);
            }
            NumericType::Float64 => {
                let mut current = self.value.load(Ordering::Acquire);
                loop {
                    let new = numeric.add(current, input);
                    match self.value.compare_exchange_weak(
                        current,
                        new,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return,
                        Err(actual) => current = actual,
                    }
                }
            }
        }
    }

    /// Move the value toward the extremum.
    ///
    /// The first value is written under the init lock, value before flag, so
    /// no reader observes `is_set` without the value. After that the value
    /// only moves monotonically, so a candidate that doesn't improve on the
    /// current value is dropped without retrying.
    fn set_extremum(&self, function: &AggregateFunction, input: u64) {
        if !self.is_set.load(Ordering::Acquire) {
            let _guard = self.init.lock();
            if !self.is_set.load(Ordering::Acquire) {
                self.value.store(input, Ordering::Release);
                self.is_set.store(true, Ordering::Release);
                return;
            }
        }

        let mut current = self.value.load(Ordering::Acquire);
        loop {
            if !function.improves(input, current) {
                return;
            }
            match self.value.compare_exchange_weak(
                current,
                input,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
