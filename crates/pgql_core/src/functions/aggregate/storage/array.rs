use super::PartialAggregate;

/// Fixed capacity per-aggregate state array indexed by group ordinal.
///
/// Used when the number of groups a job can discover is bounded by the size of
/// its row range. Capacity only changes through `grow`, which merges use when
/// combining two bounded ranges.
#[derive(Debug, Clone)]
pub struct AggregateArray {
    states: Box<[PartialAggregate]>,
    /// Highest ordinal touched plus one.
    len: usize,
}

impl AggregateArray {
    pub fn with_capacity(capacity: usize) -> Self {
        AggregateArray {
            states: vec![PartialAggregate::default(); capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.states.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, ordinal: usize) -> PartialAggregate {
        self.states.get(ordinal).copied().unwrap_or_default()
    }

    /// Get a mutable state.
    ///
    /// Panics if `ordinal` is beyond capacity. Callers size the array to the
    /// row range so that can't happen.
    pub fn get_mut(&mut self, ordinal: usize) -> &mut PartialAggregate {
        debug_assert!(
            ordinal < self.states.len(),
            "ordinal {ordinal} out of bounds for capacity {}",
            self.states.len()
        );
        self.len = usize::max(self.len, ordinal + 1);
        &mut self.states[ordinal]
    }

    /// Grow capacity by `additional` empty slots.
    pub fn grow(&mut self, additional: usize) {
        if additional == 0 {
            return;
        }
        let mut states = std::mem::take(&mut self.states).into_vec();
        states.resize(states.len() + additional, PartialAggregate::default());
        self.states = states.into_boxed_slice();
    }
}
