use super::PartialAggregate;

/// Growable per-aggregate state list indexed by group ordinal.
///
/// Slots are appended lazily the first time an ordinal is seen.
#[derive(Debug, Clone, Default)]
pub struct AggregateList {
    states: Vec<PartialAggregate>,
}

impl AggregateList {
    pub fn with_capacity(capacity: usize) -> Self {
        AggregateList {
            states: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Get the state for an ordinal, or an empty state if the ordinal hasn't
    /// been seen.
    pub fn get(&self, ordinal: usize) -> PartialAggregate {
        self.states.get(ordinal).copied().unwrap_or_default()
    }

    pub fn get_or_create_mut(&mut self, ordinal: usize) -> &mut PartialAggregate {
        if ordinal >= self.states.len() {
            self.states.resize(ordinal + 1, PartialAggregate::default());
        }
        &mut self.states[ordinal]
    }

    /// Append a state at the next ordinal, returning that ordinal.
    pub fn push(&mut self, state: PartialAggregate) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }
}
