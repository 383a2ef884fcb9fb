//! Deduplication store for accepted values.

use parking_lot::RwLock;
use std::collections::HashSet;

use crate::types::Value;

/// Set of every value this node has accepted.
///
/// Grows monotonically for the lifetime of the process: values are never
/// removed and re-inserting is a no-op.
#[derive(Debug, Default)]
pub struct SeenSet {
    values: RwLock<HashSet<Value>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a value has been accepted.
    pub fn contains(&self, value: Value) -> bool {
        self.values.read().contains(&value)
    }

    /// Accept a value. Returns true only for the call that first inserted it.
    pub fn insert(&self, value: Value) -> bool {
        self.values.write().insert(value)
    }

    /// Sorted copy of every accepted value.
    pub fn snapshot(&self) -> Vec<Value> {
        let mut values: Vec<Value> = self.values.read().iter().copied().collect();
        values.sort_unstable();
        values
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}
