//! In-memory entry map with deep-clone reads
//!
//! The CloneableStore is the working surface callers mutate directly.
//! Iteration order is insertion order, and that order is exactly the
//! visitation order of both save paths. Overwriting an existing key
//! keeps its original position.

use indexmap::IndexMap;
use serde_json::Value;

/// Insertion-ordered key -> value map backing a DataStore.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CloneableStore {
    entries: IndexMap<String, Value>,
}

impl CloneableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value. Returns the previous value, if any.
    /// An overwritten key keeps its insertion position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Borrow the stored value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Structurally independent deep copy of the stored value.
    ///
    /// Absent keys and stored nulls both yield None. Every representable
    /// value round-trips exactly; mutating the returned copy never touches
    /// the stored value.
    pub fn clone_value(&self, key: &str) -> Option<Value> {
        match self.entries.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        }
    }

    /// Remove a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Owned snapshot of all entries in insertion order.
    ///
    /// The incremental save loop takes one snapshot when it starts;
    /// entries inserted afterwards are not visited by that loop instance.
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
