//! Process-local short-lived tier.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

/// In-process key/value map. Lost when the process exits.
///
/// The lock is only held for the duration of a single map operation.
#[derive(Debug, Default)]
pub struct EphemeralStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl EphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.entries.write().insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Sorted keys starting with `prefix`.
    pub fn keys(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Seed many entries at once (workflow `context`).
    pub fn extend<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.entries.write().extend(entries);
    }
}
