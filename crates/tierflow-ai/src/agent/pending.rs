use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::StoreMeta;

/// An output waiting for a store confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingStore {
    pub id: Uuid,
    pub agent: String,
    pub step: Option<usize>,
    pub text: String,
    pub meta: StoreMeta,
    pub created_at: DateTime<Utc>,
}

/// How a pending store is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    Confirm { include_long: bool },
    Skip,
}

#[derive(Debug, Default)]
pub struct PendingDecisions {
    entries: Mutex<HashMap<Uuid, PendingStore>>,
}

impl PendingDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        agent: &str,
        step: Option<usize>,
        text: &str,
        meta: StoreMeta,
    ) -> PendingStore {
        let pending = PendingStore {
            id: Uuid::new_v4(),
            agent: agent.to_string(),
            step,
            text: text.to_string(),
            meta,
            created_at: Utc::now(),
        };
        self.entries.lock().insert(pending.id, pending.clone());
        pending
    }

    /// Remove and return the entry; each id resolves at most once.
    pub fn take(&self, id: Uuid) -> Option<PendingStore> {
        self.entries.lock().remove(&id)
    }

    /// Open entries, oldest first.
    pub fn list(&self) -> Vec<PendingStore> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by_key(|p| p.created_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StoreDecision;

    fn ask_meta() -> StoreMeta {
        StoreMeta {
            decision: StoreDecision::Ask,
            stored_mid: false,
            stored_long: false,
            ask_required: true,
        }
    }

    #[test]
    fn test_register_and_take_once() {
        let pending = PendingDecisions::new();
        let entry = pending.register("writer", Some(0), "text", ask_meta());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.list()[0].id, entry.id);

        let taken = pending.take(entry.id).unwrap();
        assert_eq!(taken.text, "text");
        assert!(pending.take(entry.id).is_none());
        assert!(pending.is_empty());
    }
}
