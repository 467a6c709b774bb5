//! Tierflow Storage - durable project stores on redb.
//!
//! One redb file per project directory holds every durable table. The
//! database is single-writer: a second process opening the same project file
//! fails at open time.
//!
//! # Tables
//!
//! - `memory_kv` - mid-tier memory records, tool audits and TTL bookkeeping
//! - `project_values` - named workflow outputs and seeded context

pub mod memory_kv;
pub mod project_values;
pub mod simple_storage;
pub mod time_utils;

use anyhow::Result;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

pub use memory_kv::{MemoryKvStorage, TTL_PREFIX, TtlMeta};
pub use project_values::ProjectValueStorage;
pub use simple_storage::SimpleStorage;
pub use time_utils::{MonotonicClock, now_ms};

/// Opens the project database and every table on it.
#[derive(Debug, Clone)]
pub struct ProjectStorage {
    db: Arc<Database>,
    pub memory: MemoryKvStorage,
    pub values: ProjectValueStorage,
}

impl ProjectStorage {
    /// Create or open the database at `path` and initialize all tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Arc::new(Database::create(path.as_ref())?);
        tracing::debug!(path = %path.as_ref().display(), "Opened project database");

        let memory = MemoryKvStorage::new(db.clone())?;
        let values = ProjectValueStorage::new(db.clone())?;

        Ok(Self { db, memory, values })
    }

    /// Get a reference to the underlying database
    pub fn get_db(&self) -> Arc<Database> {
        self.db.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_shares_one_database() {
        let temp_dir = tempdir().unwrap();
        let storage = ProjectStorage::open(temp_dir.path().join("memory.redb")).unwrap();

        storage.memory.put("a.history:1", b"one").unwrap();
        storage
            .values
            .set("draft", &serde_json::json!("text"))
            .unwrap();

        assert_eq!(storage.memory.list_keys(None).unwrap(), vec!["a.history:1"]);
        assert_eq!(storage.values.keys(None).unwrap(), vec!["draft"]);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("memory.redb");
        {
            let storage = ProjectStorage::open(&path).unwrap();
            storage.memory.put("k", b"v").unwrap();
        }
        let storage = ProjectStorage::open(&path).unwrap();
        assert_eq!(storage.memory.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
