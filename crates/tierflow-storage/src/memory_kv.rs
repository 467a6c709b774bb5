//! Mid-tier memory store - durable per-project key/value table.
//!
//! Values are opaque bytes (JSON in practice). Keys may carry an expiry,
//! recorded in a companion metadata entry under [`TTL_PREFIX`]. Expired keys
//! stay readable until [`MemoryKvStorage::sweep_expired`] runs; nothing sweeps
//! automatically.

use crate::time_utils::now_ms;
use crate::{SimpleStorage, define_simple_storage};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reserved prefix of TTL bookkeeping records. Never returned by listings.
pub const TTL_PREFIX: &str = "__ttl__:";

define_simple_storage! {
    /// Mid-tier key/value storage with optional per-key expiry.
    pub struct MemoryKvStorage { table: "memory_kv" }
}

/// Companion record describing when a key expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlMeta {
    pub target: String,
    pub expires_at_ms: i64,
}

fn ttl_key(key: &str) -> String {
    format!("{TTL_PREFIX}{key}")
}

impl MemoryKvStorage {
    /// Store a value without expiry. Clears any expiry set earlier in the
    /// same transaction.
    pub fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.ensure_user_key(key)?;
        let meta_key = ttl_key(key);

        let write_txn = self.db().begin_write()?;
        {
            let mut table = write_txn.open_table(<Self as SimpleStorage>::TABLE)?;
            table.insert(key, data)?;
            table.remove(meta_key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Store a value that expires `ttl_ms` milliseconds from now.
    pub fn put_with_ttl(&self, key: &str, data: &[u8], ttl_ms: i64) -> Result<()> {
        self.put_with_expiry(key, data, now_ms() + ttl_ms)
    }

    /// Store a value together with an absolute expiry timestamp.
    pub fn put_with_expiry(&self, key: &str, data: &[u8], expires_at_ms: i64) -> Result<()> {
        self.ensure_user_key(key)?;
        let meta = TtlMeta {
            target: key.to_string(),
            expires_at_ms,
        };
        let meta_bytes = serde_json::to_vec(&meta)?;

        let write_txn = self.db().begin_write()?;
        {
            let mut table = write_txn.open_table(<Self as SimpleStorage>::TABLE)?;
            table.insert(key, data)?;
            table.insert(ttl_key(key).as_str(), meta_bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_raw(key)
    }

    /// Expiry recorded for `key`, if any.
    pub fn expiry(&self, key: &str) -> Result<Option<TtlMeta>> {
        self.get_json(&ttl_key(key))
    }

    /// Delete a key and its expiry record. Returns true if the key existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let meta_key = ttl_key(key);
        let write_txn = self.db().begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(<Self as SimpleStorage>::TABLE)?;
            table.remove(meta_key.as_str())?;
            table.remove(key)?.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Keys matching `prefix`, excluding TTL bookkeeping.
    pub fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .list_entries(prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Entries matching `prefix`, excluding TTL bookkeeping.
    pub fn list_entries(&self, prefix: Option<&str>) -> Result<Vec<(String, Vec<u8>)>> {
        Ok(self
            .scan_prefix(prefix.unwrap_or(""))?
            .into_iter()
            .filter(|(key, _)| !key.starts_with(TTL_PREFIX))
            .collect())
    }

    /// Remove every key whose expiry is at or before `now_ms`, together with
    /// its metadata record. Returns the number of keys removed.
    pub fn sweep_expired(&self, now_ms: i64) -> Result<usize> {
        let expired: Vec<(String, TtlMeta)> = self
            .scan_prefix(TTL_PREFIX)?
            .into_iter()
            .filter_map(|(meta_key, data)| {
                let meta: TtlMeta = serde_json::from_slice(&data).ok()?;
                (meta.expires_at_ms <= now_ms).then_some((meta_key, meta))
            })
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db().begin_write()?;
        {
            let mut table = write_txn.open_table(<Self as SimpleStorage>::TABLE)?;
            for (meta_key, meta) in &expired {
                table.remove(meta_key.as_str())?;
                table.remove(meta.target.as_str())?;
            }
        }
        write_txn.commit()?;

        debug!(removed = expired.len(), "Swept expired memory keys");
        Ok(expired.len())
    }

    fn ensure_user_key(&self, key: &str) -> Result<()> {
        if key.starts_with(TTL_PREFIX) {
            anyhow::bail!("Key prefix '{}' is reserved", TTL_PREFIX);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::Database;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn create_test_storage() -> (MemoryKvStorage, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let db = Arc::new(Database::create(db_path).unwrap());
        (MemoryKvStorage::new(db).unwrap(), temp_dir)
    }

    #[test]
    fn test_put_and_get() {
        let (storage, _dir) = create_test_storage();
        storage.put("planner.history:1", b"hello").unwrap();

        assert_eq!(
            storage.get("planner.history:1").unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(storage.get("missing").unwrap(), None);
    }

    #[test]
    fn test_list_keys_hides_ttl_records() {
        let (storage, _dir) = create_test_storage();
        storage.put("a.history:1", b"1").unwrap();
        storage.put_with_ttl("a.history:2", b"2", 60_000).unwrap();
        storage.put("b.history:1", b"3").unwrap();

        let all = storage.list_keys(None).unwrap();
        assert_eq!(all, vec!["a.history:1", "a.history:2", "b.history:1"]);

        let only_a = storage.list_keys(Some("a.history:")).unwrap();
        assert_eq!(only_a, vec!["a.history:1", "a.history:2"]);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (storage, _dir) = create_test_storage();
        storage.put_with_expiry("old", b"x", 1_000).unwrap();
        storage.put_with_expiry("fresh", b"y", 5_000).unwrap();
        storage.put("forever", b"z").unwrap();

        let removed = storage.sweep_expired(2_000).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.get("old").unwrap(), None);
        assert!(storage.expiry("old").unwrap().is_none());
        assert!(storage.get("fresh").unwrap().is_some());
        assert!(storage.get("forever").unwrap().is_some());

        assert_eq!(storage.sweep_expired(10_000).unwrap(), 1);
        assert_eq!(storage.list_keys(None).unwrap(), vec!["forever"]);
    }

    #[test]
    fn test_plain_put_clears_expiry() {
        let (storage, _dir) = create_test_storage();
        storage.put_with_expiry("k", b"1", 1_000).unwrap();
        storage.put("k", b"2").unwrap();

        assert!(storage.expiry("k").unwrap().is_none());
        assert!(storage.scan_prefix(TTL_PREFIX).unwrap().is_empty());
        assert_eq!(storage.sweep_expired(5_000).unwrap(), 0);
        assert_eq!(storage.get("k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_remove_drops_meta() {
        let (storage, _dir) = create_test_storage();
        storage.put_with_ttl("k", b"1", 60_000).unwrap();
        assert!(storage.remove("k").unwrap());
        assert!(storage.expiry("k").unwrap().is_none());
        assert!(!storage.remove("k").unwrap());
    }

    #[test]
    fn test_reserved_prefix_rejected() {
        let (storage, _dir) = create_test_storage();
        assert!(storage.put("__ttl__:sneaky", b"1").is_err());
    }
}
