//! Project value store - named JSON values shared between workflow runs.
//!
//! Workflow step outputs and seeded context land here so later runs (and
//! later steps) can reference them by key.

use crate::{SimpleStorage, define_simple_storage};
use anyhow::Result;
use serde_json::Value;

define_simple_storage! {
    /// Durable project-scoped JSON values.
    pub struct ProjectValueStorage { table: "project_values" }
}

impl ProjectValueStorage {
    pub fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.put_json(key, value)
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.get_json(key)
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.delete(key)
    }

    /// All keys in order, optionally restricted to a prefix.
    pub fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .scan_prefix(prefix.unwrap_or(""))?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::Database;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_set_get_remove() {
        let temp_dir = tempdir().unwrap();
        let db = Arc::new(Database::create(temp_dir.path().join("values.redb")).unwrap());
        let storage = ProjectValueStorage::new(db).unwrap();

        storage.set("draft", &json!("first draft")).unwrap();
        storage.set("plan", &json!({"steps": 3})).unwrap();

        assert_eq!(storage.get("draft").unwrap(), Some(json!("first draft")));
        assert_eq!(storage.get("plan").unwrap(), Some(json!({"steps": 3})));
        assert_eq!(storage.keys(None).unwrap(), vec!["draft", "plan"]);
        assert_eq!(storage.count().unwrap(), 2);

        assert!(storage.remove("draft").unwrap());
        assert_eq!(storage.get("draft").unwrap(), None);
    }
}
