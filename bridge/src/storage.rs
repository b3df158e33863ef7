use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::types::now_ms;

// ================================================================================================
// STORAGE CONTRACT
// ================================================================================================

/// A value as held by the store, with its write revision
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub value: Value,
    /// Number of successful writes to this key. 0 means never written.
    pub revision: u64,
    /// Hex SHA-256 of the compact JSON encoding
    pub digest: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Stale write to \"{key}\": based on revision {expected}, store is at {actual}")]
    StaleRevision { key: String, expected: u64, actual: u64 },

    #[error("Quota exceeded for \"{key}\": {size} bytes (limit {limit})")]
    QuotaExceeded { key: String, size: usize, limit: usize },

    #[error("Stored value for \"{key}\" failed its integrity check")]
    DigestMismatch { key: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Whole-value key-value storage.
///
/// Every write replaces the value under a key. When a base revision is
/// supplied the write is rejected unless the key is still at that
/// revision, so two writers working from the same snapshot cannot
/// silently overwrite each other.
pub trait KeyValueStore: Send + 'static {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError>;

    /// Replace the value under `key` and return the new revision
    fn put(
        &self,
        key: &str,
        value: &Value,
        base_revision: Option<u64>,
    ) -> Result<u64, StorageError>;
}

/// Hex SHA-256 of the compact JSON encoding
pub fn digest_of(encoded: &str) -> String {
    format!("{:x}", Sha256::digest(encoded.as_bytes()))
}

fn encode(key: &str, value: &Value, quota_bytes: usize) -> Result<String, StorageError> {
    let encoded = serde_json::to_string(value)
        .map_err(|e| StorageError::Backend(format!("Failed to serialize value: {}", e)))?;
    if encoded.len() > quota_bytes {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            size: encoded.len(),
            limit: quota_bytes,
        });
    }
    Ok(encoded)
}

fn check_revision(key: &str, base_revision: Option<u64>, current: u64) -> Result<(), StorageError> {
    match base_revision {
        Some(expected) if expected != current => Err(StorageError::StaleRevision {
            key: key.to_string(),
            expected,
            actual: current,
        }),
        _ => Ok(()),
    }
}

// ================================================================================================
// SQLITE STORE
// ================================================================================================

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_store (
    key         TEXT PRIMARY KEY,
    value_json  TEXT NOT NULL,
    revision    INTEGER NOT NULL DEFAULT 0,
    digest      TEXT NOT NULL,
    updated_at  REAL NOT NULL
);
";

/// SQLite backed store. One row per key.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    quota_bytes: usize,
}

impl SqliteStore {
    /// Opens (and creates if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>, quota_bytes: usize) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StorageError::Backend(format!("Failed to create storage directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| StorageError::Backend(format!("Failed to open SQLite database: {}", e)))?;
        Self::from_connection(conn, quota_bytes)
    }

    /// Private in-memory database
    pub fn open_in_memory(quota_bytes: usize) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Backend(format!("Failed to open SQLite database: {}", e)))?;
        Self::from_connection(conn, quota_bytes)
    }

    fn from_connection(conn: Connection, quota_bytes: usize) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StorageError::Backend(format!("Failed to create schema: {}", e)))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            quota_bytes,
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        let row: Option<(String, i64, String)> = {
            let conn = self.db.lock();
            conn.query_row(
                "SELECT value_json, revision, digest FROM kv_store WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| StorageError::Backend(format!("SQLite read failed: {}", e)))?
        };

        let Some((value_json, revision, digest)) = row else {
            return Ok(None);
        };

        if digest_of(&value_json) != digest {
            return Err(StorageError::DigestMismatch { key: key.to_string() });
        }

        let value = serde_json::from_str(&value_json)
            .map_err(|e| {
                StorageError::Backend(format!("Invalid JSON stored under {}: {}", key, e))
            })?;

        Ok(Some(StoredValue {
            value,
            revision: revision as u64,
            digest,
        }))
    }

    fn put(
        &self,
        key: &str,
        value: &Value,
        base_revision: Option<u64>,
    ) -> Result<u64, StorageError> {
        let encoded = encode(key, value, self.quota_bytes)?;
        let digest = digest_of(&encoded);
        let updated_at = (now_ms() as f64) / 1000.0;

        let mut conn = self.db.lock();
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Backend(format!("SQLite transaction failed: {}", e)))?;

        let current: u64 = tx
            .query_row(
                "SELECT revision FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| StorageError::Backend(format!("SQLite read failed: {}", e)))?
            .unwrap_or(0) as u64;

        check_revision(key, base_revision, current)?;
        let revision = current + 1;

        tx.execute(
            "INSERT OR REPLACE INTO kv_store (key, value_json, revision, digest, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, encoded, revision as i64, digest, updated_at],
        )
        .map_err(|e| StorageError::Backend(format!("SQLite upsert failed: {}", e)))?;

        tx.commit()
            .map_err(|e| StorageError::Backend(format!("SQLite commit failed: {}", e)))?;

        Ok(revision)
    }
}

// ================================================================================================
// MEMORY STORE
// ================================================================================================

/// In-process store. Clones share the same map, which makes it usable as
/// the common backing of several bridges in one process.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, StoredValue>>>,
    quota_bytes: usize,
}

impl MemoryStore {
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            quota_bytes,
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(
        &self,
        key: &str,
        value: &Value,
        base_revision: Option<u64>,
    ) -> Result<u64, StorageError> {
        let encoded = encode(key, value, self.quota_bytes)?;
        let mut entries = self.entries.lock();
        let current = entries.get(key).map(|v| v.revision).unwrap_or(0);
        check_revision(key, base_revision, current)?;

        let revision = current + 1;
        entries.insert(
            key.to_string(),
            StoredValue {
                value: value.clone(),
                revision,
                digest: digest_of(&encoded),
            },
        );
        Ok(revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exercise_store(store: &dyn KeyValueStore) {
        assert_eq!(store.get("rules").unwrap(), None);

        let first = store.put("rules", &json!([1]), Some(0)).unwrap();
        assert_eq!(first, 1);
        let second = store.put("rules", &json!([1, 2]), None).unwrap();
        assert_eq!(second, 2);

        let stored = store.get("rules").unwrap().unwrap();
        assert_eq!(stored.value, json!([1, 2]));
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.digest, digest_of("[1,2]"));

        let stale = store.put("rules", &json!([]), Some(1));
        assert_eq!(
            stale,
            Err(StorageError::StaleRevision { key: "rules".into(), expected: 1, actual: 2 })
        );
        assert_eq!(store.get("rules").unwrap().unwrap().value, json!([1, 2]));
    }

    #[test]
    fn test_memory_store_contract() {
        exercise_store(&MemoryStore::new(1024));
    }

    #[test]
    fn test_sqlite_store_contract() {
        exercise_store(&SqliteStore::open_in_memory(1024).unwrap());
    }

    #[test]
    fn test_quota_is_enforced() {
        let store = MemoryStore::new(8);
        let err = store.put("rules", &json!(["a long value"]), None).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { limit: 8, .. }));
        assert_eq!(store.get("rules").unwrap(), None);
    }

    #[test]
    fn test_sqlite_store_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");

        let store = SqliteStore::open(&path, 1024).unwrap();
        store.put("rules", &json!([{"id": "r1"}]), None).unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path, 1024).unwrap();
        let stored = reopened.get("rules").unwrap().unwrap();
        assert_eq!(stored.value, json!([{"id": "r1"}]));
        assert_eq!(stored.revision, 1);
    }

    #[test]
    fn test_tampered_row_fails_integrity_check() {
        let store = SqliteStore::open_in_memory(1024).unwrap();
        store.put("rules", &json!([]), None).unwrap();
        store
            .db
            .lock()
            .execute("UPDATE kv_store SET value_json = '[1]' WHERE key = 'rules'", [])
            .unwrap();
        assert_eq!(
            store.get("rules"),
            Err(StorageError::DigestMismatch { key: "rules".into() })
        );
    }
}
