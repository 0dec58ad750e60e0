//! # Key/Value Store
//!
//! The storage port the route buffer persists through. Values are JSON
//! strings under independent keys, so a torn write to one key can never
//! corrupt another.
//!
//! Implementations:
//! - [`MemoryStore`] - in-process map with an optional byte quota, for tests
//!   and hosts without durable storage
//! - [`SqliteStore`] - single-table SQLite store (`persistence` feature)

use std::collections::HashMap;

#[cfg(feature = "persistence")]
use rusqlite::{params, Connection, OptionalExtension};

use crate::{Result, TrackerError};

/// Durable string key/value storage.
///
/// `set` must either store the whole value or fail; a quota failure is
/// reported as [`TrackerError::QuotaExceeded`] so the caller can shed data
/// and retry.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store with an optional quota on the total bytes held
/// (keys plus values), mimicking browser local storage limits.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Change the quota; `None` removes it.
    pub fn set_quota(&mut self, quota_bytes: Option<usize>) {
        self.quota_bytes = quota_bytes;
    }

    /// Total bytes currently held.
    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota_bytes {
            let replaced = self.entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let projected = self.used_bytes() - replaced + key.len() + value.len();
            if projected > quota {
                return Err(TrackerError::QuotaExceeded);
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// Key/value store backed by a single SQLite table.
#[cfg(feature = "persistence")]
pub struct SqliteStore {
    db: Connection,
}

#[cfg(feature = "persistence")]
impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;

            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );
            "#,
        )?;
        Ok(())
    }
}

#[cfg(feature = "persistence")]
impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .query_row("SELECT value FROM kv_store WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
             VALUES (?, ?, strftime('%s', 'now'))",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.db
            .execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
        Ok(())
    }
}
