//! SQLite-backed key-value namespaces and durable counters

use crate::error::StorageError;
use async_trait::async_trait;
use rusqlite::{params, Connection, TransactionBehavior};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Durable mapping from string keys to JSON records
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Insert or replace the value under `key`
    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Dump every entry. Cost grows with the number of stored records.
    async fn get_contents_as_object(&self) -> Result<BTreeMap<String, Value>, StorageError>;
}

/// Durable monotonic counter.
///
/// Implementations must make `get_and_increment` atomic with respect to
/// concurrent callers: two calls never return the same value, including
/// across process restarts. The capture coordinator relies on this and does
/// no locking of its own.
#[async_trait]
pub trait PageCounter: Send + Sync {
    /// Return the current value and advance the counter
    async fn get_and_increment(&self) -> Result<u64, StorageError>;

    /// Current value without advancing
    async fn get(&self) -> Result<u64, StorageError>;
}

/// How long a write waits for another connection to release the file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the study database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS key_value (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (namespace, key)
            );

            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    /// Open a key-value namespace. Namespaces are created on first write.
    pub async fn key_value_storage(&self, namespace: &str) -> Result<KeyValueStorage, StorageError> {
        Ok(KeyValueStorage {
            conn: Arc::clone(&self.conn),
            namespace: namespace.to_string(),
        })
    }

    /// Open or create a named counter. A new counter starts at 0.
    pub async fn counter(&self, name: &str) -> Result<Counter, StorageError> {
        {
            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT OR IGNORE INTO counters (name, value) VALUES (?1, 0)",
                params![name],
            )?;
        }

        Ok(Counter {
            conn: Arc::clone(&self.conn),
            name: name.to_string(),
        })
    }
}

/// One namespace of the `key_value` table
pub struct KeyValueStorage {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
}

impl KeyValueStorage {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl KeyValueStore for KeyValueStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT value FROM key_value WHERE namespace = ?1 AND key = ?2",
            params![self.namespace, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO key_value (namespace, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')",
            params![self.namespace, key, raw],
        )?;
        Ok(())
    }

    async fn get_contents_as_object(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT key, value FROM key_value WHERE namespace = ?1")?;

        let rows = stmt.query_map(params![self.namespace], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut contents = BTreeMap::new();
        for row in rows {
            let (key, raw) = row?;
            contents.insert(key, serde_json::from_str(&raw)?);
        }
        Ok(contents)
    }
}

/// A row of the `counters` table
pub struct Counter {
    conn: Arc<Mutex<Connection>>,
    name: String,
}

impl Counter {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl PageCounter for Counter {
    async fn get_and_increment(&self) -> Result<u64, StorageError> {
        // The mutex serializes callers on this handle; the immediate
        // transaction takes the write lock up front against other connections.
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT OR IGNORE INTO counters (name, value) VALUES (?1, 0)",
            params![self.name],
        )?;
        let value: i64 = tx.query_row(
            "SELECT value FROM counters WHERE name = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE counters SET value = value + 1 WHERE name = ?1",
            params![self.name],
        )?;

        tx.commit()?;
        Ok(value as u64)
    }

    async fn get(&self) -> Result<u64, StorageError> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT value FROM counters WHERE name = ?1",
            params![self.name],
            |row| row.get::<_, i64>(0),
        );

        match result {
            Ok(value) => Ok(value as u64),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
