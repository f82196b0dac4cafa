//! SQLite-backed state store.
//!
//! All state lives in one key-value table; values are JSON blobs. This
//! matches the data model: a small number of records rewritten wholesale.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{StateError, StateStore};
use crate::optimizer::{ConversionRecord, HISTORY_LIMIT};
use crate::scheduler::{BatchProgress, ConversionTask};

const QUEUE_KEY: &str = "batch:queue";
const PROGRESS_KEY: &str = "batch:progress";

/// SQLite-backed key-value state store.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Opens (or creates) the database file and schema.
    pub fn new(path: &Path) -> Result<Self, StateError> {
        let conn = Connection::open(path).map_err(|e| StateError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StateError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StateError::Database(e.to_string()))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StateError> {
        let conn = self.conn.lock().expect("state store mutex poisoned");
        conn.execute(
            "INSERT INTO app_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let conn = self.conn.lock().expect("state store mutex poisoned");
        conn.query_row(
            "SELECT value FROM app_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StateError::Database(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StateError> {
        let conn = self.conn.lock().expect("state store mutex poisoned");
        conn.execute("DELETE FROM app_state WHERE key = ?1", params![key])
            .map_err(|e| StateError::Database(e.to_string()))?;
        Ok(())
    }

    fn history_key(subject: &str) -> String {
        format!("history:{}", subject)
    }
}

impl StateStore for SqliteStateStore {
    fn save_queue(&self, tasks: &[ConversionTask]) -> Result<(), StateError> {
        let json =
            serde_json::to_string(tasks).map_err(|e| StateError::Serialization(e.to_string()))?;
        self.put(QUEUE_KEY, &json)
    }

    fn load_queue(&self) -> Result<Vec<ConversionTask>, StateError> {
        match self.get(QUEUE_KEY)? {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StateError::Serialization(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }

    fn clear_queue(&self) -> Result<(), StateError> {
        self.delete(QUEUE_KEY)
    }

    fn save_progress(&self, progress: &BatchProgress) -> Result<(), StateError> {
        let json = serde_json::to_string(progress)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        self.put(PROGRESS_KEY, &json)
    }

    fn load_progress(&self) -> Result<Option<BatchProgress>, StateError> {
        match self.get(PROGRESS_KEY)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StateError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    fn append_record(&self, subject: &str, record: &ConversionRecord) -> Result<(), StateError> {
        let key = Self::history_key(subject);
        let mut records: Vec<ConversionRecord> = match self.get(&key)? {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| StateError::Serialization(e.to_string()))?,
            None => Vec::new(),
        };
        records.push(record.clone());
        if records.len() > HISTORY_LIMIT {
            let excess = records.len() - HISTORY_LIMIT;
            records.drain(..excess);
        }
        let json = serde_json::to_string(&records)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        self.put(&key, &json)
    }

    fn records(&self, subject: &str) -> Result<Vec<ConversionRecord>, StateError> {
        match self.get(&Self::history_key(subject))? {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StateError::Serialization(e.to_string()))
            }
            None => Ok(Vec::new()),
        }
    }
}
