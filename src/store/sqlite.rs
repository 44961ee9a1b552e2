//! SQLite store.
//!
//! One `data(key, value)` table; values are JSON text. Every call is
//! write-through so `save` has nothing to do.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use super::{Store, StoreError, StoreResult};

/// Store backed by a SQLite database file.
pub struct SqliteStore {
    name: String,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at `path`, creating the table if needed.
    ///
    /// `:memory:` opens a private in-memory database.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StoreError::MissingSaveName);
        }

        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys=ON;
            CREATE TABLE IF NOT EXISTS data (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            name: path.display().to_string(),
            conn: Mutex::new(conn),
        })
    }
}

impl Store for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        if key.is_empty() {
            return Ok(None);
        }
        let raw: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT value FROM data WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        if key.is_empty() {
            return Ok(());
        }
        let text = serde_json::to_string(&value)?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO data (key, value) VALUES (?1, ?2)",
            (key, text),
        )?;
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row("SELECT 1 FROM data WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM data WHERE key = ?1", [key])?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.conn.lock().execute("DELETE FROM data", [])?;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM data ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crud_in_memory() {
        let store = SqliteStore::open(":memory:").unwrap();

        store.set("a@g.us", json!({"subject": "Family"})).unwrap();
        store.set("b@g.us", json!(604800)).unwrap();

        assert_eq!(store.get("a@g.us").unwrap(), Some(json!({"subject": "Family"})));
        assert!(store.has("b@g.us").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["a@g.us", "b@g.us"]);

        store.delete("a@g.us").unwrap();
        assert_eq!(store.get("a@g.us").unwrap(), None);

        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        SqliteStore::open(&path).unwrap().set("prefix", json!(["!"])).unwrap();

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("prefix").unwrap(), Some(json!(["!"])));
    }

    #[test]
    fn test_missing_path_fails_fast() {
        assert!(matches!(SqliteStore::open(""), Err(StoreError::MissingSaveName)));
    }
}
