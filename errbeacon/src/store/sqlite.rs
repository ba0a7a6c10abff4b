//! SQLite-backed session store
//!
//! One database can hold many sessions; every read and write is scoped to the
//! session id the store was opened with. Schema versions are tracked with
//! `PRAGMA user_version`.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

use super::SessionStore;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: session scoped key/value items
    r#"
    CREATE TABLE IF NOT EXISTS session_items (
        session_id       TEXT NOT NULL,
        key              TEXT NOT NULL,
        value            TEXT NOT NULL,
        updated_at       DATETIME NOT NULL,
        PRIMARY KEY (session_id, key)
    );
    "#,
];

/// Run all pending migrations
fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::debug!(version, "Running session store migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Session store persisted in SQLite
pub struct SqliteStore {
    conn: Mutex<Connection>,
    session_id: String,
}

impl SqliteStore {
    /// Open or create a store at `path`, scoped to `session_id`
    pub fn open(path: &Path, session_id: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Self::from_connection(conn, session_id.into())
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(session_id: impl Into<String>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, session_id.into())
    }

    fn from_connection(conn: Connection, session_id: String) -> Result<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Drop every item of this session
    pub fn clear_session(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = conn.execute(
            "DELETE FROM session_items WHERE session_id = ?1",
            params![self.session_id],
        )?;
        Ok(removed)
    }
}

impl SessionStore for SqliteStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let value = conn
            .query_row(
                "SELECT value FROM session_items WHERE session_id = ?1 AND key = ?2",
                params![self.session_id, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            r#"
            INSERT INTO session_items (session_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(session_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![self.session_id, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_get_set_item() {
        let store = SqliteStore::open_in_memory("session-a").unwrap();
        assert_eq!(store.get_item("k").unwrap(), None);

        store.set_item("k", "first").unwrap();
        store.set_item("k", "second").unwrap();
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/sessions.db");

        let a = SqliteStore::open(&path, "a").unwrap();
        let b = SqliteStore::open(&path, "b").unwrap();

        a.set_item("k", "from a").unwrap();
        assert_eq!(b.get_item("k").unwrap(), None);
        assert_eq!(a.get_item("k").unwrap().as_deref(), Some("from a"));
        assert_eq!(a.session_id(), "a");
    }

    #[test]
    fn test_items_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");

        {
            let store = SqliteStore::open(&path, "tab-1").unwrap();
            store.set_item("k", "v").unwrap();
        }

        let store = SqliteStore::open(&path, "tab-1").unwrap();
        assert_eq!(store.get_item("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.clear_session().unwrap(), 1);
        assert_eq!(store.get_item("k").unwrap(), None);
    }
}
