pub mod schema;
pub mod migrations;

use crate::error::AppError;
use rusqlite::{params, Connection, OptionalExtension, Result};
use schema::HOST_SESSION_KEY;
use serde_json::Value;
use std::path::Path;

/// Storage scopes mirrored from the browser's storage areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Engine state. Survives native-host relaunches and service-worker
    /// suspends, but is dropped when the browser itself restarts.
    Session,
    /// User preferences and pattern lists.
    Sync,
}

impl Scope {
    fn table(self) -> &'static str {
        match self {
            Scope::Session => "session_kv",
            Scope::Sync => "sync_kv",
        }
    }
}

/// Durable key-value port used by the state store and preferences.
///
/// Values are JSON documents; a missing key reads as `None` and is treated
/// by callers as first run, never as an error.
pub trait Storage: Send {
    fn read(&self, scope: Scope, key: &str) -> std::result::Result<Option<Value>, AppError>;

    /// Write several keys atomically.
    fn write_many(&mut self, scope: Scope, entries: &[(&str, Value)]) -> std::result::Result<(), AppError>;

    /// Bind the session scope to a browser session marker. When the marker
    /// differs from the stored one the browser has fully restarted, so the
    /// session scope is cleared. Returns `true` in that case.
    fn begin_session(&mut self, marker: &str) -> std::result::Result<bool, AppError>;
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Storage for Database {
    fn read(&self, scope: Scope, key: &str) -> std::result::Result<Option<Value>, AppError> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", scope.table());
        let raw: Option<String> = self
            .conn
            .query_row(&sql, [key], |row| row.get(0))
            .optional()?;

        Ok(raw.map(|text| serde_json::from_str(&text)).transpose()?)
    }

    fn write_many(&mut self, scope: Scope, entries: &[(&str, Value)]) -> std::result::Result<(), AppError> {
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            scope.table()
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for (key, value) in entries {
                stmt.execute(params![key, value.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn begin_session(&mut self, marker: &str) -> std::result::Result<bool, AppError> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [HOST_SESSION_KEY],
                |row| row.get(0),
            )
            .optional()?;

        if stored.as_deref() == Some(marker) {
            return Ok(false);
        }

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM session_kv", [])?;
        tx.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![HOST_SESSION_KEY, marker],
        )?;
        tx.commit()?;
        Ok(true)
    }
}
