//! Key-value repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide blob get/put/remove over the `kv_entries` table.
//! - Share one connection between journal, settings and checkpoint access.
//!
//! # Invariants
//! - `put` is an upsert; a successful return means the value is committed.
//! - Construction fails on connections that were not migrated.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for repository operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Serialization(serde_json::Error),
    /// Stored value exists but cannot be interpreted.
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Another thread panicked while holding the connection lock.
    LockPoisoned,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "serialization failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} \
                 does not match expected {expected_version}"
            ),
            Self::LockPoisoned => write!(f, "journal connection lock poisoned"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Blob storage keyed by string.
pub trait KeyValueRepository {
    fn get(&self, key: &str) -> RepoResult<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> RepoResult<()>;
    /// Returns whether a value was removed.
    fn remove(&self, key: &str) -> RepoResult<bool>;
}

/// SQLite-backed key-value repository. Clones share one connection.
#[derive(Clone)]
pub struct SqliteKeyValueRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKeyValueRepository {
    /// Wraps a migrated connection.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_kv_connection_ready(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RepoError::LockPoisoned)
    }
}

impl KeyValueRepository for SqliteKeyValueRepository {
    fn get(&self, key: &str) -> RepoResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> RepoResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> RepoResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        Ok(changed > 0)
    }
}

fn ensure_kv_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}
