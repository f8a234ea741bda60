//! Local SQLite persistence for seen-paper identities and paper content.
//!
//! A single [`Database`] handle is opened by the caller and shared by the
//! stores built on top of it. The schema is bootstrapped on open; the
//! connection is released when the last clone of the handle is dropped, or
//! explicitly through [`Database::close`].

mod content;
mod dedup;

pub use content::{ContentStats, ContentStore};
pub use dedup::{DedupStore, ReadOnlyDedupStore, SqliteDedupStore};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Errors raised by the storage layer
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database connection lock poisoned")]
    Poisoned,

    #[error("Database is still shared by {0} other handle(s)")]
    StillShared(usize),
}

/// Shared handle to the SQLite database
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens an existing database or creates a new one at the specified path.
    ///
    /// Parent directories are created as needed and the schema is applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!("Opened database at {}", path.display());
        Self::init(conn)
    }

    /// In-memory database, mainly for tests and dry runs without a file
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/init.sql"
        )))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns the default path for the database file.
    ///
    /// - On Unix: `~/.local/share/paper-tracker/papers.db`
    /// - On macOS: `~/Library/Application Support/paper-tracker/papers.db`
    /// - On Windows: `%APPDATA%\paper-tracker\papers.db`
    /// - Fallback: `./papers.db` in the current directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|dir| dir.join("paper-tracker"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("papers.db")
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Close the connection, reporting any error SQLite raises while doing so.
    ///
    /// Fails with [`StorageError::StillShared`] while stores still hold a
    /// clone of this handle; the connection is then released by the last drop.
    pub fn close(self) -> Result<(), StorageError> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().map_err(|_| StorageError::Poisoned)?;
                conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
                tracing::debug!("Database closed");
                Ok(())
            }
            Err(shared) => Err(StorageError::StillShared(Arc::strong_count(&shared) - 1)),
        }
    }
}
