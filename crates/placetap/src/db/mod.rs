//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`, which is also what
//! makes every single statement (in particular the batch claim) atomic with
//! respect to concurrent workers in this process. Separate processes sharing
//! the same file are serialized by SQLite's own write lock.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod migrations;
pub mod store;
pub mod value;
pub mod values;

pub use error::DatabaseError;
pub use store::{health_check, RetryingStore, SqliteStore, StoreClient};
pub use value::{format_timestamp, Row, Value};
pub use values::ValuesBuilder;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on rows bound into one multi-row write. Larger inputs are
/// split into sequential statements.
pub const MAX_ROWS_PER_WRITE: usize = 500;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). WAL mode is enabled for file databases
/// so monitoring reads do not block the batch processor.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        log::debug!("SQLite journal mode: {}", journal_mode);

        migrations::run_all(&mut conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run_all(&mut conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs a read statement and collects every row.
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Arc<[String]> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(Row::from_sqlite(&columns, row)?);
            }
            Ok(out)
        })
    }

    /// Runs a write statement and returns the number of rows it changed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DatabaseError> {
        self.with_conn(|conn| {
            let changed = conn.execute(sql, rusqlite::params_from_iter(params.iter()))?;
            Ok(changed as u64)
        })
    }
}

/// Returns the canonical database path: `~/.placetap/data/placetap.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".placetap").join("data").join("placetap.db"))
}
