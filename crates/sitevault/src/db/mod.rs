//! SQLite persistence for operations, their logs and the task queue.
//!
//! [`Database`] implements the [`OperationStore`] and [`TaskQueue`] ports;
//! the SQL lives in the `*_repo` modules as free functions over it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod log_repo;
pub mod migrations;
pub mod operation_repo;
pub mod task_repo;

pub use error::DatabaseError;
pub use log_repo::LogRow;
pub use operation_repo::{OperationFilter, OperationRow};

/// Shared handle to the vault database. Clones share one connection; every
/// statement runs under its mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens or creates the vault file, creating parent directories, and
    /// migrates it to the current schema.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::init(conn, &path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> Result<Self, DatabaseError> {
        migrations::run_all(&conn)?;
        log::info!(
            "Vault database {} ready (schema v{})",
            label,
            migrations::current_version(&conn)?
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    pub fn schema_version(&self) -> Result<u32, DatabaseError> {
        self.with_conn(migrations::current_version)
    }
}

/// Returns the canonical database path: `~/.sitevault/data/sitevault.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".sitevault").join("data").join("sitevault.db"))
}

/// Persistence port for operation records and their log lines.
///
/// The state machine, check engine and tool runner only talk to storage
/// through this trait.
pub trait OperationStore: Send + Sync {
    /// Inserts a new operation row and returns its assigned id.
    fn insert_operation(&self, row: &OperationRow) -> Result<i64, DatabaseError>;
    /// Overwrites an existing operation row (last write wins).
    fn update_operation(&self, row: &OperationRow) -> Result<(), DatabaseError>;
    fn find_operation(&self, id: i64) -> Result<Option<OperationRow>, DatabaseError>;
    fn find_operation_by_access_key(
        &self,
        access_key: &str,
    ) -> Result<Option<OperationRow>, DatabaseError>;
    /// Returns matching rows, most recent first.
    fn query_operations(&self, filter: &OperationFilter)
        -> Result<Vec<OperationRow>, DatabaseError>;

    fn insert_log(&self, row: &LogRow) -> Result<i64, DatabaseError>;
    /// All log rows of an operation ordered by `(timecreated, id)`.
    fn operation_logs(&self, operation_id: i64) -> Result<Vec<LogRow>, DatabaseError>;
    /// First `n` and last `n` log rows plus the total count.
    fn operation_log_ends(
        &self,
        operation_id: i64,
        n: usize,
    ) -> Result<(Vec<LogRow>, Vec<LogRow>, u64), DatabaseError>;
    fn last_log_time(&self, operation_id: i64) -> Result<Option<i64>, DatabaseError>;
}

/// Background task port: "ensure at least one pending run of X is queued".
pub trait TaskQueue: Send + Sync {
    /// Queues `task` unless a pending run of it already exists.
    fn ensure_queued(&self, task: &str, now: i64) -> Result<(), DatabaseError>;
    /// Removes and returns the oldest pending task, if any.
    fn take_next(&self) -> Result<Option<String>, DatabaseError>;
}

impl OperationStore for Database {
    fn insert_operation(&self, row: &OperationRow) -> Result<i64, DatabaseError> {
        operation_repo::insert(self, row)
    }

    fn update_operation(&self, row: &OperationRow) -> Result<(), DatabaseError> {
        operation_repo::update(self, row)
    }

    fn find_operation(&self, id: i64) -> Result<Option<OperationRow>, DatabaseError> {
        operation_repo::find_by_id(self, id)
    }

    fn find_operation_by_access_key(
        &self,
        access_key: &str,
    ) -> Result<Option<OperationRow>, DatabaseError> {
        operation_repo::find_by_access_key(self, access_key)
    }

    fn query_operations(
        &self,
        filter: &OperationFilter,
    ) -> Result<Vec<OperationRow>, DatabaseError> {
        operation_repo::query(self, filter)
    }

    fn insert_log(&self, row: &LogRow) -> Result<i64, DatabaseError> {
        log_repo::insert(self, row)
    }

    fn operation_logs(&self, operation_id: i64) -> Result<Vec<LogRow>, DatabaseError> {
        log_repo::list_for_operation(self, operation_id)
    }

    fn operation_log_ends(
        &self,
        operation_id: i64,
        n: usize,
    ) -> Result<(Vec<LogRow>, Vec<LogRow>, u64), DatabaseError> {
        let total = log_repo::count_for_operation(self, operation_id)?;
        let head = log_repo::first_n(self, operation_id, n)?;
        let tail = log_repo::last_n(self, operation_id, n)?;
        Ok((head, tail, total))
    }

    fn last_log_time(&self, operation_id: i64) -> Result<Option<i64>, DatabaseError> {
        log_repo::last_timecreated(self, operation_id)
    }
}

impl TaskQueue for Database {
    fn ensure_queued(&self, task: &str, now: i64) -> Result<(), DatabaseError> {
        task_repo::ensure_queued(self, task, now)
    }

    fn take_next(&self) -> Result<Option<String>, DatabaseError> {
        task_repo::take_next(self)
    }
}
