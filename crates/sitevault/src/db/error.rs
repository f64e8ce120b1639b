use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating the database directory failed.
    #[error("Cannot create database directory '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// The file was written by a newer build.
    #[error("Database schema v{found} is newer than the supported v{supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    /// An update targeted a row that does not exist.
    #[error("Operation {0} does not exist")]
    MissingOperation(i64),

    #[error("Database lock poisoned")]
    LockPoisoned,
}
