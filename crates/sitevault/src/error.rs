use std::path::PathBuf;
use thiserror::Error;

use crate::site::SiteError;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Unknown check '{0}'")]
    UnknownCheck(String),

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),

    #[error("Another process is already active: {kind} (operation {id})")]
    ProcessActive { id: i64, kind: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid table pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors from the operation state machine and log appender.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Operation has not been saved yet")]
    NotPersisted,

    #[error("Malformed {field} JSON for operation {id}: {source}")]
    MalformedJson {
        id: i64,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown status '{status}' for operation {id}")]
    InvalidStatus { id: i64, status: String },

    #[error("Failed to encode details: {0}")]
    EncodeDetails(#[source] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// Errors raised while constructing or performing a check or tool.
///
/// Expected negative outcomes (too little disk space, schema drift) are not
/// errors; these are the unexpected ones that end in `failed` or
/// `failedtostart`.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("Site error: {0}")]
    Site(#[from] SiteError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Operation {id} has type '{found}', expected '{expected}'")]
    WrongType {
        id: i64,
        expected: String,
        found: String,
    },

    #[error("This check must belong to a restore or dry-run operation")]
    MissingParent,

    #[error("Parent operation {0} not found")]
    ParentNotFound(i64),

    #[error("Parent operation {parent} has no usable backup manifest: {reason}")]
    InvalidManifest { parent: i64, reason: String },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;
