use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Byte length at which stored log messages are cut.
pub const LOG_MESSAGE_MAX_LEN: usize = 1333;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Defaults to `~/.sitevault/data/sitevault.db`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// An in-progress operation with no activity for this long is stuck.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: i64,
    #[serde(default = "default_log_message_max_len")]
    pub log_message_max_len: usize,
    /// Chunk size used when uploading archives; part of the disk space estimate.
    #[serde(default = "default_upload_chunk_size")]
    pub upload_chunk_size: u64,
    /// Table names or glob patterns left out of backups.
    #[serde(default)]
    pub backup_exclude_tables: Vec<String>,
    /// Let a restore proceed when add-on plugins from the backup are absent.
    #[serde(default)]
    pub allow_missing_plugins: bool,
    /// Standalone backup pre-checks older than this are rescheduled.
    #[serde(default = "default_precheck_refresh_secs")]
    pub precheck_refresh_secs: i64,
    #[serde(default = "default_min_memory_limit")]
    pub min_memory_limit: u64,
    /// Zero disables the execution time requirement.
    #[serde(default)]
    pub min_time_limit_secs: u64,
    /// Show error backtraces in check reports.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub error_reporting: Option<ErrorReportingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReportingConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_lock_timeout_secs() -> i64 {
    30 * 60
}

fn default_log_message_max_len() -> usize {
    LOG_MESSAGE_MAX_LEN
}

fn default_upload_chunk_size() -> u64 {
    100 * 1024 * 1024
}

fn default_precheck_refresh_secs() -> i64 {
    24 * 60 * 60
}

fn default_min_memory_limit() -> u64 {
    256 * 1024 * 1024
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            lock_timeout_secs: default_lock_timeout_secs(),
            log_message_max_len: default_log_message_max_len(),
            upload_chunk_size: default_upload_chunk_size(),
            backup_exclude_tables: Vec::new(),
            allow_missing_plugins: false,
            precheck_refresh_secs: default_precheck_refresh_secs(),
            min_memory_limit: default_min_memory_limit(),
            min_time_limit_secs: 0,
            debug: false,
            error_reporting: None,
        }
    }
}

impl VaultConfig {
    /// The configured database path, falling back to the per-user default.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}
