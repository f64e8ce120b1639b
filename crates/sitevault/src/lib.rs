pub mod check;
pub mod clock;
pub mod config;
pub mod context;
pub mod cron;
pub mod db;
pub mod dryrun;
pub mod error;
pub mod manifest;
pub mod oplog;
pub mod operation;
pub mod report;
pub mod runner;
pub mod schema;
pub mod site;
pub mod tool;
pub mod version;

pub use check::{Check, CheckScope};
pub use config::{load_config, VaultConfig};
pub use context::Context;
pub use cron::{CronReport, CronWorker, CRON_TASK};
pub use db::{Database, OperationStore, TaskQueue};
pub use dryrun::DryRun;
pub use error::{ConfigError, OperationError, Result, RunError, VaultError};
pub use manifest::BackupManifest;
pub use oplog::{LogEntry, LogItem, LogLevel};
pub use operation::{Operation, OperationKind, OperationStatus};
pub use report::{ErrorReporter, HttpErrorReporter, NoopReporter};
pub use site::{Site, SiteError, StaticSite};
pub use tool::Tool;
pub use version::Version;
