//! The collaborators every engine entry point receives.

use crate::config::VaultConfig;
use crate::db::{OperationStore, TaskQueue};
use crate::error::OperationError;
use crate::oplog::{self, LogEntry, LogLevel};
use crate::operation::Operation;
use crate::report::{ErrorReport, ErrorReporter};
use crate::site::Site;

/// Borrowed handles to storage, the task queue, the host site, the error
/// reporter and configuration.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub store: &'a dyn OperationStore,
    pub queue: &'a dyn TaskQueue,
    pub site: &'a dyn Site,
    pub reporter: &'a dyn ErrorReporter,
    pub config: &'a VaultConfig,
}

impl<'a> Context<'a> {
    pub fn new(
        store: &'a dyn OperationStore,
        queue: &'a dyn TaskQueue,
        site: &'a dyn Site,
        reporter: &'a dyn ErrorReporter,
        config: &'a VaultConfig,
    ) -> Self {
        Self {
            store,
            queue,
            site,
            reporter,
            config,
        }
    }

    /// Appends a line to `op`'s log using the configured length limit.
    pub fn log(
        &self,
        op: &Operation,
        level: LogLevel,
        message: &str,
    ) -> Result<LogEntry, OperationError> {
        oplog::append(self.store, op, level, message, self.config.log_message_max_len)
    }

    /// Forwards the error recorded on `op` to the reporter.
    pub fn report_error(&self, op: &Operation) {
        let Some(message) = op.error_message() else {
            return;
        };
        self.reporter.report(&ErrorReport {
            operation_id: op.id(),
            operation_type: op.kind().to_string(),
            message: message.to_string(),
            backtrace: op.error_backtrace().unwrap_or_default().to_string(),
        });
    }
}
