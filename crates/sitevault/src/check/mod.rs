pub mod configoverride;
pub mod dbstatus;
pub mod diskspace;
pub mod engine;
pub mod envlimits;
pub mod plugins_restore;
pub mod registry;
pub mod version_restore;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::Context;
use crate::error::RunError;
use crate::manifest::BackupManifest;
use crate::operation::{Operation, OperationKind, OperationStatus};
use crate::runner::Runnable;

pub use engine::{
    create_and_run, get_all_checks, get_all_checks_for_operation, get_by_id, get_last_check,
    get_scheduled, load, run, schedule_new,
};
pub use registry::{CheckEntry, CHECKS};

/// Whether a check validates the local site before a backup or a backup
/// against the local site before a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckScope {
    /// Standalone, periodically refreshed.
    Backup,
    /// Owned by a restore or dry-run carrying a backup manifest.
    Restore,
}

/// A named verification with a persisted verdict.
///
/// `success`, `summary` and `detailed_report` only look at persisted
/// details; they report `false` / empty until the check has finished.
pub trait Check: Runnable {
    fn name(&self) -> &str {
        self.operation().kind().name()
    }

    fn success(&self) -> bool;
    fn summary(&self) -> String;
    fn detailed_report(&self) -> String;

    fn has_details(&self) -> bool {
        !self.detailed_report().is_empty()
    }
}

/// A check type that can be listed in the registry.
pub trait NamedCheck: Check + Sized + 'static {
    const NAME: &'static str;
    const SCOPE: CheckScope;

    fn from_operation(op: Operation) -> Result<Self, RunError>;
}

/// The operation behind a check plus its typed findings.
#[derive(Debug, Clone)]
pub struct CheckState<D> {
    op: Operation,
    details: Option<D>,
}

impl<D: Serialize + DeserializeOwned> CheckState<D> {
    /// Wraps `op`, reading findings back when it has finished.
    pub fn new(op: Operation, name: &str) -> Result<Self, RunError> {
        if op.kind() != &OperationKind::check(name) {
            return Err(RunError::WrongType {
                id: op.id().unwrap_or_default(),
                expected: OperationKind::check(name).to_string(),
                found: op.kind().to_string(),
            });
        }
        let details = if op.status() == OperationStatus::Finished {
            Some(op.typed_details::<D>()?)
        } else {
            None
        };
        Ok(Self { op, details })
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.op
    }

    /// Stores findings in memory and in the operation's details.
    pub fn record(&mut self, details: D) -> Result<(), RunError> {
        self.op.set_typed_details(&details)?;
        self.details = Some(details);
        Ok(())
    }

    /// Findings of a finished check.
    pub fn verdict(&self) -> Option<&D> {
        match self.op.status() {
            OperationStatus::Finished => self.details.as_ref(),
            _ => None,
        }
    }
}

/// The manifest of the restore or dry-run that owns `op`.
pub fn parent_manifest(ctx: &Context<'_>, op: &Operation) -> Result<BackupManifest, RunError> {
    let parent_id = op.parent_id().ok_or(RunError::MissingParent)?;
    let parent =
        Operation::get_by_id(ctx.store, parent_id)?.ok_or(RunError::ParentNotFound(parent_id))?;
    BackupManifest::from_remote_details(parent.remote_details()).map_err(|reason| {
        RunError::InvalidManifest {
            parent: parent_id,
            reason,
        }
    })
}

/// Human-readable byte count, e.g. `1.5 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let text = format!("{:.1}", value);
    format!("{} {}", text.trim_end_matches(".0"), UNITS[unit])
}

/// Error block for a check that failed or never started. The backtrace is
/// only shown in debug mode.
pub fn render_error(op: &Operation, debug: bool) -> String {
    let mut out = format!(
        "Error: {}",
        op.error_message().unwrap_or("the check did not complete")
    );
    if debug {
        if let Some(trace) = op.error_backtrace() {
            out.push_str("\n\n");
            out.push_str(trace);
        }
    }
    out
}

/// Full text report for display: the verdict with its details, the error
/// block, or the pending status.
pub fn render_report(check: &dyn Check, debug: bool) -> String {
    let op = check.operation();
    match op.status() {
        OperationStatus::Finished => {
            let verdict = if check.success() { "OK" } else { "WARNING" };
            let mut out = format!("[{}] {}: {}", verdict, check.name(), check.summary());
            if check.has_details() {
                out.push('\n');
                out.push_str(&check.detailed_report());
            }
            out
        }
        OperationStatus::Failed | OperationStatus::FailedToStart => {
            format!("[FAILED] {}\n{}", check.name(), render_error(op, debug))
        }
        status => format!("[{}] {}", status.as_str().to_uppercase(), check.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(100 * 1024 * 1024), "100 MB");
    }

    #[test]
    fn test_state_rejects_wrong_kind() {
        let op = Operation::new(OperationKind::Backup, OperationStatus::Scheduled);
        assert!(matches!(
            CheckState::<Sample>::new(op, "dbstatus"),
            Err(RunError::WrongType { .. })
        ));
    }

    #[test]
    fn test_state_verdict_requires_finished() {
        let op = Operation::new(OperationKind::check("x"), OperationStatus::InProgress);
        let mut state = CheckState::<Sample>::new(op, "x").unwrap();
        state.record(Sample { value: 3 }).unwrap();
        assert!(state.verdict().is_none());

        state.operation_mut().set_status(OperationStatus::Finished);
        assert_eq!(state.verdict(), Some(&Sample { value: 3 }));

        let reloaded = CheckState::<Sample>::new(state.operation().clone(), "x").unwrap();
        assert_eq!(reloaded.verdict(), Some(&Sample { value: 3 }));
    }

    #[test]
    fn test_render_error_hides_backtrace_without_debug() {
        let mut op = Operation::new(OperationKind::check("x"), OperationStatus::Failed);
        op.set_error(&RunError::MissingParent);
        let plain = render_error(&op, false);
        assert!(plain.starts_with("Error: "));
        assert!(!plain.contains("MissingParent"));
        assert!(render_error(&op, true).contains("MissingParent"));
    }
}
