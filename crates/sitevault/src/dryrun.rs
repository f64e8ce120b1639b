//! Dry-run: the restore pre-checks run against a backup manifest without
//! touching any data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info_span;

use crate::check::{self, Check};
use crate::clock;
use crate::context::Context;
use crate::error::{OperationError, Result, VaultError};
use crate::manifest::BackupManifest;
use crate::oplog::LogLevel;
use crate::operation::{Operation, OperationKind, OperationStatus};
use crate::runner::Runnable;

/// Run in this order; later checks are still run when earlier ones fail.
pub const RESTORE_PRECHECKS: [&str; 3] = ["version_restore", "plugins_restore", "diskspace_restore"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub name: String,
    pub id: Option<i64>,
    pub status: OperationStatus,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunDetails {
    pub success: bool,
    pub checks: Vec<CheckOutcome>,
}

pub struct DryRun {
    op: Operation,
    outcomes: Vec<CheckOutcome>,
}

impl DryRun {
    /// Creates the dry-run operation and runs every restore pre-check as a
    /// child. Refuses to start while another backup, restore or dry-run is
    /// active and not stuck.
    pub fn start(ctx: &Context<'_>, backup_key: &str, manifest: &BackupManifest) -> Result<Self> {
        let now = clock::now();
        let active =
            Operation::get_active_processes(ctx.store, false, now, ctx.config.lock_timeout_secs)?;
        if let Some(other) = active.first() {
            return Err(VaultError::ProcessActive {
                id: other.require_id()?,
                kind: other.kind().to_string(),
            });
        }

        let mut op = Operation::new(OperationKind::DryRun, OperationStatus::InProgress)
            .with_backup_key(Some(backup_key.to_string()));
        op.set_remote_details(
            manifest
                .to_remote_details()
                .map_err(OperationError::EncodeDetails)?,
        );
        op.generate_access_key();
        op.save(ctx.store)?;

        let id = op.require_id()?;
        let _span = info_span!("dryrun", id, backup_key).entered();

        let mut dryrun = Self {
            op,
            outcomes: Vec::new(),
        };
        if let Err(e) = dryrun.run_checks(ctx) {
            dryrun.op.set_error(&e);
            dryrun.op.set_status(OperationStatus::Failed);
            dryrun.op.save(ctx.store)?;
            ctx.report_error(&dryrun.op);
            return Err(e);
        }
        Ok(dryrun)
    }

    fn run_checks(&mut self, ctx: &Context<'_>) -> Result<()> {
        ctx.log(
            &self.op,
            LogLevel::Info,
            &format!(
                "Dry-run started for backup {}",
                self.op.backup_key().unwrap_or_default()
            ),
        )?;

        let mut broken = Vec::new();
        for name in RESTORE_PRECHECKS {
            ctx.log(&self.op, LogLevel::Info, &format!("Running check {}", name))?;
            let check = check::create_and_run(ctx, name, Some(&self.op))?;
            let outcome = outcome_of(check.as_ref());

            match outcome.status {
                OperationStatus::Finished if outcome.success => {}
                OperationStatus::Finished => {
                    ctx.log(
                        &self.op,
                        LogLevel::Warning,
                        &format!("{}: {}", name, check.summary()),
                    )?;
                }
                _ => {
                    ctx.log(
                        &self.op,
                        LogLevel::Error,
                        &format!("Check {} could not be run", name),
                    )?;
                    broken.push(name);
                }
            }
            self.outcomes.push(outcome);
        }

        let details = DryRunDetails {
            success: broken.is_empty() && self.outcomes.iter().all(|o| o.success),
            checks: self.outcomes.clone(),
        };
        self.op.set_typed_details(&details)?;

        if broken.is_empty() {
            self.op.set_status(OperationStatus::Finished);
            self.op.save(ctx.store)?;
            let verdict = if details.success { "passed" } else { "found problems" };
            ctx.log(&self.op, LogLevel::Info, &format!("Dry-run {}", verdict))?;
        } else {
            let mut partial = Map::new();
            partial.insert(
                "error".to_string(),
                Value::String(format!("Checks could not be run: {}", broken.join(", "))),
            );
            self.op.set_details(partial);
            self.op.set_status(OperationStatus::Failed);
            self.op.save(ctx.store)?;
            ctx.log(&self.op, LogLevel::Error, "Dry-run failed")?;
        }
        Ok(())
    }

    pub fn operation(&self) -> &Operation {
        &self.op
    }

    pub fn outcomes(&self) -> &[CheckOutcome] {
        &self.outcomes
    }

    /// All pre-checks finished and succeeded.
    pub fn success(&self) -> bool {
        self.op.status() == OperationStatus::Finished
            && self
                .op
                .details()
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

fn outcome_of(check: &dyn Check) -> CheckOutcome {
    let op = check.operation();
    CheckOutcome {
        name: check.name().to_string(),
        id: op.id(),
        status: op.status(),
        success: check.success(),
    }
}
