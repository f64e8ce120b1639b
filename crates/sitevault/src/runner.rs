//! Shared execution of checks and tools.

use tracing::{debug, info_span, warn};

use crate::context::Context;
use crate::db::{DatabaseError, OperationRow};
use crate::error::{OperationError, RunError};
use crate::oplog::LogLevel;
use crate::operation::{mark_failed_to_start, Operation, OperationStatus};
use crate::report::ErrorReport;

/// Something backed by an [`Operation`] row that does its work in
/// [`Runnable::perform`].
pub trait Runnable {
    fn operation(&self) -> &Operation;
    fn operation_mut(&mut self) -> &mut Operation;

    /// Does the work and stores findings in the operation's details.
    /// Expected negative outcomes return `Ok`.
    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError>;
}

/// Moves the operation to `inprogress`, performs it, and records the
/// terminal status: `finished` on success, `failed` with the error in the
/// details otherwise. Only storage failures are returned.
pub fn run<T: Runnable + ?Sized>(ctx: &Context<'_>, item: &mut T) -> Result<(), OperationError> {
    let id = item.operation().require_id()?;
    let kind = item.operation().kind().to_string();
    let _span = info_span!("run_operation", id, kind = %kind).entered();

    if item.operation().status() != OperationStatus::InProgress {
        let op = item.operation_mut();
        op.set_status(OperationStatus::InProgress);
        op.save(ctx.store)?;
    }
    debug!("Performing {}", kind);

    match item.perform(ctx) {
        Ok(()) => {
            let op = item.operation_mut();
            op.set_status(OperationStatus::Finished);
            op.save(ctx.store)?;
            ctx.log(item.operation(), LogLevel::Info, &format!("{} finished", kind))?;
        }
        Err(e) => {
            warn!("{} failed: {}", kind, e);
            let op = item.operation_mut();
            op.set_error(&e);
            op.set_status(OperationStatus::Failed);
            op.save(ctx.store)?;
            ctx.log(
                item.operation(),
                LogLevel::Error,
                &format!("{} failed: {}", kind, e),
            )?;
            ctx.report_error(item.operation());
        }
    }
    Ok(())
}

/// Loader-boundary handling for a stored check or tool that cannot be
/// turned into a runnable value: log, flip an active row to
/// `failedtostart`, and report.
pub(crate) fn fail_to_start(
    ctx: &Context<'_>,
    row: &OperationRow,
    err: &(dyn std::error::Error + 'static),
) -> Result<(), DatabaseError> {
    warn!("Operation {} ({}) failed to start: {}", row.id, row.optype, err);
    mark_failed_to_start(ctx.store, row, err)?;
    ctx.reporter.report(&ErrorReport {
        operation_id: Some(row.id),
        operation_type: row.optype.clone(),
        message: err.to_string(),
        backtrace: format!("{:?}", err),
    });
    Ok(())
}
