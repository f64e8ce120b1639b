//! Scheduling, loading and running checks.

use tracing::info;

use super::{registry, Check, CheckEntry};
use crate::context::Context;
use crate::cron::CRON_TASK;
use crate::db::{OperationFilter, OperationRow};
use crate::error::{Result, VaultError};
use crate::operation::{Operation, OperationKind, OperationStatus, CHECK_PREFIX};
use crate::runner::{self, fail_to_start, Runnable};

fn entry_for(name: &str) -> Result<&'static CheckEntry> {
    registry::find(name).ok_or_else(|| VaultError::UnknownCheck(name.to_string()))
}

fn create(
    ctx: &Context<'_>,
    entry: &CheckEntry,
    parent: Option<&Operation>,
    status: OperationStatus,
) -> Result<Box<dyn Check>> {
    let parent_id = parent.map(Operation::require_id).transpose()?;
    let backup_key = parent.and_then(|p| p.backup_key().map(str::to_string));

    let mut op = Operation::new(OperationKind::check(entry.name), status)
        .with_parent(parent_id)
        .with_backup_key(backup_key);
    op.save(ctx.store)?;

    match entry.build(op.clone()) {
        Ok(check) => Ok(check),
        Err(e) => {
            if let Some(row) = ctx.store.find_operation(op.require_id()?)? {
                fail_to_start(ctx, &row, &e)?;
            }
            Err(e.into())
        }
    }
}

/// Persists a `scheduled` check and makes sure the cron task will pick it
/// up.
pub fn schedule_new(
    ctx: &Context<'_>,
    name: &str,
    parent: Option<&Operation>,
) -> Result<Box<dyn Check>> {
    let entry = entry_for(name)?;
    let check = create(ctx, entry, parent, OperationStatus::Scheduled)?;
    ctx.queue.ensure_queued(CRON_TASK, crate::clock::now())?;
    info!(id = ?check.operation().id(), "Scheduled check {}", entry.name);
    Ok(check)
}

/// Persists an `inprogress` check and runs it right away.
pub fn create_and_run(
    ctx: &Context<'_>,
    name: &str,
    parent: Option<&Operation>,
) -> Result<Box<dyn Check>> {
    let entry = entry_for(name)?;
    let mut check = create(ctx, entry, parent, OperationStatus::InProgress)?;
    run(ctx, check.as_mut())?;
    Ok(check)
}

/// Runs a loaded check to a terminal status.
pub fn run(ctx: &Context<'_>, check: &mut dyn Check) -> Result<()> {
    runner::run(ctx, check)?;
    Ok(())
}

/// Turns a stored row into a check. Rows that are not checks yield `None`;
/// broken checks are flipped to `failedtostart` and also yield `None`.
pub fn load(ctx: &Context<'_>, row: &OperationRow) -> Result<Option<Box<dyn Check>>> {
    if !row.optype.starts_with(CHECK_PREFIX) {
        return Ok(None);
    }

    let op = match Operation::from_row(row) {
        Ok(Some(op)) => op,
        Ok(None) => {
            let name = row.optype[CHECK_PREFIX.len()..].to_string();
            fail_to_start(ctx, row, &VaultError::UnknownCheck(name))?;
            return Ok(None);
        }
        Err(e) => {
            fail_to_start(ctx, row, &e)?;
            return Ok(None);
        }
    };
    let OperationKind::Check(name) = op.kind() else {
        return Ok(None);
    };

    let Some(entry) = registry::find(name) else {
        fail_to_start(ctx, row, &VaultError::UnknownCheck(name.clone()))?;
        return Ok(None);
    };
    match entry.build(op) {
        Ok(check) => Ok(Some(check)),
        Err(e) => {
            fail_to_start(ctx, row, &e)?;
            Ok(None)
        }
    }
}

fn load_all(ctx: &Context<'_>, rows: Vec<OperationRow>) -> Result<Vec<Box<dyn Check>>> {
    let mut checks = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(check) = load(ctx, row)? {
            checks.push(check);
        }
    }
    Ok(checks)
}

fn checks_filter() -> OperationFilter {
    OperationFilter {
        type_prefix: Some(CHECK_PREFIX.to_string()),
        ..Default::default()
    }
}

pub fn get_by_id(ctx: &Context<'_>, id: i64) -> Result<Option<Box<dyn Check>>> {
    match ctx.store.find_operation(id)? {
        Some(row) => load(ctx, &row),
        None => Ok(None),
    }
}

/// Standalone checks, latest first.
pub fn get_all_checks(ctx: &Context<'_>) -> Result<Vec<Box<dyn Check>>> {
    let filter = OperationFilter {
        standalone: true,
        ..checks_filter()
    };
    load_all(ctx, ctx.store.query_operations(&filter)?)
}

/// The latest standalone check named `name`.
pub fn get_last_check(ctx: &Context<'_>, name: &str) -> Result<Option<Box<dyn Check>>> {
    let filter = OperationFilter {
        types: vec![OperationKind::check(name).to_string()],
        standalone: true,
        limit: Some(1),
        ..Default::default()
    };
    Ok(load_all(ctx, ctx.store.query_operations(&filter)?)?
        .into_iter()
        .next())
}

/// Checks owned by operation `parent_id`, latest first.
pub fn get_all_checks_for_operation(
    ctx: &Context<'_>,
    parent_id: i64,
) -> Result<Vec<Box<dyn Check>>> {
    let filter = OperationFilter {
        parentid: Some(parent_id),
        ..checks_filter()
    };
    load_all(ctx, ctx.store.query_operations(&filter)?)
}

/// Checks waiting for the cron worker, oldest first.
pub fn get_scheduled(ctx: &Context<'_>) -> Result<Vec<Box<dyn Check>>> {
    let filter = OperationFilter {
        statuses: vec![OperationStatus::Scheduled.as_str().to_string()],
        ..checks_filter()
    };
    let mut rows = ctx.store.query_operations(&filter)?;
    rows.reverse();
    load_all(ctx, rows)
}
