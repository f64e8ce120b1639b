//! One-off maintenance actions run through the same lifecycle as checks.
//!
//! Tools have no parent and no verdict beyond reaching `finished`.

pub mod uninstall_plugins;

use serde_json::{Map, Value};
use tracing::info;

use crate::context::Context;
use crate::cron::CRON_TASK;
use crate::db::{OperationFilter, OperationRow};
use crate::error::{Result, RunError, VaultError};
use crate::operation::{Operation, OperationKind, OperationStatus, TOOL_PREFIX};
use crate::runner::{self, fail_to_start, Runnable};

pub use uninstall_plugins::UninstallPlugins;

pub trait Tool: Runnable {
    fn name(&self) -> &str {
        self.operation().kind().name()
    }

    /// What the run did; empty until finished.
    fn summary(&self) -> String;
}

pub trait NamedTool: Tool + Sized + 'static {
    const NAME: &'static str;

    /// Builds the tool from its operation; parameters live in the details.
    fn from_operation(op: Operation) -> std::result::Result<Self, RunError>;
}

type BuildFn = fn(Operation) -> std::result::Result<Box<dyn Tool>, RunError>;

pub struct ToolEntry {
    pub name: &'static str,
    build: BuildFn,
}

fn build_boxed<T: NamedTool>(op: Operation) -> std::result::Result<Box<dyn Tool>, RunError> {
    Ok(Box::new(T::from_operation(op)?))
}

impl ToolEntry {
    pub const fn of<T: NamedTool>() -> Self {
        Self {
            name: T::NAME,
            build: build_boxed::<T>,
        }
    }

    pub fn build(&self, op: Operation) -> std::result::Result<Box<dyn Tool>, RunError> {
        (self.build)(op)
    }
}

pub static TOOLS: &[ToolEntry] = &[ToolEntry::of::<UninstallPlugins>()];

pub fn find(name: &str) -> Option<&'static ToolEntry> {
    TOOLS.iter().find(|entry| entry.name == name)
}

fn entry_for(name: &str) -> Result<&'static ToolEntry> {
    find(name).ok_or_else(|| VaultError::UnknownTool(name.to_string()))
}

fn create(
    ctx: &Context<'_>,
    entry: &ToolEntry,
    params: Map<String, Value>,
    status: OperationStatus,
) -> Result<Box<dyn Tool>> {
    let mut op = Operation::new(OperationKind::tool(entry.name), status);
    op.set_details(params);
    op.save(ctx.store)?;

    match entry.build(op.clone()) {
        Ok(tool) => Ok(tool),
        Err(e) => {
            if let Some(row) = ctx.store.find_operation(op.require_id()?)? {
                fail_to_start(ctx, &row, &e)?;
            }
            Err(e.into())
        }
    }
}

/// Persists a `scheduled` tool run with `params` as its initial details.
pub fn schedule_new(
    ctx: &Context<'_>,
    name: &str,
    params: Map<String, Value>,
) -> Result<Box<dyn Tool>> {
    let entry = entry_for(name)?;
    let tool = create(ctx, entry, params, OperationStatus::Scheduled)?;
    ctx.queue.ensure_queued(CRON_TASK, crate::clock::now())?;
    info!(id = ?tool.operation().id(), "Scheduled tool {}", entry.name);
    Ok(tool)
}

pub fn create_and_run(
    ctx: &Context<'_>,
    name: &str,
    params: Map<String, Value>,
) -> Result<Box<dyn Tool>> {
    let entry = entry_for(name)?;
    let mut tool = create(ctx, entry, params, OperationStatus::InProgress)?;
    run(ctx, tool.as_mut())?;
    Ok(tool)
}

pub fn run(ctx: &Context<'_>, tool: &mut dyn Tool) -> Result<()> {
    runner::run(ctx, tool)?;
    Ok(())
}

/// Same contract as the check loader: non-tools and broken tools yield
/// `None`, the latter after being flipped to `failedtostart`.
pub fn load(ctx: &Context<'_>, row: &OperationRow) -> Result<Option<Box<dyn Tool>>> {
    if !row.optype.starts_with(TOOL_PREFIX) {
        return Ok(None);
    }

    let op = match Operation::from_row(row) {
        Ok(Some(op)) => op,
        Ok(None) => {
            let name = row.optype[TOOL_PREFIX.len()..].to_string();
            fail_to_start(ctx, row, &VaultError::UnknownTool(name))?;
            return Ok(None);
        }
        Err(e) => {
            fail_to_start(ctx, row, &e)?;
            return Ok(None);
        }
    };
    let OperationKind::Tool(name) = op.kind() else {
        return Ok(None);
    };

    let Some(entry) = find(name) else {
        fail_to_start(ctx, row, &VaultError::UnknownTool(name.clone()))?;
        return Ok(None);
    };
    match entry.build(op) {
        Ok(tool) => Ok(Some(tool)),
        Err(e) => {
            fail_to_start(ctx, row, &e)?;
            Ok(None)
        }
    }
}

pub fn get_by_id(ctx: &Context<'_>, id: i64) -> Result<Option<Box<dyn Tool>>> {
    match ctx.store.find_operation(id)? {
        Some(row) => load(ctx, &row),
        None => Ok(None),
    }
}

/// Tool runs waiting for the cron worker, oldest first.
pub fn get_scheduled(ctx: &Context<'_>) -> Result<Vec<Box<dyn Tool>>> {
    let filter = OperationFilter {
        type_prefix: Some(TOOL_PREFIX.to_string()),
        statuses: vec![OperationStatus::Scheduled.as_str().to_string()],
        ..Default::default()
    };
    let mut rows = ctx.store.query_operations(&filter)?;
    rows.reverse();

    let mut tools = Vec::with_capacity(rows.len());
    for row in &rows {
        if let Some(tool) = load(ctx, row)? {
            tools.push(tool);
        }
    }
    Ok(tools)
}
