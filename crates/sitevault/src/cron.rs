//! Periodic entry point driven by the host's task runner.

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::check::{self, registry, CheckScope};
use crate::context::Context;
use crate::error::Result;
use crate::operation::Operation;
use crate::runner::Runnable;
use crate::tool;

/// Name of the queued task that asks for a cron pass.
pub const CRON_TASK: &str = "sitevault_cron";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CronReport {
    pub tasks_drained: usize,
    pub checks_run: usize,
    pub tools_run: usize,
    /// Names of standalone pre-checks scheduled for refresh.
    pub prechecks_scheduled: Vec<String>,
    /// Ids of active processes that look abandoned.
    pub stuck: Vec<i64>,
}

impl CronReport {
    pub fn is_idle(&self) -> bool {
        self.checks_run == 0 && self.tools_run == 0 && self.prechecks_scheduled.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CronWorker;

impl CronWorker {
    pub fn new() -> Self {
        Self
    }

    /// One pass: drain queued tasks, run scheduled checks and tools oldest
    /// first, reschedule stale standalone pre-checks, and flag stuck
    /// processes.
    pub fn run_once(&self, ctx: &Context<'_>, now: i64) -> Result<CronReport> {
        let _span = info_span!("cron_run").entered();
        let mut report = CronReport::default();

        while let Some(task) = ctx.queue.take_next()? {
            debug!("Picked up task {}", task);
            report.tasks_drained += 1;
        }

        for mut check in check::get_scheduled(ctx)? {
            check::run(ctx, check.as_mut())?;
            report.checks_run += 1;
        }
        for mut tool in tool::get_scheduled(ctx)? {
            tool::run(ctx, tool.as_mut())?;
            report.tools_run += 1;
        }

        report.prechecks_scheduled = self.refresh_prechecks(ctx, now)?;

        let timeout = ctx.config.lock_timeout_secs;
        for op in Operation::get_active_processes(ctx.store, true, now, timeout)? {
            if op.is_stuck_in(ctx.store, now, timeout)? {
                let id = op.require_id()?;
                warn!(id, "Operation {} looks stuck", op.kind());
                report.stuck.push(id);
            }
        }

        info!(
            checks = report.checks_run,
            tools = report.tools_run,
            refreshed = report.prechecks_scheduled.len(),
            "Cron pass complete"
        );
        Ok(report)
    }

    /// Schedules each backup pre-check whose latest standalone run is
    /// missing or older than the refresh interval, unless one is active.
    fn refresh_prechecks(&self, ctx: &Context<'_>, now: i64) -> Result<Vec<String>> {
        let mut scheduled = Vec::new();
        for entry in registry::by_scope(CheckScope::Backup) {
            let due = match check::get_last_check(ctx, entry.name)? {
                None => true,
                Some(last) => {
                    let op = last.operation();
                    !op.is_active()
                        && now - op.finished_time() > ctx.config.precheck_refresh_secs
                }
            };
            if due {
                check::schedule_new(ctx, entry.name, None)?;
                scheduled.push(entry.name.to_string());
            }
        }
        Ok(scheduled)
    }
}
