//! Runtime limits a backup needs: memory, execution time, temp directory.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{format_bytes, Check, CheckScope, CheckState, NamedCheck};
use crate::context::Context;
use crate::error::RunError;
use crate::operation::Operation;
use crate::runner::Runnable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvLimitsDetails {
    /// `None` is unlimited.
    pub memory_limit: Option<u64>,
    pub min_memory_limit: u64,
    /// `None` is unlimited.
    pub time_limit_secs: Option<u64>,
    pub min_time_limit_secs: u64,
    pub temp_dir_writable: bool,
}

impl EnvLimitsDetails {
    pub fn memory_ok(&self) -> bool {
        self.memory_limit.map_or(true, |m| m >= self.min_memory_limit)
    }

    pub fn time_ok(&self) -> bool {
        self.time_limit_secs
            .map_or(true, |t| t >= self.min_time_limit_secs)
    }

    pub fn all_ok(&self) -> bool {
        self.memory_ok() && self.time_ok() && self.temp_dir_writable
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let (false, Some(limit)) = (self.memory_ok(), self.memory_limit) {
            problems.push(format!(
                "Memory limit {} is below the required {}",
                format_bytes(limit),
                format_bytes(self.min_memory_limit)
            ));
        }
        if let (false, Some(limit)) = (self.time_ok(), self.time_limit_secs) {
            problems.push(format!(
                "Execution time limit {}s is below the required {}s",
                limit, self.min_time_limit_secs
            ));
        }
        if !self.temp_dir_writable {
            problems.push("Temporary directory is not writable".to_string());
        }
        problems
    }
}

pub struct EnvLimitsCheck {
    state: CheckState<EnvLimitsDetails>,
}

impl NamedCheck for EnvLimitsCheck {
    const NAME: &'static str = "envlimits";
    const SCOPE: CheckScope = CheckScope::Backup;

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        Ok(Self {
            state: CheckState::new(op, Self::NAME)?,
        })
    }
}

impl Runnable for EnvLimitsCheck {
    fn operation(&self) -> &Operation {
        self.state.operation()
    }

    fn operation_mut(&mut self) -> &mut Operation {
        self.state.operation_mut()
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        let limits = ctx.site.limits()?;
        self.state.record(EnvLimitsDetails {
            memory_limit: limits.memory_limit,
            min_memory_limit: ctx.config.min_memory_limit,
            time_limit_secs: limits.time_limit_secs,
            min_time_limit_secs: ctx.config.min_time_limit_secs,
            temp_dir_writable: limits.temp_dir_writable,
        })
    }
}

impl Check for EnvLimitsCheck {
    fn success(&self) -> bool {
        self.state.verdict().is_some_and(EnvLimitsDetails::all_ok)
    }

    fn summary(&self) -> String {
        match self.state.verdict() {
            None => String::new(),
            Some(d) if d.all_ok() => "Environment limits are sufficient".to_string(),
            Some(d) => format!("{} environment limits are insufficient", d.problems().len()),
        }
    }

    fn detailed_report(&self) -> String {
        let Some(d) = self.state.verdict() else {
            return String::new();
        };
        let mut out = String::new();
        for problem in d.problems() {
            let _ = writeln!(out, "{}", problem);
        }
        out.trim_end().to_string()
    }
}
