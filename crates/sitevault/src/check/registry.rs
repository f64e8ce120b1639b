//! Name → constructor table for checks.

use std::collections::HashSet;

use super::configoverride::ConfigOverrideCheck;
use super::dbstatus::DbStatusCheck;
use super::diskspace::{DiskSpaceCheck, DiskSpaceRestoreCheck};
use super::envlimits::EnvLimitsCheck;
use super::plugins_restore::PluginsRestoreCheck;
use super::version_restore::VersionRestoreCheck;
use super::{Check, CheckScope, NamedCheck};
use crate::error::RunError;
use crate::operation::Operation;

type BuildFn = fn(Operation) -> Result<Box<dyn Check>, RunError>;

pub struct CheckEntry {
    pub name: &'static str,
    pub scope: CheckScope,
    build: BuildFn,
}

fn build_boxed<C: NamedCheck>(op: Operation) -> Result<Box<dyn Check>, RunError> {
    Ok(Box::new(C::from_operation(op)?))
}

impl CheckEntry {
    pub const fn of<C: NamedCheck>() -> Self {
        Self {
            name: C::NAME,
            scope: C::SCOPE,
            build: build_boxed::<C>,
        }
    }

    pub fn build(&self, op: Operation) -> Result<Box<dyn Check>, RunError> {
        (self.build)(op)
    }
}

pub static CHECKS: &[CheckEntry] = &[
    CheckEntry::of::<DbStatusCheck>(),
    CheckEntry::of::<DiskSpaceCheck>(),
    CheckEntry::of::<ConfigOverrideCheck>(),
    CheckEntry::of::<EnvLimitsCheck>(),
    CheckEntry::of::<DiskSpaceRestoreCheck>(),
    CheckEntry::of::<PluginsRestoreCheck>(),
    CheckEntry::of::<VersionRestoreCheck>(),
];

pub fn find(name: &str) -> Option<&'static CheckEntry> {
    CHECKS.iter().find(|entry| entry.name == name)
}

/// Checks of the given scope in registry order.
pub fn by_scope(scope: CheckScope) -> impl Iterator<Item = &'static CheckEntry> {
    CHECKS.iter().filter(move |entry| entry.scope == scope)
}

/// Registry consistency problems: empty or duplicate names.
pub fn validate() -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    for entry in CHECKS {
        if entry.name.is_empty() {
            problems.push("check with empty name".to_string());
        }
        if !seen.insert(entry.name) {
            problems.push(format!("duplicate check name '{}'", entry.name));
        }
    }
    problems
}
