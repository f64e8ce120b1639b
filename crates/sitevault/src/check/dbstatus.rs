//! Database structure check: the live schema against the reference schema.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{Check, CheckScope, CheckState, NamedCheck};
use crate::context::Context;
use crate::error::{ConfigError, RunError};
use crate::operation::Operation;
use crate::runner::Runnable;
use crate::schema::{Schema, TableChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbStatus {
    Clean,
    /// No drift, but some tables were excluded from the comparison.
    NoModifications,
    Modified,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedTable {
    pub table: String,
    pub changes: Vec<TableChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidTable {
    pub table: String,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStatusDetails {
    pub status: DbStatus,
    /// Present in the live database only.
    pub extra: Vec<String>,
    /// Present in the reference schema only.
    pub missing: Vec<String>,
    pub changed: Vec<ChangedTable>,
    pub invalid: Vec<InvalidTable>,
    #[serde(default)]
    pub excluded: Vec<String>,
}

/// Tables left out of backups, by exact name or glob pattern.
#[derive(Debug, Clone, Default)]
pub struct TableExclusions {
    names: Vec<String>,
    patterns: Vec<glob::Pattern>,
}

impl TableExclusions {
    pub fn new(entries: &[String]) -> Result<Self, ConfigError> {
        let mut exclusions = Self::default();
        for entry in entries {
            if entry.contains(&['*', '?', '['][..]) {
                let pattern =
                    glob::Pattern::new(entry).map_err(|e| ConfigError::InvalidPattern {
                        pattern: entry.clone(),
                        reason: e.to_string(),
                    })?;
                exclusions.patterns.push(pattern);
            } else {
                exclusions.names.push(entry.clone());
            }
        }
        Ok(exclusions)
    }

    pub fn is_configured(&self) -> bool {
        !self.names.is_empty() || !self.patterns.is_empty()
    }

    pub fn is_excluded(&self, table: &str) -> bool {
        self.names.iter().any(|n| n == table) || self.patterns.iter().any(|p| p.matches(table))
    }
}

/// Classifies every non-excluded table. Table names compare
/// case-sensitively; a table can be both changed and invalid.
pub fn compare_schemas(
    reference: &Schema,
    live: &Schema,
    exclusions: &TableExclusions,
) -> DbStatusDetails {
    let mut extra = Vec::new();
    let mut missing = Vec::new();
    let mut changed = Vec::new();
    let mut invalid = Vec::new();
    let mut excluded = Vec::new();

    for (name, expected) in &reference.tables {
        if exclusions.is_excluded(name) {
            excluded.push(name.clone());
            continue;
        }
        match live.tables.get(name) {
            None => missing.push(name.clone()),
            Some(actual) => {
                let changes = expected.diff(actual);
                if !changes.is_empty() {
                    changed.push(ChangedTable {
                        table: name.clone(),
                        changes,
                    });
                }
            }
        }
    }

    for (name, actual) in &live.tables {
        if exclusions.is_excluded(name) {
            if !reference.tables.contains_key(name) {
                excluded.push(name.clone());
            }
            continue;
        }
        if !reference.tables.contains_key(name) {
            extra.push(name.clone());
        }
        let problems = actual.validate();
        if !problems.is_empty() {
            invalid.push(InvalidTable {
                table: name.clone(),
                problems,
            });
        }
    }
    excluded.sort();

    let status = if !invalid.is_empty() {
        DbStatus::Invalid
    } else if !extra.is_empty() || !missing.is_empty() || !changed.is_empty() {
        DbStatus::Modified
    } else if exclusions.is_configured() {
        DbStatus::NoModifications
    } else {
        DbStatus::Clean
    };

    DbStatusDetails {
        status,
        extra,
        missing,
        changed,
        invalid,
        excluded,
    }
}

pub struct DbStatusCheck {
    state: CheckState<DbStatusDetails>,
}

impl DbStatusCheck {
    pub fn details(&self) -> Option<&DbStatusDetails> {
        self.state.verdict()
    }
}

impl NamedCheck for DbStatusCheck {
    const NAME: &'static str = "dbstatus";
    const SCOPE: CheckScope = CheckScope::Backup;

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        Ok(Self {
            state: CheckState::new(op, Self::NAME)?,
        })
    }
}

impl Runnable for DbStatusCheck {
    fn operation(&self) -> &Operation {
        self.state.operation()
    }

    fn operation_mut(&mut self) -> &mut Operation {
        self.state.operation_mut()
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        let exclusions = TableExclusions::new(&ctx.config.backup_exclude_tables)?;
        let reference = ctx.site.reference_schema()?;
        let live = ctx.site.live_schema()?;
        self.state
            .record(compare_schemas(&reference, &live, &exclusions))
    }
}

impl Check for DbStatusCheck {
    fn success(&self) -> bool {
        self.details()
            .is_some_and(|d| d.status != DbStatus::Invalid)
    }

    fn summary(&self) -> String {
        let Some(d) = self.details() else {
            return String::new();
        };
        match d.status {
            DbStatus::Clean => "Database structure matches the reference schema".to_string(),
            DbStatus::NoModifications => format!(
                "Database structure matches the reference schema ({} tables excluded)",
                d.excluded.len()
            ),
            DbStatus::Modified => format!(
                "Database structure has been modified: {} extra, {} missing, {} changed tables",
                d.extra.len(),
                d.missing.len(),
                d.changed.len()
            ),
            DbStatus::Invalid => format!(
                "Database structure is invalid: {} tables cannot be backed up",
                d.invalid.len()
            ),
        }
    }

    fn detailed_report(&self) -> String {
        let Some(d) = self.details() else {
            return String::new();
        };
        let mut out = String::new();
        for table in &d.extra {
            let _ = writeln!(out, "Extra table: {}", table);
        }
        for table in &d.missing {
            let _ = writeln!(out, "Missing table: {}", table);
        }
        for table in &d.changed {
            let _ = writeln!(out, "Changed table: {}", table.table);
            for change in &table.changes {
                let _ = writeln!(out, "  - {}", change);
            }
        }
        for table in &d.invalid {
            let _ = writeln!(out, "Invalid table: {}", table.table);
            for problem in &table.problems {
                let _ = writeln!(out, "  - {}", problem);
            }
        }
        out.trim_end().to_string()
    }
}
