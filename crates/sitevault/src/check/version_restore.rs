//! Core version of a backup against the local core version.

use serde::{Deserialize, Serialize};

use super::{parent_manifest, Check, CheckScope, CheckState, NamedCheck};
use crate::context::Context;
use crate::error::RunError;
use crate::operation::Operation;
use crate::runner::Runnable;
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    pub backup_version: Version,
    pub live_version: Version,
}

impl VersionDetails {
    pub fn compatible(&self) -> bool {
        self.live_version >= self.backup_version
    }

    pub fn core_needs_upgrade(&self) -> bool {
        self.live_version > self.backup_version
    }
}

pub struct VersionRestoreCheck {
    state: CheckState<VersionDetails>,
}

impl VersionRestoreCheck {
    /// The restored data will go through the core upgrade.
    pub fn core_needs_upgrade(&self) -> bool {
        self.state
            .verdict()
            .is_some_and(VersionDetails::core_needs_upgrade)
    }
}

impl NamedCheck for VersionRestoreCheck {
    const NAME: &'static str = "version_restore";
    const SCOPE: CheckScope = CheckScope::Restore;

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        Ok(Self {
            state: CheckState::new(op, Self::NAME)?,
        })
    }
}

impl Runnable for VersionRestoreCheck {
    fn operation(&self) -> &Operation {
        self.state.operation()
    }

    fn operation_mut(&mut self) -> &mut Operation {
        self.state.operation_mut()
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        let manifest = parent_manifest(ctx, self.state.operation())?;
        self.state.record(VersionDetails {
            backup_version: manifest.core_version,
            live_version: ctx.site.core_version()?,
        })
    }
}

impl Check for VersionRestoreCheck {
    fn success(&self) -> bool {
        self.state.verdict().is_some_and(VersionDetails::compatible)
    }

    fn summary(&self) -> String {
        let Some(d) = self.state.verdict() else {
            return String::new();
        };
        if !d.compatible() {
            format!(
                "The backup was made on a newer version ({}) than this site ({}); upgrade first",
                d.backup_version, d.live_version
            )
        } else if d.core_needs_upgrade() {
            format!(
                "The backup ({}) will be upgraded to this site's version ({})",
                d.backup_version, d.live_version
            )
        } else {
            format!("Backup and site have the same version ({})", d.live_version)
        }
    }

    fn detailed_report(&self) -> String {
        String::new()
    }
}
