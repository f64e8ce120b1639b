//! Plugin versions in a backup against the plugins installed locally.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{parent_manifest, Check, CheckScope, CheckState, NamedCheck};
use crate::context::Context;
use crate::error::RunError;
use crate::operation::Operation;
use crate::runner::Runnable;
use crate::site::PluginInfo;
use crate::version::Version;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPair {
    pub name: String,
    pub backup_version: Version,
    pub live_version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPlugin {
    pub name: String,
    pub version: Version,
    pub standard: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsDetails {
    /// Backup newer than live: the live site must upgrade first.
    pub problem: Vec<VersionPair>,
    /// Live newer than backup: the restore runs the plugin's upgrade.
    pub needs_upgrade: Vec<VersionPair>,
    /// Installed locally, absent from the backup.
    pub extra: Vec<String>,
    /// In the backup, not installed locally.
    pub missing: Vec<MissingPlugin>,
    #[serde(default)]
    pub missing_allowed: bool,
}

impl PluginsDetails {
    pub fn missing_blocks_restore(&self) -> bool {
        !self.missing_allowed && self.missing.iter().any(|p| !p.standard)
    }

    pub fn ok(&self) -> bool {
        self.problem.is_empty() && !self.missing_blocks_restore()
    }
}

/// Classifies the union of plugin names. Equal versions land nowhere.
pub fn compare_plugins(
    backup: &BTreeMap<String, PluginInfo>,
    live: &BTreeMap<String, PluginInfo>,
    missing_allowed: bool,
) -> PluginsDetails {
    let names: BTreeSet<&String> = backup.keys().chain(live.keys()).collect();
    let mut details = PluginsDetails {
        missing_allowed,
        ..Default::default()
    };

    for name in names {
        match (backup.get(name), live.get(name)) {
            (Some(b), Some(l)) if b.version > l.version => details.problem.push(VersionPair {
                name: name.clone(),
                backup_version: b.version,
                live_version: l.version,
            }),
            (Some(b), Some(l)) if b.version < l.version => details.needs_upgrade.push(VersionPair {
                name: name.clone(),
                backup_version: b.version,
                live_version: l.version,
            }),
            (Some(_), Some(_)) => {}
            (None, Some(_)) => details.extra.push(name.clone()),
            (Some(b), None) => details.missing.push(MissingPlugin {
                name: name.clone(),
                version: b.version,
                standard: b.standard,
            }),
            (None, None) => {}
        }
    }
    details
}

pub struct PluginsRestoreCheck {
    state: CheckState<PluginsDetails>,
}

impl NamedCheck for PluginsRestoreCheck {
    const NAME: &'static str = "plugins_restore";
    const SCOPE: CheckScope = CheckScope::Restore;

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        Ok(Self {
            state: CheckState::new(op, Self::NAME)?,
        })
    }
}

impl Runnable for PluginsRestoreCheck {
    fn operation(&self) -> &Operation {
        self.state.operation()
    }

    fn operation_mut(&mut self) -> &mut Operation {
        self.state.operation_mut()
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        let manifest = parent_manifest(ctx, self.state.operation())?;
        let live = ctx.site.plugins()?;
        self.state.record(compare_plugins(
            &manifest.plugins,
            &live,
            ctx.config.allow_missing_plugins,
        ))
    }
}

impl Check for PluginsRestoreCheck {
    fn success(&self) -> bool {
        self.state.verdict().is_some_and(PluginsDetails::ok)
    }

    fn summary(&self) -> String {
        let Some(d) = self.state.verdict() else {
            return String::new();
        };
        if d.ok() {
            format!(
                "All plugins can be restored ({} will be upgraded)",
                d.needs_upgrade.len()
            )
        } else {
            format!(
                "{} plugins are newer in the backup, {} are missing",
                d.problem.len(),
                d.missing.len()
            )
        }
    }

    fn detailed_report(&self) -> String {
        let Some(d) = self.state.verdict() else {
            return String::new();
        };
        let mut out = String::new();
        for p in &d.problem {
            let _ = writeln!(
                out,
                "Newer in backup: {} ({} > {})",
                p.name, p.backup_version, p.live_version
            );
        }
        for p in &d.needs_upgrade {
            let _ = writeln!(
                out,
                "Will be upgraded: {} ({} < {})",
                p.name, p.backup_version, p.live_version
            );
        }
        for p in &d.missing {
            let kind = if p.standard { "standard" } else { "add-on" };
            let _ = writeln!(out, "Missing {} plugin: {} ({})", kind, p.name, p.version);
        }
        for name in &d.extra {
            let _ = writeln!(out, "Not in backup: {}", name);
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugins(entries: &[(&str, u64, bool)]) -> BTreeMap<String, PluginInfo> {
        entries
            .iter()
            .map(|(name, version, standard)| {
                (
                    name.to_string(),
                    PluginInfo {
                        version: Version::new(*version),
                        standard: *standard,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_backup_newer_is_problem() {
        let d = compare_plugins(
            &plugins(&[("mod_x", 2, false)]),
            &plugins(&[("mod_x", 1, false)]),
            false,
        );
        assert_eq!(d.problem.len(), 1);
        assert!(!d.ok());
    }

    #[test]
    fn test_live_newer_needs_upgrade() {
        let d = compare_plugins(
            &plugins(&[("mod_x", 1, false)]),
            &plugins(&[("mod_x", 2, false)]),
            false,
        );
        assert_eq!(d.needs_upgrade.len(), 1);
        assert!(d.problem.is_empty());
        assert!(d.ok());
    }

    #[test]
    fn test_missing_and_extra() {
        let backup = plugins(&[("mod_core", 1, true), ("local_custom", 1, false)]);
        let live = plugins(&[("block_new", 1, false)]);

        let d = compare_plugins(&backup, &live, false);
        assert_eq!(d.extra, vec!["block_new"]);
        assert_eq!(d.missing.len(), 2);
        assert!(!d.ok());

        let allowed = compare_plugins(&backup, &live, true);
        assert!(allowed.ok());
    }

    #[test]
    fn test_only_standard_missing_is_fine() {
        let d = compare_plugins(&plugins(&[("mod_core", 1, true)]), &BTreeMap::new(), false);
        assert!(d.ok());
    }
}
