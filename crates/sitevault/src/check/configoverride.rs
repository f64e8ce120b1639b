//! Which config-file overrides travel with a backup.
//!
//! Overrides are partitioned in order: hard denylist, overrides equal to
//! the default, known-sensitive settings, known-safe settings, and finally
//! unknown settings, which are only kept when the admin tree defines them.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{Check, CheckScope, CheckState, NamedCheck};
use crate::context::Context;
use crate::error::RunError;
use crate::operation::Operation;
use crate::runner::Runnable;
use crate::site::{ConfigOverride, Site};

/// Never backed up: connection and path settings, plus test harness
/// settings matched by pattern.
const DENYLIST: &[&str] = &[
    "dbtype",
    "dblibrary",
    "dbhost",
    "dbname",
    "dbuser",
    "dbpass",
    "prefix",
    "dboptions",
    "wwwroot",
    "dataroot",
    "dirroot",
    "admin",
    "directorypermissions",
    "filepermissions",
    "sessioncookie",
    "sessioncookiepath",
    "sessioncookiedomain",
    "localcachedir",
    "tempdir",
    "cachedir",
    "backuptempdir",
    "sslproxy",
    "reverseproxy",
    "phpunit_*",
    "behat_*",
    "test_*",
];

/// Credentials and secrets.
const SENSITIVE: &[&str] = &[
    "smtppass",
    "smtpuser",
    "proxypassword",
    "proxyuser",
    "recaptchaprivatekey",
    "passwordsaltmain",
    "auth_ldap/bind_pw",
    "auth_ldap/bind_dn",
    "auth_cas/bind_pw",
    "enrol_ldap/bind_pw",
    "search_solr/server_password",
    "tool_objectfs/s3_secret",
];

/// Known to be harmless to restore on another instance.
const SAFE: &[&str] = &[
    "theme",
    "lang",
    "timezone",
    "forcetimezone",
    "debug",
    "debugdisplay",
    "maxbytes",
    "noemailever",
    "divertallemailsto",
    "cronclionly",
    "preventexecpath",
    "pathtophp",
    "pathtodu",
    "pathtogs",
];

fn matches_entry(entry: &str, qualified: &str) -> bool {
    if entry.contains('*') {
        glob::Pattern::new(entry).is_ok_and(|p| p.matches(qualified))
    } else {
        entry == qualified
    }
}

fn listed(list: &[&str], qualified: &str) -> bool {
    list.iter().any(|entry| matches_entry(entry, qualified))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDecision {
    Denylisted,
    DefaultValue,
    Sensitive,
    Safe,
    /// Unknown but defined in the admin tree.
    Known,
    Unknown,
}

impl OverrideDecision {
    pub fn included(&self) -> bool {
        matches!(self, OverrideDecision::Safe | OverrideDecision::Known)
    }
}

pub fn classify_override(site: &dyn Site, ov: &ConfigOverride) -> OverrideDecision {
    let qualified = ov.qualified_name();
    let plugin = ov.plugin.as_deref();

    if listed(DENYLIST, &qualified) {
        OverrideDecision::Denylisted
    } else if site.default_setting(plugin, &ov.name).as_deref() == Some(ov.value.as_str()) {
        OverrideDecision::DefaultValue
    } else if listed(SENSITIVE, &qualified) {
        OverrideDecision::Sensitive
    } else if listed(SAFE, &qualified) {
        OverrideDecision::Safe
    } else if site.admin_setting_exists(plugin, &ov.name) {
        OverrideDecision::Known
    } else {
        OverrideDecision::Unknown
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrideDetails {
    pub included: Vec<String>,
    pub denylisted: Vec<String>,
    pub default_value: Vec<String>,
    pub sensitive: Vec<String>,
    pub unknown: Vec<String>,
}

impl ConfigOverrideDetails {
    pub fn excluded_count(&self) -> usize {
        self.denylisted.len() + self.default_value.len() + self.sensitive.len() + self.unknown.len()
    }
}

pub fn partition_overrides(site: &dyn Site, overrides: &[ConfigOverride]) -> ConfigOverrideDetails {
    let mut details = ConfigOverrideDetails::default();
    for ov in overrides {
        let bucket = match classify_override(site, ov) {
            OverrideDecision::Denylisted => &mut details.denylisted,
            OverrideDecision::DefaultValue => &mut details.default_value,
            OverrideDecision::Sensitive => &mut details.sensitive,
            OverrideDecision::Safe | OverrideDecision::Known => &mut details.included,
            OverrideDecision::Unknown => &mut details.unknown,
        };
        bucket.push(ov.qualified_name());
    }
    details
}

pub struct ConfigOverrideCheck {
    state: CheckState<ConfigOverrideDetails>,
}

impl NamedCheck for ConfigOverrideCheck {
    const NAME: &'static str = "configoverride";
    const SCOPE: CheckScope = CheckScope::Backup;

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        Ok(Self {
            state: CheckState::new(op, Self::NAME)?,
        })
    }
}

impl Runnable for ConfigOverrideCheck {
    fn operation(&self) -> &Operation {
        self.state.operation()
    }

    fn operation_mut(&mut self) -> &mut Operation {
        self.state.operation_mut()
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        let overrides = ctx.site.config_overrides()?;
        self.state.record(partition_overrides(ctx.site, &overrides))
    }
}

impl Check for ConfigOverrideCheck {
    fn success(&self) -> bool {
        self.state.verdict().is_some()
    }

    fn summary(&self) -> String {
        let Some(d) = self.state.verdict() else {
            return String::new();
        };
        format!(
            "{} config overrides will be included in the backup, {} excluded",
            d.included.len(),
            d.excluded_count()
        )
    }

    fn detailed_report(&self) -> String {
        let Some(d) = self.state.verdict() else {
            return String::new();
        };
        let mut out = String::new();
        for (label, names) in [
            ("Included", &d.included),
            ("Never backed up", &d.denylisted),
            ("Same as default", &d.default_value),
            ("Sensitive", &d.sensitive),
            ("Unknown setting", &d.unknown),
        ] {
            if !names.is_empty() {
                let _ = writeln!(out, "{}: {}", label, names.join(", "));
            }
        }
        out.trim_end().to_string()
    }
}
