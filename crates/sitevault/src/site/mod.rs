//! Host site port.
//!
//! Everything the checks and tools need to know about the running site
//! (schema, disk, configuration, plugins, limits) comes through [`Site`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::Schema;
use crate::version::Version;

pub mod snapshot;

pub use snapshot::StaticSite;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Site information unavailable: {0}")]
    Unavailable(String),

    #[error("Plugin '{0}' is not installed")]
    PluginNotFound(String),

    #[error("Plugin '{0}' is part of the standard distribution and cannot be uninstalled")]
    StandardPlugin(String),

    #[error("Failed to read site snapshot '{path}': {source}")]
    ReadSnapshot {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse site snapshot: {0}")]
    ParseSnapshot(#[from] serde_json::Error),
}

/// Sizes relevant to the backup scratch-space estimate, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    /// `None` when the filesystem cannot report a quota.
    #[serde(default)]
    pub free_space: Option<u64>,
    #[serde(default)]
    pub largest_file: u64,
    #[serde(default)]
    pub largest_table: u64,
    #[serde(default)]
    pub largest_dataroot_file: u64,
}

/// A configuration value forced by the site's config file rather than
/// stored in the settings table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverride {
    /// `None` for core settings.
    #[serde(default)]
    pub plugin: Option<String>,
    pub name: String,
    pub value: String,
}

impl ConfigOverride {
    /// `name` for core settings, `plugin/name` otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.plugin {
            Some(plugin) => format!("{}/{}", plugin, self.name),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentLimits {
    /// `None` means unlimited.
    #[serde(default)]
    pub memory_limit: Option<u64>,
    /// `None` means unlimited.
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub temp_dir_writable: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub version: Version,
    /// Shipped with the core distribution.
    #[serde(default)]
    pub standard: bool,
}

pub trait Site: Send + Sync {
    fn live_schema(&self) -> Result<Schema, SiteError>;
    fn reference_schema(&self) -> Result<Schema, SiteError>;
    fn disk_usage(&self) -> Result<DiskUsage, SiteError>;
    fn config_overrides(&self) -> Result<Vec<ConfigOverride>, SiteError>;
    /// The value a setting has when nobody overrides it.
    fn default_setting(&self, plugin: Option<&str>, name: &str) -> Option<String>;
    /// Whether the settings admin tree knows this setting.
    fn admin_setting_exists(&self, plugin: Option<&str>, name: &str) -> bool;
    fn limits(&self) -> Result<EnvironmentLimits, SiteError>;
    fn plugins(&self) -> Result<BTreeMap<String, PluginInfo>, SiteError>;
    fn core_version(&self) -> Result<Version, SiteError>;
    fn uninstall_plugin(&self, name: &str) -> Result<(), SiteError>;
}
