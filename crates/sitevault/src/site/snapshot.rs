//! A [`Site`] backed by a captured snapshot.
//!
//! Snapshots are plain JSON documents, so the CLI can run checks against a
//! description of a site exported by the host. Facets missing from the
//! snapshot report [`SiteError::Unavailable`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::{ConfigOverride, DiskUsage, EnvironmentLimits, PluginInfo, Site, SiteError};
use crate::schema::Schema;
use crate::version::Version;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StaticSite {
    #[serde(default)]
    pub live_schema: Option<Schema>,
    #[serde(default)]
    pub reference_schema: Option<Schema>,
    #[serde(default)]
    pub disk: Option<DiskUsage>,
    #[serde(default)]
    pub overrides: Option<Vec<ConfigOverride>>,
    /// Default values keyed by `name` or `plugin/name`.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    /// Settings known to the admin tree, as `name` or `plugin/name`.
    #[serde(default)]
    pub admin_settings: BTreeSet<String>,
    #[serde(default)]
    pub limits: Option<EnvironmentLimits>,
    #[serde(default)]
    pub core_version: Option<Version>,
    #[serde(default)]
    plugins: RwLock<BTreeMap<String, PluginInfo>>,
}

fn setting_key(plugin: Option<&str>, name: &str) -> String {
    match plugin {
        Some(plugin) => format!("{}/{}", plugin, name),
        None => name.to_string(),
    }
}

fn unavailable(what: &str) -> SiteError {
    SiteError::Unavailable(format!("{} not present in site snapshot", what))
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, SiteError> {
        let content = std::fs::read_to_string(path).map_err(|e| SiteError::ReadSnapshot {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_live_schema(mut self, schema: Schema) -> Self {
        self.live_schema = Some(schema);
        self
    }

    pub fn with_reference_schema(mut self, schema: Schema) -> Self {
        self.reference_schema = Some(schema);
        self
    }

    pub fn with_disk(mut self, disk: DiskUsage) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn with_overrides(mut self, overrides: Vec<ConfigOverride>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn with_default(mut self, plugin: Option<&str>, name: &str, value: &str) -> Self {
        self.defaults
            .insert(setting_key(plugin, name), value.to_string());
        self
    }

    pub fn with_admin_setting(mut self, plugin: Option<&str>, name: &str) -> Self {
        self.admin_settings.insert(setting_key(plugin, name));
        self
    }

    pub fn with_limits(mut self, limits: EnvironmentLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_core_version(mut self, version: Version) -> Self {
        self.core_version = Some(version);
        self
    }

    pub fn with_plugin(self, name: &str, version: Version, standard: bool) -> Self {
        if let Ok(mut plugins) = self.plugins.write() {
            plugins.insert(name.to_string(), PluginInfo { version, standard });
        }
        self
    }
}

impl Site for StaticSite {
    fn live_schema(&self) -> Result<Schema, SiteError> {
        self.live_schema.clone().ok_or_else(|| unavailable("live schema"))
    }

    fn reference_schema(&self) -> Result<Schema, SiteError> {
        self.reference_schema
            .clone()
            .ok_or_else(|| unavailable("reference schema"))
    }

    fn disk_usage(&self) -> Result<DiskUsage, SiteError> {
        self.disk.clone().ok_or_else(|| unavailable("disk usage"))
    }

    fn config_overrides(&self) -> Result<Vec<ConfigOverride>, SiteError> {
        self.overrides
            .clone()
            .ok_or_else(|| unavailable("config overrides"))
    }

    fn default_setting(&self, plugin: Option<&str>, name: &str) -> Option<String> {
        self.defaults.get(&setting_key(plugin, name)).cloned()
    }

    fn admin_setting_exists(&self, plugin: Option<&str>, name: &str) -> bool {
        self.admin_settings.contains(&setting_key(plugin, name))
    }

    fn limits(&self) -> Result<EnvironmentLimits, SiteError> {
        self.limits.clone().ok_or_else(|| unavailable("environment limits"))
    }

    fn plugins(&self) -> Result<BTreeMap<String, PluginInfo>, SiteError> {
        self.plugins
            .read()
            .map(|p| p.clone())
            .map_err(|_| SiteError::Unavailable("plugin list lock poisoned".to_string()))
    }

    fn core_version(&self) -> Result<Version, SiteError> {
        self.core_version.ok_or_else(|| unavailable("core version"))
    }

    fn uninstall_plugin(&self, name: &str) -> Result<(), SiteError> {
        let mut plugins = self
            .plugins
            .write()
            .map_err(|_| SiteError::Unavailable("plugin list lock poisoned".to_string()))?;
        match plugins.get(name) {
            None => Err(SiteError::PluginNotFound(name.to_string())),
            Some(info) if info.standard => Err(SiteError::StandardPlugin(name.to_string())),
            Some(_) => {
                plugins.remove(name);
                Ok(())
            }
        }
    }
}
