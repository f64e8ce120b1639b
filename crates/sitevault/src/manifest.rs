//! Backup manifest as carried in a restore or dry-run's remote details.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::site::PluginInfo;
use crate::version::Version;

/// Key under which the manifest is stored in `remotedetails`.
pub const MANIFEST_KEY: &str = "manifest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveFile {
    pub name: String,
    /// Bytes.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub core_version: Version,
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginInfo>,
    #[serde(default)]
    pub archives: Vec<ArchiveFile>,
    /// Size of the database structure file, in bytes.
    #[serde(default)]
    pub structure_size: u64,
}

impl BackupManifest {
    pub fn new(core_version: Version) -> Self {
        Self {
            core_version,
            plugins: BTreeMap::new(),
            archives: Vec::new(),
            structure_size: 0,
        }
    }

    pub fn largest_archive(&self) -> u64 {
        self.archives.iter().map(|a| a.size).max().unwrap_or(0)
    }

    /// Reads the manifest out of an operation's remote details. The error is
    /// a human-readable reason.
    pub fn from_remote_details(remote: &Map<String, Value>) -> Result<Self, String> {
        let value = remote
            .get(MANIFEST_KEY)
            .ok_or_else(|| "no manifest in remote details".to_string())?;
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())
    }

    pub fn to_remote_details(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut remote = Map::new();
        remote.insert(MANIFEST_KEY.to_string(), serde_json::to_value(self)?);
        Ok(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_from_remote_details() {
        let remote = json!({
            "manifest": {
                "core_version": "2023042400.01",
                "plugins": {"mod_forum": {"version": 2023042400u64, "standard": true}},
                "archives": [{"name": "db.tar", "size": 10}, {"name": "files.tar", "size": 30}],
                "structure_size": 4
            }
        });
        let manifest = BackupManifest::from_remote_details(remote.as_object().unwrap()).unwrap();
        assert_eq!(manifest.largest_archive(), 30);
        assert!(manifest.plugins["mod_forum"].standard);
        assert_eq!(manifest.core_version.to_string(), "2023042400.01");
    }

    #[test]
    fn test_missing_or_malformed_manifest() {
        assert!(BackupManifest::from_remote_details(&Map::new()).is_err());
        let remote = json!({"manifest": {"plugins": []}});
        assert!(BackupManifest::from_remote_details(remote.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_empty_archive_list() {
        assert_eq!(BackupManifest::new(Version::new(1)).largest_archive(), 0);
    }
}
