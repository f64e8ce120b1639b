//! Builders for creating test data programmatically.

#![allow(dead_code)]

use std::collections::BTreeMap;

use sitevault::manifest::{ArchiveFile, BackupManifest};
use sitevault::schema::{Column, Schema, Table};
use sitevault::site::{DiskUsage, EnvironmentLimits, PluginInfo};
use sitevault::{StaticSite, Version};

pub const MB: u64 = 1024 * 1024;

/// A table of non-null integer columns.
pub fn table(columns: &[&str]) -> Table {
    Table {
        columns: columns
            .iter()
            .map(|name| Column {
                name: name.to_string(),
                kind: "int".to_string(),
                length: None,
                not_null: true,
                default: None,
            })
            .collect(),
        indexes: vec![],
    }
}

pub fn schema(tables: &[(&str, Table)]) -> Schema {
    Schema {
        tables: tables
            .iter()
            .map(|(name, t)| (name.to_string(), t.clone()))
            .collect(),
    }
}

pub fn plugins(entries: &[(&str, u64, bool)]) -> BTreeMap<String, PluginInfo> {
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

/// Builder for `BackupManifest`.
pub struct ManifestBuilder {
    manifest: BackupManifest,
}

impl ManifestBuilder {
    pub fn new(core_version: u64) -> Self {
        Self {
            manifest: BackupManifest::new(Version::new(core_version)),
        }
    }

    pub fn plugin(mut self, name: &str, version: u64, standard: bool) -> Self {
        self.manifest.plugins.insert(
            name.to_string(),
            PluginInfo {
                version: Version::new(version),
                standard,
            },
        );
        self
    }

    pub fn archive(mut self, name: &str, size: u64) -> Self {
        self.manifest.archives.push(ArchiveFile {
            name: name.to_string(),
            size,
        });
        self
    }

    pub fn structure_size(mut self, size: u64) -> Self {
        self.manifest.structure_size = size;
        self
    }

    pub fn build(self) -> BackupManifest {
        self.manifest
    }
}

/// A site on which every backup pre-check passes.
pub fn healthy_site() -> StaticSite {
    let tables = schema(&[("user", table(&["id", "username"])), ("course", table(&["id"]))]);
    StaticSite::new()
        .with_live_schema(tables.clone())
        .with_reference_schema(tables)
        .with_disk(DiskUsage {
            free_space: Some(10_000 * MB),
            largest_file: 10 * MB,
            largest_table: 20 * MB,
            largest_dataroot_file: 5 * MB,
        })
        .with_overrides(vec![])
        .with_limits(EnvironmentLimits {
            memory_limit: Some(1024 * MB),
            time_limit_secs: None,
            temp_dir_writable: true,
        })
        .with_core_version(Version::new(2023042400))
        .with_plugin("mod_forum", Version::new(2023042400), true)
        .with_plugin("local_custom", Version::new(2023010100), false)
}
