//! Scratch disk space estimates for backups and restores.
//!
//! Both are upper bounds: archiving may need the compressed and the
//! uncompressed form of the largest item at the same time.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::{format_bytes, parent_manifest, Check, CheckScope, CheckState, NamedCheck};
use crate::context::Context;
use crate::error::RunError;
use crate::operation::Operation;
use crate::runner::Runnable;
use crate::site::DiskUsage;

/// `2 × (chunk size + largest of file, table, dataroot file)`.
pub fn required_backup_space(upload_chunk_size: u64, usage: &DiskUsage) -> u64 {
    let largest = usage
        .largest_file
        .max(usage.largest_table)
        .max(usage.largest_dataroot_file);
    upload_chunk_size.saturating_add(largest).saturating_mul(2)
}

/// `largest archive + 2 × structure file size`.
pub fn required_restore_space(largest_archive: u64, structure_size: u64) -> u64 {
    largest_archive.saturating_add(structure_size.saturating_mul(2))
}

/// `None` free space means the filesystem reports no quota.
pub fn has_enough_space(free: Option<u64>, required: u64) -> bool {
    free.map_or(true, |free| free >= required)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpaceDetails {
    pub free_space: Option<u64>,
    pub required_space: u64,
    /// What the estimate was built from, for the report.
    #[serde(default)]
    pub breakdown: Vec<(String, u64)>,
}

impl DiskSpaceDetails {
    fn enough(&self) -> bool {
        has_enough_space(self.free_space, self.required_space)
    }

    fn summary(&self) -> String {
        let free = match self.free_space {
            Some(free) => format_bytes(free),
            None => "unlimited".to_string(),
        };
        if self.enough() {
            format!(
                "Enough disk space: {} free, {} required",
                free,
                format_bytes(self.required_space)
            )
        } else {
            format!(
                "Not enough disk space: {} free, {} required",
                free,
                format_bytes(self.required_space)
            )
        }
    }

    fn report(&self) -> String {
        let mut out = String::new();
        for (label, bytes) in &self.breakdown {
            let _ = writeln!(out, "{}: {}", label, format_bytes(*bytes));
        }
        out.trim_end().to_string()
    }
}

pub struct DiskSpaceCheck {
    state: CheckState<DiskSpaceDetails>,
}

impl NamedCheck for DiskSpaceCheck {
    const NAME: &'static str = "diskspace";
    const SCOPE: CheckScope = CheckScope::Backup;

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        Ok(Self {
            state: CheckState::new(op, Self::NAME)?,
        })
    }
}

impl Runnable for DiskSpaceCheck {
    fn operation(&self) -> &Operation {
        self.state.operation()
    }

    fn operation_mut(&mut self) -> &mut Operation {
        self.state.operation_mut()
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        let usage = ctx.site.disk_usage()?;
        let chunk = ctx.config.upload_chunk_size;
        self.state.record(DiskSpaceDetails {
            free_space: usage.free_space,
            required_space: required_backup_space(chunk, &usage),
            breakdown: vec![
                ("Upload chunk size".to_string(), chunk),
                ("Largest file".to_string(), usage.largest_file),
                ("Largest table".to_string(), usage.largest_table),
                ("Largest dataroot file".to_string(), usage.largest_dataroot_file),
            ],
        })
    }
}

impl Check for DiskSpaceCheck {
    fn success(&self) -> bool {
        self.state.verdict().is_some_and(DiskSpaceDetails::enough)
    }

    fn summary(&self) -> String {
        self.state
            .verdict()
            .map(DiskSpaceDetails::summary)
            .unwrap_or_default()
    }

    fn detailed_report(&self) -> String {
        self.state
            .verdict()
            .map(DiskSpaceDetails::report)
            .unwrap_or_default()
    }
}

pub struct DiskSpaceRestoreCheck {
    state: CheckState<DiskSpaceDetails>,
}

impl NamedCheck for DiskSpaceRestoreCheck {
    const NAME: &'static str = "diskspace_restore";
    const SCOPE: CheckScope = CheckScope::Restore;

    fn from_operation(op: Operation) -> Result<Self, RunError> {
        Ok(Self {
            state: CheckState::new(op, Self::NAME)?,
        })
    }
}

impl Runnable for DiskSpaceRestoreCheck {
    fn operation(&self) -> &Operation {
        self.state.operation()
    }

    fn operation_mut(&mut self) -> &mut Operation {
        self.state.operation_mut()
    }

    fn perform(&mut self, ctx: &Context<'_>) -> Result<(), RunError> {
        let manifest = parent_manifest(ctx, self.state.operation())?;
        let usage = ctx.site.disk_usage()?;
        let largest_archive = manifest.largest_archive();
        self.state.record(DiskSpaceDetails {
            free_space: usage.free_space,
            required_space: required_restore_space(largest_archive, manifest.structure_size),
            breakdown: vec![
                ("Largest archive".to_string(), largest_archive),
                ("Structure file".to_string(), manifest.structure_size),
            ],
        })
    }
}

impl Check for DiskSpaceRestoreCheck {
    fn success(&self) -> bool {
        self.state.verdict().is_some_and(DiskSpaceDetails::enough)
    }

    fn summary(&self) -> String {
        self.state
            .verdict()
            .map(DiskSpaceDetails::summary)
            .unwrap_or_default()
    }

    fn detailed_report(&self) -> String {
        self.state
            .verdict()
            .map(DiskSpaceDetails::report)
            .unwrap_or_default()
    }
}
