use super::{Operation, OperationKind, OperationStatus};
use crate::db::{OperationFilter, OperationRow, OperationStore};
use crate::error::OperationError;

/// Rows that cannot be decoded are logged and left out of listings.
fn collect(rows: Vec<OperationRow>) -> Result<Vec<Operation>, OperationError> {
    let mut ops = Vec::with_capacity(rows.len());
    for row in &rows {
        match Operation::from_row(row) {
            Ok(Some(op)) => ops.push(op),
            Ok(None) => {}
            Err(e) => log::warn!("Skipping unreadable operation {}: {}", row.id, e),
        }
    }
    Ok(ops)
}

fn kind_strings(kinds: &[OperationKind]) -> Vec<String> {
    kinds.iter().map(|k| k.to_string()).collect()
}

fn status_strings(statuses: &[OperationStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

impl Operation {
    pub fn get_by_id(store: &dyn OperationStore, id: i64) -> Result<Option<Self>, OperationError> {
        match store.find_operation(id)? {
            Some(row) => Self::from_row(&row),
            None => Ok(None),
        }
    }

    pub fn get_by_access_key(
        store: &dyn OperationStore,
        access_key: &str,
    ) -> Result<Option<Self>, OperationError> {
        match store.find_operation_by_access_key(access_key)? {
            Some(row) => Self::from_row(&row),
            None => Ok(None),
        }
    }

    /// Most recent first.
    pub fn get_by_statuses(
        store: &dyn OperationStore,
        statuses: &[OperationStatus],
    ) -> Result<Vec<Self>, OperationError> {
        let filter = OperationFilter {
            statuses: status_strings(statuses),
            ..Default::default()
        };
        collect(store.query_operations(&filter)?)
    }

    /// Most recent first.
    pub fn get_by_kind(
        store: &dyn OperationStore,
        kind: &OperationKind,
    ) -> Result<Vec<Self>, OperationError> {
        let filter = OperationFilter {
            types: vec![kind.to_string()],
            ..Default::default()
        };
        collect(store.query_operations(&filter)?)
    }

    /// The newest operation of any of `kinds`, optionally for one backup.
    pub fn get_last_of_kinds(
        store: &dyn OperationStore,
        kinds: &[OperationKind],
        backup_key: Option<&str>,
    ) -> Result<Option<Self>, OperationError> {
        let filter = OperationFilter {
            types: kind_strings(kinds),
            backupkey: backup_key.map(str::to_string),
            limit: Some(1),
            ..Default::default()
        };
        Ok(collect(store.query_operations(&filter)?)?.into_iter().next())
    }

    /// Scheduled and in-progress backups, restores and dry-runs. With
    /// `include_stuck == false`, operations that look abandoned are left out.
    pub fn get_active_processes(
        store: &dyn OperationStore,
        include_stuck: bool,
        now: i64,
        timeout: i64,
    ) -> Result<Vec<Self>, OperationError> {
        let filter = OperationFilter {
            types: kind_strings(&[
                OperationKind::Backup,
                OperationKind::Restore,
                OperationKind::DryRun,
            ]),
            statuses: status_strings(&OperationStatus::ACTIVE),
            ..Default::default()
        };
        let active = collect(store.query_operations(&filter)?)?;
        if include_stuck {
            return Ok(active);
        }

        let mut live = Vec::with_capacity(active.len());
        for op in active {
            if !op.is_stuck_in(store, now, timeout)? {
                live.push(op);
            }
        }
        Ok(live)
    }

    /// One page of history, most recent first. An empty `kinds` slice means
    /// every kind.
    pub fn get_history(
        store: &dyn OperationStore,
        kinds: &[OperationKind],
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Self>, OperationError> {
        let filter = OperationFilter {
            types: kind_strings(kinds),
            limit: Some(limit),
            offset: Some(offset),
            ..Default::default()
        };
        collect(store.query_operations(&filter)?)
    }

    /// Child operations (checks) of this one, most recent first.
    pub fn children(&self, store: &dyn OperationStore) -> Result<Vec<Self>, OperationError> {
        let filter = OperationFilter {
            parentid: Some(self.require_id()?),
            ..Default::default()
        };
        collect(store.query_operations(&filter)?)
    }

    /// [`Operation::is_stuck`] using the newest stored log line.
    pub fn is_stuck_in(
        &self,
        store: &dyn OperationStore,
        now: i64,
        timeout: i64,
    ) -> Result<bool, OperationError> {
        if self.status != OperationStatus::InProgress {
            return Ok(false);
        }
        let last_log = match self.id {
            Some(id) => store.last_log_time(id)?,
            None => None,
        };
        Ok(self.is_stuck(now, last_log, timeout))
    }
}
