//! Operation records and their status lifecycle.
//!
//! An [`Operation`] is one backup, restore, dry-run, check or tool run. It is
//! created `scheduled` (or `inprogress` on the synchronous path), mutated in
//! memory, and persisted with [`Operation::save`]. No transition table is
//! enforced; callers move it to exactly one terminal status.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock;
use crate::db::{DatabaseError, OperationRow, OperationStore};
use crate::error::OperationError;

mod query;

pub const CHECK_PREFIX: &str = "check:";
pub const TOOL_PREFIX: &str = "tool:";

const ERROR_KEY: &str = "error";
const BACKTRACE_KEY: &str = "errorbacktrace";

/// Discriminator stored in the `type` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Backup,
    Restore,
    DryRun,
    Check(String),
    Tool(String),
}

impl OperationKind {
    /// Parses a stored type string. Unknown unprefixed types and empty
    /// prefixed names yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "backup" => Some(Self::Backup),
            "restore" => Some(Self::Restore),
            "dryrun" => Some(Self::DryRun),
            other => {
                if let Some(name) = other.strip_prefix(CHECK_PREFIX) {
                    (!name.is_empty()).then(|| Self::Check(name.to_string()))
                } else if let Some(name) = other.strip_prefix(TOOL_PREFIX) {
                    (!name.is_empty()).then(|| Self::Tool(name.to_string()))
                } else {
                    None
                }
            }
        }
    }

    pub fn check(name: &str) -> Self {
        Self::Check(name.to_string())
    }

    pub fn tool(name: &str) -> Self {
        Self::Tool(name.to_string())
    }

    /// Backups, restores and dry-runs: the long-running processes of which
    /// only one should be active at a time.
    pub fn is_process(&self) -> bool {
        matches!(self, Self::Backup | Self::Restore | Self::DryRun)
    }

    /// The check or tool name, or the type string for processes.
    pub fn name(&self) -> &str {
        match self {
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::DryRun => "dryrun",
            Self::Check(name) | Self::Tool(name) => name,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Check(name) => write!(f, "{}{}", CHECK_PREFIX, name),
            Self::Tool(name) => write!(f, "{}{}", TOOL_PREFIX, name),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Scheduled,
    InProgress,
    Finished,
    Failed,
    FailedToStart,
}

impl OperationStatus {
    pub const ACTIVE: [OperationStatus; 2] = [Self::Scheduled, Self::InProgress];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "inprogress",
            Self::Finished => "finished",
            Self::Failed => "failed",
            Self::FailedToStart => "failedtostart",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "inprogress" => Some(Self::InProgress),
            "finished" => Some(Self::Finished),
            "failed" => Some(Self::Failed),
            "failedtostart" => Some(Self::FailedToStart),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::InProgress)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    id: Option<i64>,
    kind: OperationKind,
    backup_key: Option<String>,
    status: OperationStatus,
    details: Map<String, Value>,
    remote_details: Map<String, Value>,
    access_key: Option<String>,
    parent_id: Option<i64>,
    time_created: i64,
    time_modified: i64,
}

impl Operation {
    /// An unsaved operation.
    pub fn new(kind: OperationKind, status: OperationStatus) -> Self {
        let now = clock::now();
        Self {
            id: None,
            kind,
            backup_key: None,
            status,
            details: Map::new(),
            remote_details: Map::new(),
            access_key: None,
            parent_id: None,
            time_created: now,
            time_modified: now,
        }
    }

    /// Persists a new operation with the given status.
    pub fn create(
        store: &dyn OperationStore,
        kind: OperationKind,
        status: OperationStatus,
    ) -> Result<Self, OperationError> {
        let mut op = Self::new(kind, status);
        op.save(store)?;
        Ok(op)
    }

    /// Persists a new `scheduled` operation.
    pub fn schedule_new(
        store: &dyn OperationStore,
        kind: OperationKind,
    ) -> Result<Self, OperationError> {
        Self::create(store, kind, OperationStatus::Scheduled)
    }

    /// Persists a new `inprogress` operation for immediate, synchronous work.
    pub fn create_and_run(
        store: &dyn OperationStore,
        kind: OperationKind,
    ) -> Result<Self, OperationError> {
        Self::create(store, kind, OperationStatus::InProgress)
    }

    pub fn with_parent(mut self, parent_id: Option<i64>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_backup_key(mut self, backup_key: Option<String>) -> Self {
        self.backup_key = backup_key;
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn require_id(&self) -> Result<i64, OperationError> {
        self.id.ok_or(OperationError::NotPersisted)
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn backup_key(&self) -> Option<&str> {
        self.backup_key.as_deref()
    }

    pub fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref()
    }

    pub fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    pub fn time_created(&self) -> i64 {
        self.time_created
    }

    pub fn time_modified(&self) -> i64 {
        self.time_modified
    }

    pub fn details(&self) -> &Map<String, Value> {
        &self.details
    }

    pub fn remote_details(&self) -> &Map<String, Value> {
        &self.remote_details
    }

    /// In-memory only; call [`Operation::save`] to persist.
    pub fn set_status(&mut self, status: OperationStatus) {
        self.status = status;
    }

    pub fn set_backup_key(&mut self, backup_key: Option<String>) {
        self.backup_key = backup_key;
    }

    /// Merges `partial` into the details: new keys overlay old ones.
    pub fn set_details(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            self.details.insert(key, value);
        }
    }

    /// Merges a typed details struct into the details map.
    pub fn set_typed_details<T: Serialize>(&mut self, details: &T) -> Result<(), OperationError> {
        match serde_json::to_value(details).map_err(OperationError::EncodeDetails)? {
            Value::Object(map) => {
                self.set_details(map);
                Ok(())
            }
            _ => Err(OperationError::EncodeDetails(serde::ser::Error::custom(
                "details must serialize to a JSON object",
            ))),
        }
    }

    /// Reads the details map as a typed struct.
    pub fn typed_details<T: DeserializeOwned>(&self) -> Result<T, OperationError> {
        serde_json::from_value(Value::Object(self.details.clone())).map_err(|e| {
            OperationError::MalformedJson {
                id: self.id.unwrap_or_default(),
                field: "details",
                source: e,
            }
        })
    }

    pub fn set_remote_details(&mut self, remote_details: Map<String, Value>) {
        self.remote_details = remote_details;
    }

    /// Records `err` and its cause chain in the details. Does not change the
    /// status.
    pub fn set_error(&mut self, err: &(dyn std::error::Error + 'static)) {
        let mut trace = vec![format!("{:?}", err)];
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push(format!("caused by: {}", cause));
            source = cause.source();
        }

        let mut partial = Map::new();
        partial.insert(ERROR_KEY.to_string(), Value::String(err.to_string()));
        partial.insert(BACKTRACE_KEY.to_string(), Value::String(trace.join("\n")));
        self.set_details(partial);
    }

    pub fn error_message(&self) -> Option<&str> {
        self.details.get(ERROR_KEY).and_then(Value::as_str)
    }

    pub fn error_backtrace(&self) -> Option<&str> {
        self.details.get(BACKTRACE_KEY).and_then(Value::as_str)
    }

    /// Assigns a fresh 32-character alphanumeric token for unauthenticated
    /// status polling. Save afterwards to make it resolvable.
    pub fn generate_access_key(&mut self) -> &str {
        self.access_key
            .insert(uuid::Uuid::new_v4().simple().to_string())
            .as_str()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Stale-worker heuristic: in progress with no activity (creation,
    /// modification or log line) for longer than `timeout` seconds.
    pub fn is_stuck(&self, now: i64, last_log_time: Option<i64>, timeout: i64) -> bool {
        if self.status != OperationStatus::InProgress {
            return false;
        }
        let last_activity = self
            .time_created
            .max(self.time_modified)
            .max(last_log_time.unwrap_or(i64::MIN));
        now - last_activity > timeout
    }

    /// `timemodified` once terminal, 0 while still active.
    pub fn finished_time(&self) -> i64 {
        if self.is_active() {
            0
        } else {
            self.time_modified
        }
    }

    /// Inserts or overwrites the row. Inserts stamp both timestamps with the
    /// current time; updates bump `timemodified`.
    pub fn save(&mut self, store: &dyn OperationStore) -> Result<(), OperationError> {
        let now = clock::now();
        match self.id {
            None => {
                self.time_created = now;
                self.time_modified = now;
                let id = store.insert_operation(&self.to_row()?)?;
                self.id = Some(id);
            }
            Some(_) => {
                self.time_modified = now.max(self.time_created);
                store.update_operation(&self.to_row()?)?;
            }
        }
        Ok(())
    }

    fn to_row(&self) -> Result<OperationRow, OperationError> {
        let encode = |map: &Map<String, Value>| {
            serde_json::to_string(map).map_err(OperationError::EncodeDetails)
        };
        Ok(OperationRow {
            id: self.id.unwrap_or_default(),
            optype: self.kind.to_string(),
            backupkey: self.backup_key.clone(),
            status: self.status.as_str().to_string(),
            details: Some(encode(&self.details)?),
            remotedetails: Some(encode(&self.remote_details)?),
            accesskey: self.access_key.clone(),
            parentid: self.parent_id,
            timecreated: self.time_created,
            timemodified: self.time_modified,
        })
    }

    /// Rebuilds an operation from a stored row. Rows whose type is not a
    /// known kind yield `Ok(None)`.
    pub fn from_row(row: &OperationRow) -> Result<Option<Self>, OperationError> {
        let Some(kind) = OperationKind::parse(&row.optype) else {
            log::debug!("Ignoring operation {} of unknown type '{}'", row.id, row.optype);
            return Ok(None);
        };
        let status =
            OperationStatus::parse(&row.status).ok_or_else(|| OperationError::InvalidStatus {
                id: row.id,
                status: row.status.clone(),
            })?;

        Ok(Some(Self {
            id: Some(row.id),
            kind,
            backup_key: row.backupkey.clone(),
            status,
            details: decode_map(row.details.as_deref(), row.id, "details")?,
            remote_details: decode_map(row.remotedetails.as_deref(), row.id, "remotedetails")?,
            access_key: row.accesskey.clone(),
            parent_id: row.parentid,
            time_created: row.timecreated,
            time_modified: row.timemodified,
        }))
    }
}

fn decode_map(
    text: Option<&str>,
    id: i64,
    field: &'static str,
) -> Result<Map<String, Value>, OperationError> {
    match text.map(str::trim) {
        None | Some("") => Ok(Map::new()),
        Some(text) => {
            serde_json::from_str(text).map_err(|e| OperationError::MalformedJson {
                id,
                field,
                source: e,
            })
        }
    }
}

/// Marks a stored row that could not be turned into a working check or tool
/// as `failedtostart`, recording why. Terminal rows are left untouched.
pub(crate) fn mark_failed_to_start(
    store: &dyn OperationStore,
    row: &OperationRow,
    err: &(dyn std::error::Error + 'static),
) -> Result<(), DatabaseError> {
    let active = OperationStatus::parse(&row.status).is_some_and(|s| s.is_active());
    if !active {
        return Ok(());
    }

    let mut details = decode_map(row.details.as_deref(), row.id, "details").unwrap_or_default();
    details.insert(ERROR_KEY.to_string(), Value::String(err.to_string()));
    details.insert(
        BACKTRACE_KEY.to_string(),
        Value::String(format!("{:?}", err)),
    );

    let mut updated = row.clone();
    updated.status = OperationStatus::FailedToStart.as_str().to_string();
    updated.details = Some(Value::Object(details).to_string());
    updated.timemodified = clock::now().max(row.timecreated);
    store.update_operation(&updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_kind_round_trip() {
        for s in ["backup", "restore", "dryrun", "check:dbstatus", "tool:uninstall_plugins"] {
            assert_eq!(OperationKind::parse(s).unwrap().to_string(), s);
        }
        assert_eq!(OperationKind::parse("check:"), None);
        assert_eq!(OperationKind::parse("export"), None);
        assert!(OperationKind::DryRun.is_process());
        assert!(!OperationKind::check("dbstatus").is_process());
    }

    #[test]
    fn test_schedule_new_persists_scheduled() {
        let db = test_db();
        let op = Operation::schedule_new(&db, OperationKind::Backup).unwrap();
        let id = op.id().unwrap();

        let loaded = Operation::get_by_id(&db, id).unwrap().unwrap();
        assert_eq!(loaded.status(), OperationStatus::Scheduled);
        assert_eq!(loaded.time_created(), loaded.time_modified());
        assert_eq!(loaded, op);
    }

    #[test]
    fn test_create_and_run_starts_in_progress() {
        let db = test_db();
        let op = Operation::create_and_run(&db, OperationKind::check("dbstatus")).unwrap();
        let loaded = Operation::get_by_id(&db, op.id().unwrap()).unwrap().unwrap();
        assert_eq!(loaded.status(), OperationStatus::InProgress);
        assert_eq!(loaded.time_created(), loaded.time_modified());
    }

    #[test]
    fn test_details_merge() {
        let db = test_db();
        let mut op = Operation::schedule_new(&db, OperationKind::Restore).unwrap();
        op.set_details(map(json!({"a": 1})));
        op.set_details(map(json!({"b": 2})));
        op.save(&db).unwrap();

        let loaded = Operation::get_by_id(&db, op.id().unwrap()).unwrap().unwrap();
        assert_eq!(Value::Object(loaded.details().clone()), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_details_overlay_existing_keys() {
        let mut op = Operation::new(OperationKind::Backup, OperationStatus::Scheduled);
        op.set_details(map(json!({"a": 1, "b": 1})));
        op.set_details(map(json!({"b": 2})));
        assert_eq!(Value::Object(op.details().clone()), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_set_error_keeps_status_and_records_chain() {
        let mut op = Operation::new(OperationKind::Backup, OperationStatus::InProgress);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = DatabaseError::Io {
            path: "/tmp/x".into(),
            source: io,
        };
        op.set_error(&err);

        assert_eq!(op.status(), OperationStatus::InProgress);
        assert!(op.error_message().unwrap().contains("/tmp/x"));
        assert!(op.error_backtrace().unwrap().contains("caused by: disk gone"));
    }

    #[test]
    fn test_access_keys_are_unique_and_resolvable() {
        let db = test_db();
        let mut op = Operation::schedule_new(&db, OperationKind::Backup).unwrap();
        let first = op.generate_access_key().to_string();
        let second = op.generate_access_key().to_string();

        assert_ne!(first, second);
        for key in [&first, &second] {
            assert_eq!(key.len(), 32);
            assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        }

        op.save(&db).unwrap();
        let found = Operation::get_by_access_key(&db, &second).unwrap().unwrap();
        assert_eq!(found.id(), op.id());
        assert!(Operation::get_by_access_key(&db, &first).unwrap().is_none());
    }

    #[test]
    fn test_is_stuck_only_for_in_progress() {
        let mut op = Operation::new(OperationKind::Backup, OperationStatus::Scheduled);
        op.time_created = 100;
        op.time_modified = 100;

        for status in [
            OperationStatus::Scheduled,
            OperationStatus::Finished,
            OperationStatus::Failed,
            OperationStatus::FailedToStart,
        ] {
            op.set_status(status);
            assert!(!op.is_stuck(1_000_000, None, 10));
        }

        op.set_status(OperationStatus::InProgress);
        assert!(!op.is_stuck(110, None, 10));
        assert!(op.is_stuck(111, None, 10));
        // A recent log line counts as activity.
        assert!(!op.is_stuck(111, Some(105), 10));
        assert!(op.is_stuck(200, Some(105), 10));
    }

    #[test]
    fn test_finished_time() {
        let mut op = Operation::new(OperationKind::Backup, OperationStatus::InProgress);
        assert_eq!(op.finished_time(), 0);
        op.time_modified = 500;
        op.set_status(OperationStatus::Failed);
        assert_eq!(op.finished_time(), 500);
    }

    #[test]
    fn test_from_row_unknown_type_is_none() {
        let row = OperationRow {
            id: 3,
            optype: "export".to_string(),
            backupkey: None,
            status: "scheduled".to_string(),
            details: None,
            remotedetails: None,
            accesskey: None,
            parentid: None,
            timecreated: 1,
            timemodified: 1,
        };
        assert!(Operation::from_row(&row).unwrap().is_none());
    }

    #[test]
    fn test_from_row_malformed_details() {
        let row = OperationRow {
            id: 4,
            optype: "backup".to_string(),
            backupkey: None,
            status: "finished".to_string(),
            details: Some("{broken".to_string()),
            remotedetails: None,
            accesskey: None,
            parentid: None,
            timecreated: 1,
            timemodified: 1,
        };
        assert!(matches!(
            Operation::from_row(&row),
            Err(OperationError::MalformedJson {
                field: "details",
                ..
            })
        ));
    }

    #[test]
    fn test_mark_failed_to_start_only_touches_active_rows() {
        let db = test_db();
        let op = Operation::schedule_new(&db, OperationKind::check("gone")).unwrap();
        let done = Operation::create(&db, OperationKind::check("gone"), OperationStatus::Finished)
            .unwrap();
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such check");

        for id in [op.id().unwrap(), done.id().unwrap()] {
            let row = db.find_operation(id).unwrap().unwrap();
            mark_failed_to_start(&db, &row, &err).unwrap();
        }

        let flipped = db.find_operation(op.id().unwrap()).unwrap().unwrap();
        assert_eq!(flipped.status, "failedtostart");
        assert!(flipped.details.unwrap().contains("no such check"));
        let untouched = db.find_operation(done.id().unwrap()).unwrap().unwrap();
        assert_eq!(untouched.status, "finished");
    }
}
