//! Per-operation log lines.
//!
//! Lines are appended synchronously to `operation_logs` and mirrored to
//! `tracing`. The status page reads them back either in full or shortened
//! to the first and last two lines.

use std::fmt;

use serde::Serialize;

use crate::clock;
use crate::db::{LogRow, OperationStore};
use crate::error::OperationError;
use crate::operation::Operation;

const SHORTENED_EDGE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Stored form; info is the empty string.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub operation_id: i64,
    pub time_created: i64,
    pub level: LogLevel,
    pub message: String,
    pub pid: Option<u32>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        Self {
            id: row.id,
            operation_id: row.operationid,
            time_created: row.timecreated,
            level: LogLevel::parse(&row.loglevel),
            message: row.message,
            pid: row.pid,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", clock::format_timestamp(self.time_created))?;
        if self.level != LogLevel::Info {
            write!(f, "[{}] ", self.level.as_str())?;
        }
        if let Some(pid) = self.pid {
            write!(f, "[pid {}] ", pid)?;
        }
        f.write_str(&self.message)
    }
}

/// An element of a shortened log view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogItem {
    Entry(LogEntry),
    /// Lines left out between the head and the tail.
    Gap { skipped: u64 },
}

impl fmt::Display for LogItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogItem::Entry(entry) => fmt::Display::fmt(entry, f),
            LogItem::Gap { skipped } => write!(f, "... ({} more lines)", skipped),
        }
    }
}

/// Cuts `message` to at most `max_len` bytes without splitting a character.
pub fn truncate_message(message: &str, max_len: usize) -> &str {
    if message.len() <= max_len {
        return message;
    }
    let mut end = max_len;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

/// Appends a line to `op`'s log and returns the stored entry.
pub fn append(
    store: &dyn OperationStore,
    op: &Operation,
    level: LogLevel,
    message: &str,
    max_len: usize,
) -> Result<LogEntry, OperationError> {
    let operation_id = op.id().ok_or(OperationError::NotPersisted)?;
    let message = truncate_message(message, max_len);

    match level {
        LogLevel::Info => tracing::info!(operation_id, "{}", message),
        LogLevel::Warning => tracing::warn!(operation_id, "{}", message),
        LogLevel::Error => tracing::error!(operation_id, "{}", message),
    }

    let mut row = LogRow {
        id: 0,
        operationid: operation_id,
        timecreated: clock::now(),
        loglevel: level.as_str().to_string(),
        message: message.to_string(),
        pid: Some(std::process::id()),
    };
    row.id = store.insert_log(&row)?;
    Ok(row.into())
}

/// Every line of `op`'s log in `(timecreated, id)` order.
pub fn all(store: &dyn OperationStore, op: &Operation) -> Result<Vec<LogEntry>, OperationError> {
    let operation_id = op.require_id()?;
    Ok(store
        .operation_logs(operation_id)?
        .into_iter()
        .map(LogEntry::from)
        .collect())
}

/// All lines when there are fewer than five, otherwise the first two, a
/// gap marker, and the last two.
pub fn shortened(
    store: &dyn OperationStore,
    op: &Operation,
) -> Result<Vec<LogItem>, OperationError> {
    let operation_id = op.require_id()?;
    let (head, tail, total) = store.operation_log_ends(operation_id, SHORTENED_EDGE)?;

    if total <= (2 * SHORTENED_EDGE) as u64 {
        return Ok(all(store, op)?.into_iter().map(LogItem::Entry).collect());
    }

    let skipped = total - (2 * SHORTENED_EDGE) as u64;
    let mut items: Vec<LogItem> = head.into_iter().map(|r| LogItem::Entry(r.into())).collect();
    items.push(LogItem::Gap { skipped });
    items.extend(tail.into_iter().map(|r| LogItem::Entry(r.into())));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::operation::{OperationKind, OperationStatus};

    fn setup() -> (Database, Operation) {
        let db = Database::open_in_memory().unwrap();
        let op = Operation::schedule_new(&db, OperationKind::Backup).unwrap();
        (db, op)
    }

    fn messages(items: &[LogItem]) -> Vec<String> {
        items
            .iter()
            .map(|item| match item {
                LogItem::Entry(e) => e.message.clone(),
                LogItem::Gap { .. } => "gap".to_string(),
            })
            .collect()
    }

    #[test]
    fn test_append_requires_saved_operation() {
        let db = Database::open_in_memory().unwrap();
        let op = Operation::new(OperationKind::Backup, OperationStatus::Scheduled);
        assert!(matches!(
            append(&db, &op, LogLevel::Info, "hi", 100),
            Err(OperationError::NotPersisted)
        ));
    }

    #[test]
    fn test_shortened_with_few_lines_returns_all() {
        let (db, op) = setup();
        for i in 1..=3 {
            append(&db, &op, LogLevel::Info, &i.to_string(), 100).unwrap();
        }
        assert_eq!(messages(&shortened(&db, &op).unwrap()), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_shortened_with_four_lines_returns_all() {
        let (db, op) = setup();
        for i in 1..=4 {
            append(&db, &op, LogLevel::Info, &i.to_string(), 100).unwrap();
        }
        assert_eq!(shortened(&db, &op).unwrap().len(), 4);
    }

    #[test]
    fn test_shortened_with_six_lines_has_gap() {
        let (db, op) = setup();
        for i in 1..=6 {
            append(&db, &op, LogLevel::Info, &i.to_string(), 100).unwrap();
        }
        let items = shortened(&db, &op).unwrap();
        assert_eq!(messages(&items), vec!["1", "2", "gap", "5", "6"]);
        assert_eq!(items[2], LogItem::Gap { skipped: 2 });
    }

    #[test]
    fn test_all_is_chronological_and_scoped() {
        let (db, op) = setup();
        let other = Operation::schedule_new(&db, OperationKind::Restore).unwrap();
        append(&db, &op, LogLevel::Info, "a", 100).unwrap();
        append(&db, &other, LogLevel::Info, "x", 100).unwrap();
        append(&db, &op, LogLevel::Warning, "b", 100).unwrap();

        let entries = all(&db, &op).unwrap();
        let msgs: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["a", "b"]);
        assert_eq!(entries[1].level, LogLevel::Warning);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_message("hello", 10), "hello");
        assert_eq!(truncate_message("hello", 3), "hel");
        // 'é' is two bytes; cutting inside it backs off.
        assert_eq!(truncate_message("aé", 2), "a");

        let long = "x".repeat(2000);
        let (db, op) = setup();
        let entry = append(&db, &op, LogLevel::Info, &long, 1333).unwrap();
        assert_eq!(entry.message.len(), 1333);
    }

    #[test]
    fn test_entry_format() {
        let entry = LogEntry {
            id: 1,
            operation_id: 1,
            time_created: 0,
            level: LogLevel::Error,
            message: "boom".to_string(),
            pid: Some(42),
        };
        assert_eq!(entry.to_string(), "[1970-01-01 00:00:00] [error] [pid 42] boom");

        let info = LogEntry {
            level: LogLevel::Info,
            pid: None,
            ..entry
        };
        assert_eq!(info.to_string(), "[1970-01-01 00:00:00] boom");
    }
}
