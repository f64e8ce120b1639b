//! Pending task repository — idempotent queue of cron task names.

use rusqlite::params;

use super::{Database, DatabaseError};

/// Queues `name` unless it is already pending.
pub fn ensure_queued(db: &Database, name: &str, now: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO pending_tasks (name, queuedat) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(())
    })
}

/// Removes and returns the oldest pending task.
pub fn take_next(db: &Database) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM pending_tasks ORDER BY queuedat, name LIMIT 1")?;
        let mut rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let name = match rows.next() {
            Some(Ok(name)) => name,
            Some(Err(e)) => return Err(DatabaseError::Sqlite(e)),
            None => return Ok(None),
        };
        conn.execute("DELETE FROM pending_tasks WHERE name = ?1", params![name])?;
        Ok(Some(name))
    })
}
