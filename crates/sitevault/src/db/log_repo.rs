//! Operation log repository — append-only rows in `operation_logs`.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw log row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub id: i64,
    pub operationid: i64,
    pub timecreated: i64,
    pub loglevel: String,
    pub message: String,
    pub pid: Option<u32>,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            operationid: row.get("operationid")?,
            timecreated: row.get("timecreated")?,
            loglevel: row.get("loglevel")?,
            message: row.get("message")?,
            pid: row.get("pid")?,
        })
    }
}

/// Inserts a log row, returning its id.
pub fn insert(db: &Database, log: &LogRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO operation_logs (operationid, timecreated, loglevel, message, pid)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                log.operationid,
                log.timecreated,
                log.loglevel,
                log.message,
                log.pid
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

fn select(
    db: &Database,
    sql: &str,
    operation_id: i64,
    limit: i64,
) -> Result<Vec<LogRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![operation_id, limit], LogRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists every log row of an operation in chronological order.
pub fn list_for_operation(db: &Database, operation_id: i64) -> Result<Vec<LogRow>, DatabaseError> {
    select(
        db,
        "SELECT * FROM operation_logs WHERE operationid = ?1
         ORDER BY timecreated, id LIMIT ?2",
        operation_id,
        -1,
    )
}

/// The first `n` rows in chronological order.
pub fn first_n(db: &Database, operation_id: i64, n: usize) -> Result<Vec<LogRow>, DatabaseError> {
    select(
        db,
        "SELECT * FROM operation_logs WHERE operationid = ?1
         ORDER BY timecreated, id LIMIT ?2",
        operation_id,
        n as i64,
    )
}

/// The last `n` rows, returned in chronological order.
pub fn last_n(db: &Database, operation_id: i64, n: usize) -> Result<Vec<LogRow>, DatabaseError> {
    let mut rows = select(
        db,
        "SELECT * FROM operation_logs WHERE operationid = ?1
         ORDER BY timecreated DESC, id DESC LIMIT ?2",
        operation_id,
        n as i64,
    )?;
    rows.reverse();
    Ok(rows)
}

/// Counts the log rows of an operation.
pub fn count_for_operation(db: &Database, operation_id: i64) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM operation_logs WHERE operationid = ?1",
            params![operation_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Timestamp of the most recent log row, if any.
pub fn last_timecreated(db: &Database, operation_id: i64) -> Result<Option<i64>, DatabaseError> {
    db.with_conn(|conn| {
        let last: Option<i64> = conn.query_row(
            "SELECT MAX(timecreated) FROM operation_logs WHERE operationid = ?1",
            params![operation_id],
            |r| r.get(0),
        )?;
        Ok(last)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::operation_repo::{self, OperationRow};

    fn db_with_operation() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let id = operation_repo::insert(
            &db,
            &OperationRow {
                id: 0,
                optype: "backup".to_string(),
                backupkey: None,
                status: "inprogress".to_string(),
                details: None,
                remotedetails: None,
                accesskey: None,
                parentid: None,
                timecreated: 1,
                timemodified: 1,
            },
        )
        .unwrap();
        (db, id)
    }

    fn line(operationid: i64, timecreated: i64, message: &str) -> LogRow {
        LogRow {
            id: 0,
            operationid,
            timecreated,
            loglevel: String::new(),
            message: message.to_string(),
            pid: Some(4242),
        }
    }

    #[test]
    fn test_insert_and_list_in_order() {
        let (db, op) = db_with_operation();
        insert(&db, &line(op, 5, "second")).unwrap();
        insert(&db, &line(op, 1, "first")).unwrap();
        insert(&db, &line(op, 5, "third")).unwrap();

        let rows = list_for_operation(&db, op).unwrap();
        let messages: Vec<&str> = rows.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(rows[0].pid, Some(4242));
    }

    #[test]
    fn test_first_and_last_n() {
        let (db, op) = db_with_operation();
        for i in 1..=6 {
            insert(&db, &line(op, i, &format!("line {}", i))).unwrap();
        }

        let messages = |rows: Vec<LogRow>| -> Vec<String> {
            rows.into_iter().map(|r| r.message).collect()
        };
        let head = messages(first_n(&db, op, 2).unwrap());
        let tail = messages(last_n(&db, op, 2).unwrap());
        assert_eq!(head, vec!["line 1", "line 2"]);
        assert_eq!(tail, vec!["line 5", "line 6"]);
        assert_eq!(count_for_operation(&db, op).unwrap(), 6);
    }

    #[test]
    fn test_last_timecreated() {
        let (db, op) = db_with_operation();
        assert_eq!(last_timecreated(&db, op).unwrap(), None);
        insert(&db, &line(op, 10, "a")).unwrap();
        insert(&db, &line(op, 30, "b")).unwrap();
        assert_eq!(last_timecreated(&db, op).unwrap(), Some(30));
    }
}
