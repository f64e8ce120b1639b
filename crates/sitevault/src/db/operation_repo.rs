//! Operation repository — CRUD operations for the `operations` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw operation row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRow {
    /// Zero until the row has been inserted.
    pub id: i64,
    pub optype: String,
    pub backupkey: Option<String>,
    pub status: String,
    /// JSON object text.
    pub details: Option<String>,
    /// JSON object text.
    pub remotedetails: Option<String>,
    pub accesskey: Option<String>,
    pub parentid: Option<i64>,
    pub timecreated: i64,
    pub timemodified: i64,
}

impl OperationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            optype: row.get("type")?,
            backupkey: row.get("backupkey")?,
            status: row.get("status")?,
            details: row.get("details")?,
            remotedetails: row.get("remotedetails")?,
            accesskey: row.get("accesskey")?,
            parentid: row.get("parentid")?,
            timecreated: row.get("timecreated")?,
            timemodified: row.get("timemodified")?,
        })
    }
}

/// Query filter parameters for operation listing.
///
/// Empty lists mean "no restriction". Results are always ordered by
/// `timecreated DESC, id DESC`.
#[derive(Debug, Default, Clone)]
pub struct OperationFilter {
    pub types: Vec<String>,
    /// Matches `type LIKE '<prefix>%'`.
    pub type_prefix: Option<String>,
    pub statuses: Vec<String>,
    pub backupkey: Option<String>,
    pub parentid: Option<i64>,
    /// Only rows without a parent.
    pub standalone: bool,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new operation row, returning the assigned id.
pub fn insert(db: &Database, op: &OperationRow) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO operations (type, backupkey, status, details, remotedetails,
             accesskey, parentid, timecreated, timemodified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                op.optype,
                op.backupkey,
                op.status,
                op.details,
                op.remotedetails,
                op.accesskey,
                op.parentid,
                op.timecreated,
                op.timemodified,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Updates an existing operation row. All fields except `id` and `timecreated`
/// are overwritten.
pub fn update(db: &Database, op: &OperationRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE operations SET type=?2, backupkey=?3, status=?4, details=?5,
             remotedetails=?6, accesskey=?7, parentid=?8, timemodified=?9
             WHERE id=?1",
            params![
                op.id,
                op.optype,
                op.backupkey,
                op.status,
                op.details,
                op.remotedetails,
                op.accesskey,
                op.parentid,
                op.timemodified,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::MissingOperation(op.id));
        }
        Ok(())
    })
}

fn find_one(
    db: &Database,
    sql: &str,
    value: &dyn rusqlite::types::ToSql,
) -> Result<Option<OperationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(&[value][..], OperationRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds an operation by its id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<OperationRow>, DatabaseError> {
    find_one(db, "SELECT * FROM operations WHERE id = ?1", &id)
}

/// Finds an operation by its public access key.
pub fn find_by_access_key(
    db: &Database,
    access_key: &str,
) -> Result<Option<OperationRow>, DatabaseError> {
    find_one(db, "SELECT * FROM operations WHERE accesskey = ?1", &access_key)
}

fn push_in_clause(
    column: &str,
    values: &[String],
    conditions: &mut Vec<String>,
    param_values: &mut Vec<Box<dyn rusqlite::types::ToSql>>,
) {
    if values.is_empty() {
        return;
    }
    let placeholders: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", param_values.len() + i + 1))
        .collect();
    conditions.push(format!("{} IN ({})", column, placeholders.join(", ")));
    for value in values {
        param_values.push(Box::new(value.clone()));
    }
}

/// Queries operations with filters, most recent first.
pub fn query(db: &Database, filter: &OperationFilter) -> Result<Vec<OperationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        push_in_clause("type", &filter.types, &mut conditions, &mut param_values);
        push_in_clause("status", &filter.statuses, &mut conditions, &mut param_values);

        if let Some(ref prefix) = filter.type_prefix {
            conditions.push(format!("type LIKE ?{} ESCAPE '\\'", param_values.len() + 1));
            let escaped = prefix
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            param_values.push(Box::new(format!("{}%", escaped)));
        }
        if let Some(ref backupkey) = filter.backupkey {
            conditions.push(format!("backupkey = ?{}", param_values.len() + 1));
            param_values.push(Box::new(backupkey.clone()));
        }
        if let Some(parentid) = filter.parentid {
            conditions.push(format!("parentid = ?{}", param_values.len() + 1));
            param_values.push(Box::new(parentid));
        }
        if filter.standalone {
            conditions.push("parentid IS NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // SQLite treats a negative LIMIT as "no limit".
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM operations {} ORDER BY timecreated DESC, id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<OperationRow> = stmt
            .query_map(params_ref.as_slice(), OperationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}
