//! Schema versioning for the vault database.
//!
//! Applied versions are recorded in `_migrations`. Each step runs in its own
//! transaction together with its bookkeeping row, so a crash never leaves a
//! step half-recorded.

use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
    /// Set for `ADD COLUMN` steps; the step is recorded but skipped when the
    /// column is already present.
    adds_column: Option<(&'static str, &'static str)>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_operations",
        sql: include_str!("sql/001_create_operations.sql"),
        adds_column: None,
    },
    Migration {
        version: 2,
        name: "create_operation_logs",
        sql: include_str!("sql/002_create_operation_logs.sql"),
        adds_column: None,
    },
    Migration {
        version: 3,
        name: "add_operation_logs_pid",
        sql: include_str!("sql/003_add_log_pid.sql"),
        adds_column: Some(("operation_logs", "pid")),
    },
    Migration {
        version: 4,
        name: "create_pending_tasks",
        sql: include_str!("sql/004_create_pending_tasks.sql"),
        adds_column: None,
    },
];

/// Highest schema version this build knows how to use.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Highest version recorded in `_migrations`, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Brings the schema up to [`latest_version`].
///
/// Refuses to touch a database written by a newer build.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            appliedat TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current = current_version(conn)?;
    let latest = latest_version();
    if current > latest {
        return Err(DatabaseError::SchemaTooNew {
            found: current,
            supported: latest,
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration)?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let failed = |e: rusqlite::Error| DatabaseError::Migration {
        version: migration.version,
        reason: e.to_string(),
    };

    let tx = conn.unchecked_transaction().map_err(failed)?;
    let skip = match migration.adds_column {
        Some((table, column)) => has_column(&tx, table, column)?,
        None => false,
    };

    if skip {
        log::debug!(
            "Schema v{} ({}) already present",
            migration.version,
            migration.name
        );
    } else {
        log::info!("Applying schema v{}: {}", migration.version, migration.name);
        tx.execute_batch(migration.sql).map_err(failed)?;
    }

    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        params![migration.version, migration.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let mut stmt = conn.prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")?;
    Ok(stmt.exists(params![table, column])?)
}
