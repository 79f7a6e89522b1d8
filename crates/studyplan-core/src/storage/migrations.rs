//! Database schema migrations for studyplan.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);
    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: baseline. Tables are created by `StudyDb` directly.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    set_schema_version(conn, 1)
}

/// Migration v2: makeup tracking on sessions plus lookup indexes.
///
/// - `study_sessions.makeup_queued`: set once a missed session's minutes
///   were added to the makeup queue
/// - indexes for per-user range scans and status sweeps
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    let has_column: bool = tx
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info('study_sessions') WHERE name = 'makeup_queued'",
            [],
            |row| row.get::<_, i32>(0),
        )
        .unwrap_or(0)
        > 0;
    if !has_column {
        tx.execute_batch(
            "ALTER TABLE study_sessions ADD COLUMN makeup_queued INTEGER NOT NULL DEFAULT 0;",
        )?;
    }

    tx.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user_start ON study_sessions(user_id, start_time);
         CREATE INDEX IF NOT EXISTS idx_sessions_user_status ON study_sessions(user_id, status);
         CREATE INDEX IF NOT EXISTS idx_tasks_subject ON tasks(subject_id);
         CREATE INDEX IF NOT EXISTS idx_makeup_expires ON makeup_queue(expires_at);",
    )?;

    // Missed sessions that predate the column must not be queued again
    tx.execute(
        "UPDATE study_sessions SET makeup_queued = 1
         WHERE status = 'missed'
           AND subject_id IN (SELECT subject_id FROM makeup_queue)",
        [],
    )?;

    tx.execute("DELETE FROM schema_version", [])?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [2])?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_schema(conn: &Connection) {
        conn.execute_batch(
            "CREATE TABLE tasks (id INTEGER PRIMARY KEY, subject_id INTEGER NOT NULL);
             CREATE TABLE makeup_queue (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                subject_id INTEGER NOT NULL,
                minutes INTEGER NOT NULL,
                expires_at TEXT NOT NULL
             );
             CREATE TABLE study_sessions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                subject_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                status TEXT NOT NULL
             );",
        )
        .unwrap();
    }

    #[test]
    fn test_migrate_from_scratch() {
        let conn = Connection::open_in_memory().unwrap();
        v1_schema(&conn);
        conn.execute_batch(
            "INSERT INTO makeup_queue VALUES (1, 1, 7, 60, '2025-03-17');
             INSERT INTO study_sessions VALUES (1, 1, 7, '2025-03-10T17:00:00Z', 'missed');
             INSERT INTO study_sessions VALUES (2, 1, 8, '2025-03-10T18:00:00Z', 'missed');
             INSERT INTO study_sessions VALUES (3, 1, 7, '2025-03-11T17:00:00Z', 'planned');",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let queued: Vec<i64> = conn
            .prepare("SELECT id FROM study_sessions WHERE makeup_queued = 1 ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(queued, vec![1]);
    }

    #[test]
    fn test_migrate_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        v1_schema(&conn);
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn test_incremental_migration() {
        let conn = Connection::open_in_memory().unwrap();
        v1_schema(&conn);
        conn.execute_batch(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
             INSERT INTO schema_version (version) VALUES (1);",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), 2);
        conn.prepare("SELECT makeup_queued FROM study_sessions").unwrap();
    }
}
