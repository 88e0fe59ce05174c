//! Metadata store schema and migrations.
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

use pipeline_core::{Error, Result};

use crate::store::map_db_err;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number.
const MIGRATIONS: &[&str] = &[
    // Version 1: issues table
    r#"
    CREATE TABLE IF NOT EXISTS issues (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        public_id        TEXT NOT NULL UNIQUE,
        project_id       TEXT NOT NULL,
        fingerprint      TEXT NOT NULL,
        issue_type       TEXT NOT NULL,
        status           TEXT NOT NULL DEFAULT 'open',
        title            TEXT NOT NULL,
        culprit          TEXT,
        severity         TEXT,
        occurrence_count INTEGER NOT NULL DEFAULT 0,
        affected_users   INTEGER NOT NULL DEFAULT 0,
        user_sketch      BLOB,
        first_seen_at    TEXT NOT NULL,
        last_seen_at     TEXT NOT NULL,
        resolved_at      TEXT,

        UNIQUE(project_id, fingerprint)
    );

    CREATE INDEX IF NOT EXISTS idx_issues_project_status ON issues(project_id, status);
    CREATE INDEX IF NOT EXISTS idx_issues_last_seen ON issues(last_seen_at DESC);
    "#,
];

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running metadata migration");
            conn.execute_batch(migration).map_err(map_db_err)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])
                .map_err(map_db_err)?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Metadata migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |r| r.get(0))
        .map_err(|e| Error::internal(format!("failed to read schema version: {}", e)))
}
