//! SQLite-backed issue store.
//!
//! `find_or_create_and_bump` is the hot path: one call per ingested
//! event. Concurrency control is the UNIQUE(project_id, fingerprint)
//! constraint, not in-process locking — workers may run in separate
//! processes, so a losing concurrent insert is resolved by re-fetching
//! the winner's row and updating it.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use pipeline_core::{
    issue_culprit, issue_title, Error, EventRecord, EventType, Result, Severity, StoreErrorCode,
};

use crate::cardinality::UserSketch;
use crate::issue::{Issue, IssueStatus};
use crate::schema;

/// Map a rusqlite error into a retryable storage error.
pub(crate) fn map_db_err(e: rusqlite::Error) -> Error {
    Error::storage(StoreErrorCode::MetadataFailed, e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Issue metadata store.
pub struct IssueStore {
    conn: Mutex<Connection>,
}

impl IssueStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(map_db_err)?;

        // WAL mode for concurrent readers alongside the writer.
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )
        .map_err(map_db_err)?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        schema::run_migrations(&conn)
    }

    /// Find the issue for (project, fingerprint) and fold one event into
    /// it, creating the issue if this is the fingerprint's first event.
    ///
    /// On create: occurrence_count = 1, first = last = event receipt
    /// time, status = open, title/culprit derived from the event. A
    /// constraint violation from a concurrent creator is not an error —
    /// the loser re-fetches the winner's row and takes the update path.
    ///
    /// On update: count increments, last_seen_at takes the max of the
    /// stored and event timestamps (events arrive out of order), the
    /// user sketch absorbs the event's user id, and a resolved issue
    /// reopens. Ignored issues never reopen automatically.
    pub fn find_or_create_and_bump(
        &self,
        project_id: &str,
        fingerprint: &str,
        event: &EventRecord,
    ) -> Result<Issue> {
        let mut conn = self.conn.lock().unwrap();

        // Two passes at most: a lost insert race falls through to the
        // update path on the second pass.
        for _ in 0..2 {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_db_err)?;

            let existing = tx
                .query_row(
                    "SELECT * FROM issues WHERE project_id = ?1 AND fingerprint = ?2",
                    params![project_id, fingerprint],
                    row_to_issue_with_sketch,
                )
                .optional()
                .map_err(map_db_err)?;

            if let Some((issue, sketch)) = existing {
                let updated = bump_existing(&tx, issue, sketch, event)?;
                tx.commit().map_err(map_db_err)?;
                return Ok(updated);
            }

            match insert_new(&tx, project_id, fingerprint, event) {
                Ok(issue) => {
                    tx.commit().map_err(map_db_err)?;
                    return Ok(issue);
                }
                Err(e) if is_constraint_violation(&e) => {
                    // A concurrent worker created the row between our
                    // SELECT and INSERT. Roll back and update instead.
                    drop(tx);
                    continue;
                }
                Err(e) => return Err(map_db_err(e)),
            }
        }

        Err(Error::internal(
            "find_or_create_and_bump failed to converge after conflict retry",
        ))
    }

    /// Fetch an issue by its unique (project, fingerprint) key.
    pub fn get(&self, project_id: &str, fingerprint: &str) -> Result<Option<Issue>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM issues WHERE project_id = ?1 AND fingerprint = ?2",
            params![project_id, fingerprint],
            |row| row_to_issue_with_sketch(row).map(|(issue, _)| issue),
        )
        .optional()
        .map_err(map_db_err)
    }

    /// Fetch an issue by its public identifier.
    pub fn get_by_public_id(&self, public_id: &str) -> Result<Option<Issue>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM issues WHERE public_id = ?1",
            params![public_id],
            |row| row_to_issue_with_sketch(row).map(|(issue, _)| issue),
        )
        .optional()
        .map_err(map_db_err)
    }

    /// Administrative transition to `resolved`. Stamps `resolved_at`.
    pub fn resolve(&self, public_id: &str) -> Result<()> {
        self.set_status(public_id, IssueStatus::Resolved, Some(Utc::now()))
    }

    /// Administrative transition to `ignored`.
    pub fn ignore(&self, public_id: &str) -> Result<()> {
        self.set_status(public_id, IssueStatus::Ignored, None)
    }

    /// Administrative transition back to `open`.
    pub fn reopen(&self, public_id: &str) -> Result<()> {
        self.set_status(public_id, IssueStatus::Open, None)
    }

    fn set_status(
        &self,
        public_id: &str,
        status: IssueStatus,
        resolved_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE issues SET status = ?1, resolved_at = ?2 WHERE public_id = ?3",
                params![
                    status.as_str(),
                    resolved_at.map(|t| t.to_rfc3339()),
                    public_id
                ],
            )
            .map_err(map_db_err)?;

        if changed == 0 {
            return Err(Error::validation(format!("no such issue: {}", public_id)));
        }
        Ok(())
    }

    /// Count issues in a project (for tests and operational checks).
    pub fn count_for_project(&self, project_id: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM issues WHERE project_id = ?1",
            params![project_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(map_db_err)
    }
}

fn insert_new(
    tx: &rusqlite::Transaction<'_>,
    project_id: &str,
    fingerprint: &str,
    event: &EventRecord,
) -> std::result::Result<Issue, rusqlite::Error> {
    let mut sketch = UserSketch::new();
    if let Some(user_id) = &event.user_id {
        sketch.insert(user_id);
    }
    let affected_users = sketch.estimate();

    let issue = Issue {
        public_id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        fingerprint: fingerprint.to_string(),
        issue_type: event.event_type,
        status: IssueStatus::Open,
        title: issue_title(event),
        culprit: issue_culprit(event),
        severity: event.severity,
        occurrence_count: 1,
        affected_users,
        first_seen_at: event.received_at,
        last_seen_at: event.received_at,
        resolved_at: None,
    };

    tx.execute(
        "INSERT INTO issues (public_id, project_id, fingerprint, issue_type, status, title,
                             culprit, severity, occurrence_count, affected_users, user_sketch,
                             first_seen_at, last_seen_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            issue.public_id,
            issue.project_id,
            issue.fingerprint,
            issue.issue_type.as_str(),
            issue.status.as_str(),
            issue.title,
            issue.culprit,
            issue.severity.map(|s| s.as_str()),
            issue.occurrence_count as i64,
            issue.affected_users as i64,
            sketch.to_bytes(),
            issue.first_seen_at.to_rfc3339(),
            issue.last_seen_at.to_rfc3339(),
            Option::<String>::None,
        ],
    )?;

    Ok(issue)
}

fn bump_existing(
    tx: &rusqlite::Transaction<'_>,
    mut issue: Issue,
    mut sketch: UserSketch,
    event: &EventRecord,
) -> Result<Issue> {
    issue.occurrence_count += 1;
    // Events arrive out of order: max-merge, never blind overwrite.
    if event.received_at > issue.last_seen_at {
        issue.last_seen_at = event.received_at;
    }

    if let Some(user_id) = &event.user_id {
        sketch.insert(user_id);
    }
    issue.affected_users = sketch.estimate();

    if let Some(severity) = event.severity {
        issue.severity = Some(severity);
    }

    // A resolved issue seeing a new event has regressed: reopen it.
    // Ignored issues stay ignored.
    if issue.status == IssueStatus::Resolved {
        issue.status = IssueStatus::Open;
        issue.resolved_at = None;
    }

    tx.execute(
        "UPDATE issues
         SET occurrence_count = ?1, last_seen_at = ?2, affected_users = ?3, user_sketch = ?4,
             severity = ?5, status = ?6, resolved_at = ?7
         WHERE project_id = ?8 AND fingerprint = ?9",
        params![
            issue.occurrence_count as i64,
            issue.last_seen_at.to_rfc3339(),
            issue.affected_users as i64,
            sketch.to_bytes(),
            issue.severity.map(|s| s.as_str()),
            issue.status.as_str(),
            issue.resolved_at.map(|t| t.to_rfc3339()),
            issue.project_id,
            issue.fingerprint,
        ],
    )
    .map_err(map_db_err)?;

    Ok(issue)
}

fn parse_timestamp(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_issue_with_sketch(row: &Row) -> rusqlite::Result<(Issue, UserSketch)> {
    let issue_type: String = row.get("issue_type")?;
    let status: String = row.get("status")?;
    let severity: Option<String> = row.get("severity")?;
    let first_seen: String = row.get("first_seen_at")?;
    let last_seen: String = row.get("last_seen_at")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;
    let sketch_blob: Option<Vec<u8>> = row.get("user_sketch")?;

    let issue = Issue {
        public_id: row.get("public_id")?,
        project_id: row.get("project_id")?,
        fingerprint: row.get("fingerprint")?,
        issue_type: EventType::parse(&issue_type).unwrap_or(EventType::Error),
        status: IssueStatus::parse(&status).unwrap_or(IssueStatus::Open),
        title: row.get("title")?,
        culprit: row.get("culprit")?,
        severity: severity.as_deref().and_then(Severity::parse),
        occurrence_count: row.get::<_, i64>("occurrence_count")? as u64,
        affected_users: row.get::<_, i64>("affected_users")? as u64,
        first_seen_at: parse_timestamp(first_seen),
        last_seen_at: parse_timestamp(last_seen),
        resolved_at: resolved_at.map(parse_timestamp),
    };

    let sketch = sketch_blob
        .map(|b| UserSketch::from_bytes(&b))
        .unwrap_or_default();

    Ok((issue, sketch))
}
