//! SQLite-backed journey store.
//!
//! Every operation opens its own connection and drops it on return; the
//! store holds nothing but the database path. Cross-process safety is left
//! to SQLite's WAL locking (many readers, one writer). A busy database
//! surfaces as [`crate::Error::Database`].

mod queries;
mod recall;
mod schema;
mod sessions;
mod steps;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Params, Row};

use crate::error::{Error, Result};
use crate::models::{Session, SessionStatus, Step, StepType};

pub use schema::{SCHEMA, SCHEMA_VERSION};

const SESSION_COLUMNS: &str = "id, session_id, project, feature_name, started_at, ended_at, \
     status, summary, total_steps, total_agents_spawned";

const STEP_COLUMNS: &str = "id, session_id, step_number, step_type, timestamp, \
     agent_name, agent_model, pipeline_stage, action, target, result, context";

/// Sessions are always listed newest first; `id` breaks ties between
/// sessions started in the same millisecond.
const RECENT_FIRST: &str = "ORDER BY started_at DESC, id DESC";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Point the store at `path`, creating its parent directory if needed.
    /// The file itself is created by the first connection.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply the schema. Safe to run on every invocation.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        tracing::debug!("Database schema v{} applied at {}", SCHEMA_VERSION, self.path.display());
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.connect()?;
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        // SQLite's own busy handler; contention beyond this is the caller's problem.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch(
            "PRAGMA synchronous = FULL;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    let status: String = row.get(6)?;
    Ok(Session {
        id: row.get(0)?,
        session_id: row.get(1)?,
        project: row.get(2)?,
        feature_name: row.get(3)?,
        started_at: row.get(4)?,
        ended_at: row.get(5)?,
        status: SessionStatus::from_str(&status)
            .ok_or_else(|| unknown_value(6, "session status", &status))?,
        summary: row.get(7)?,
        total_steps: row.get(8)?,
        total_agents_spawned: row.get(9)?,
    })
}

fn step_from_row(row: &Row<'_>) -> rusqlite::Result<Step> {
    let step_type: String = row.get(3)?;
    Ok(Step {
        id: row.get(0)?,
        session_id: row.get(1)?,
        step_number: row.get(2)?,
        step_type: StepType::from_str(&step_type)
            .ok_or_else(|| unknown_value(3, "step type", &step_type))?,
        timestamp: row.get(4)?,
        agent_name: row.get(5)?,
        agent_model: row.get(6)?,
        pipeline_stage: row.get(7)?,
        action: row.get(8)?,
        target: row.get(9)?,
        result: row.get(10)?,
        context: row.get(11)?,
    })
}

fn unknown_value(column: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        format!("unknown {what}: {value}").into(),
    )
}

fn collect_sessions<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(sql)?;
    let sessions = stmt
        .query_map(params, session_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sessions)
}

fn collect_steps<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Step>> {
    let mut stmt = conn.prepare(sql)?;
    let steps = stmt
        .query_map(params, step_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(steps)
}

/// SQLite wants an i64; anything beyond that is "no limit" in practice.
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_db;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(".kratos").join("memory.db");

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();

        assert!(path.exists());
    }

    #[test]
    fn migrate_is_idempotent_and_stamps_version() {
        let (_dir, db) = temp_db();
        db.migrate().unwrap();

        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(db.get_session_count().unwrap(), 0);
    }

    #[test]
    fn connections_use_wal() {
        let (_dir, db) = temp_db();
        let conn = db.connect().unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn corrupt_status_is_reported_not_panicked() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();

        // Bypass the CHECK constraint to simulate a foreign writer.
        let conn = db.connect().unwrap();
        conn.execute_batch("PRAGMA ignore_check_constraints = ON;").unwrap();
        conn.execute(
            "UPDATE sessions SET status = 'paused' WHERE session_id = ?1",
            [&session.session_id],
        )
        .unwrap();
        drop(conn);

        let err = db.get_session(&session.session_id).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
