use rusqlite::{params, Connection};
use tracing::debug;

use super::{
    collect_sessions, collect_steps, sql_limit, Database, RECENT_FIRST, SESSION_COLUMNS,
    STEP_COLUMNS,
};
use crate::error::{require_non_empty, Result};
use crate::models::{Session, SessionStatus, Step};

impl Database {
    /// The `limit` most recent sessions for `project`.
    pub fn list_recent_sessions(&self, project: &str, limit: usize) -> Result<Vec<Session>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE project = ?1 {RECENT_FIRST} LIMIT ?2"
        );
        collect_sessions(&conn, &sql, params![project, sql_limit(limit)])
    }

    pub fn list_sessions_by_status(&self, status: SessionStatus) -> Result<Vec<Session>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ?1 {RECENT_FIRST}");
        collect_sessions(&conn, &sql, params![status.as_str()])
    }

    pub fn list_sessions_by_project(&self, project: &str) -> Result<Vec<Session>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE project = ?1 {RECENT_FIRST}");
        collect_sessions(&conn, &sql, params![project])
    }

    /// Case-insensitive substring search over project, feature name and
    /// summary. The term is matched literally; `%` and `_` have no special
    /// meaning, and an empty term matches every session.
    pub fn search_sessions(&self, term: &str) -> Result<Vec<Session>> {
        debug!("Searching sessions for {:?}", term);

        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE instr(lower(project), ?1) > 0
                OR instr(lower(COALESCE(feature_name, '')), ?1) > 0
                OR instr(lower(COALESCE(summary, '')), ?1) > 0
             {RECENT_FIRST}"
        );
        collect_sessions(&conn, &sql, params![term.to_ascii_lowercase()])
    }

    /// All steps of a session in step order; empty if it has none.
    pub fn get_session_timeline(&self, session_id: &str) -> Result<Vec<Step>> {
        let conn = self.connect()?;
        fetch_timeline(&conn, session_id)
    }

    /// Full-text search over step action, target, result, context and agent
    /// name. The term is matched as a phrase, newest steps first.
    pub fn search_steps(&self, term: &str, limit: usize) -> Result<Vec<Step>> {
        require_non_empty("search term", term)?;

        let conn = self.connect()?;
        let sql = format!(
            "SELECT {STEP_COLUMNS} FROM steps
             WHERE id IN (SELECT rowid FROM steps_fts WHERE steps_fts MATCH ?1)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2"
        );
        collect_steps(&conn, &sql, params![fts_phrase(term), sql_limit(limit)])
    }

    pub fn get_session_count(&self) -> Result<i64> {
        let conn = self.connect()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?)
    }
}

pub(super) fn fetch_timeline(conn: &Connection, session_id: &str) -> Result<Vec<Step>> {
    let sql =
        format!("SELECT {STEP_COLUMNS} FROM steps WHERE session_id = ?1 ORDER BY step_number ASC");
    collect_steps(conn, &sql, params![session_id])
}

/// Quote `term` as a single FTS5 phrase so user input is never parsed as
/// query syntax.
fn fts_phrase(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}
