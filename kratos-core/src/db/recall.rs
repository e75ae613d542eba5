use rusqlite::{params, OptionalExtension};

use super::queries::fetch_timeline;
use super::sessions::fetch_session;
use super::{
    collect_sessions, session_from_row, sql_limit, Database, RECENT_FIRST, SESSION_COLUMNS,
};
use crate::error::{Error, Result};
use crate::models::{Session, SessionContext};

impl Database {
    /// Most recently started session for `project`, whatever its status.
    pub fn get_last_session_for_project(&self, project: &str) -> Result<Option<Session>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE project = ?1 {RECENT_FIRST} LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![project], session_from_row)
            .optional()?)
    }

    /// Feature sessions for `project` that never reached `completed`.
    pub fn get_incomplete_features(&self, project: &str) -> Result<Vec<Session>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE project = ?1
               AND feature_name IS NOT NULL
               AND status != 'completed'
             {RECENT_FIRST}"
        );
        collect_sessions(&conn, &sql, params![project])
    }

    /// A session with its steps, both read from one snapshot so the
    /// counters always agree with the step rows.
    pub fn get_session_context(&self, session_id: &str) -> Result<SessionContext> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let session = fetch_session(&tx, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        let steps = fetch_timeline(&tx, session_id)?;
        tx.commit()?;

        Ok(SessionContext {
            total_steps: session.total_steps,
            total_agents: session.total_agents_spawned,
            session,
            steps,
        })
    }

    /// Like [`Database::list_recent_sessions`] but across every project.
    pub fn get_recent_sessions_global(&self, limit: usize) -> Result<Vec<Session>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions {RECENT_FIRST} LIMIT ?1");
        collect_sessions(&conn, &sql, params![sql_limit(limit)])
    }
}
