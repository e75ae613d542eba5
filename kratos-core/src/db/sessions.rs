use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tracing::info;
use uuid::Uuid;

use super::{now_ms, session_from_row, Database, RECENT_FIRST, SESSION_COLUMNS};
use crate::error::{require_non_empty, Error, Result};
use crate::models::{Session, SessionStatus};

impl Database {
    /// Start a new active session for `project`.
    ///
    /// Fails with [`Error::Conflict`] while another session for the same
    /// project is still active.
    pub fn start_session(&self, project: &str, feature_name: Option<&str>) -> Result<Session> {
        require_non_empty("project", project)?;

        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = fetch_active_session(&tx, project)? {
            return Err(active_conflict(project, Some(&existing.session_id)));
        }

        let session_id = Uuid::new_v4().to_string();
        let started_at = now_ms();

        tx.execute(
            "INSERT INTO sessions (session_id, project, feature_name, started_at, status,
                                   total_steps, total_agents_spawned)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
            params![
                session_id,
                project,
                feature_name,
                started_at,
                SessionStatus::Active.as_str()
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                active_conflict(project, None)
            }
            other => Error::Database(other),
        })?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Started session {} for {}", session_id, project);

        Ok(Session {
            id,
            session_id,
            project: project.to_string(),
            feature_name: feature_name.map(str::to_string),
            started_at,
            ended_at: None,
            status: SessionStatus::Active,
            summary: None,
            total_steps: 0,
            total_agents_spawned: 0,
        })
    }

    /// Mark a session completed, stamping `ended_at` and the summary.
    ///
    /// `ended_at` is written once: ending a session that is no longer
    /// active fails with [`Error::Conflict`].
    pub fn end_session(&self, session_id: &str, summary: Option<&str>) -> Result<Session> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = fetch_session(&tx, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        if !session.is_active() {
            return Err(Error::conflict(format!(
                "session {} already ended (status {})",
                session_id,
                session.status.as_str()
            )));
        }

        let ended_at = now_ms();
        tx.execute(
            "UPDATE sessions
             SET ended_at = ?1, status = ?2, summary = ?3
             WHERE session_id = ?4",
            params![
                ended_at,
                SessionStatus::Completed.as_str(),
                summary,
                session_id
            ],
        )?;
        tx.commit()?;

        info!(
            "Ended session {} after {} steps",
            session_id, session.total_steps
        );

        Ok(Session {
            ended_at: Some(ended_at),
            status: SessionStatus::Completed,
            summary: summary.map(str::to_string),
            ..session
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Session> {
        let conn = self.connect()?;
        fetch_session(&conn, session_id)?.ok_or_else(|| Error::not_found("session", session_id))
    }

    /// The active, unended session for `project`, if any.
    pub fn get_active_session(&self, project: &str) -> Result<Option<Session>> {
        let conn = self.connect()?;
        fetch_active_session(&conn, project)
    }
}

pub(super) fn fetch_session(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1");
    Ok(conn
        .query_row(&sql, params![session_id], session_from_row)
        .optional()?)
}

fn fetch_active_session(conn: &Connection, project: &str) -> Result<Option<Session>> {
    let sql = format!(
        "SELECT {SESSION_COLUMNS} FROM sessions
         WHERE project = ?1 AND status = 'active' AND ended_at IS NULL
         {RECENT_FIRST}
         LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![project], session_from_row)
        .optional()?)
}

fn active_conflict(project: &str, existing: Option<&str>) -> Error {
    match existing {
        Some(id) => Error::conflict(format!(
            "active session already exists for {project}: {id}"
        )),
        None => Error::conflict(format!("active session already exists for {project}")),
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_db;
    use crate::error::Error;
    use crate::models::SessionStatus;

    #[test]
    fn start_session_creates_active_record() {
        let (_dir, db) = temp_db();

        let session = db.start_session("/path/to/project", Some("auth")).unwrap();

        assert!(session.id > 0);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.feature_name.as_deref(), Some("auth"));
        assert_eq!(session.total_steps, 0);
        assert!(session.ended_at.is_none());

        let stored = db.get_session(&session.session_id).unwrap();
        assert_eq!(stored, session);
    }

    #[test]
    fn start_session_ids_are_unique() {
        let (_dir, db) = temp_db();
        let a = db.start_session("/a", None).unwrap();
        let b = db.start_session("/b", None).unwrap();
        assert_ne!(a.session_id, b.session_id);
    }

    #[test]
    fn second_active_session_for_project_conflicts() {
        let (_dir, db) = temp_db();
        let first = db.start_session("/x", None).unwrap();

        let err = db.start_session("/x", Some("other")).unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains(&first.session_id));
    }

    #[test]
    fn other_project_or_ended_session_does_not_conflict() {
        let (_dir, db) = temp_db();
        let first = db.start_session("/x", None).unwrap();
        db.start_session("/y", None).unwrap();

        db.end_session(&first.session_id, None).unwrap();
        let again = db.start_session("/x", None).unwrap();
        assert_ne!(again.session_id, first.session_id);
    }

    #[test]
    fn empty_project_is_rejected() {
        let (_dir, db) = temp_db();
        let err = db.start_session("", None).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "project", .. }));
    }

    #[test]
    fn end_session_completes_with_summary() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();

        let ended = db
            .end_session(&session.session_id, Some("Implemented OAuth2"))
            .unwrap();

        assert_eq!(ended.status, SessionStatus::Completed);
        assert!(ended.ended_at.is_some());
        assert_eq!(ended.summary.as_deref(), Some("Implemented OAuth2"));
        assert_eq!(db.get_session(&session.session_id).unwrap(), ended);
        assert!(db.get_active_session("/x").unwrap().is_none());
    }

    #[test]
    fn end_session_twice_is_rejected() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();
        let ended = db.end_session(&session.session_id, Some("first")).unwrap();

        let err = db.end_session(&session.session_id, Some("second")).unwrap_err();
        assert!(err.is_conflict());

        let stored = db.get_session(&session.session_id).unwrap();
        assert_eq!(stored.ended_at, ended.ended_at);
        assert_eq!(stored.summary.as_deref(), Some("first"));
    }

    #[test]
    fn end_unknown_session_is_not_found() {
        let (_dir, db) = temp_db();
        let err = db.end_session("missing", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn get_unknown_session_is_not_found() {
        let (_dir, db) = temp_db();
        let err = db.get_session("missing").unwrap_err();
        assert_eq!(err.to_string(), "session not found: missing");
    }

    #[test]
    fn active_session_is_scoped_to_project() {
        let (_dir, db) = temp_db();
        let x = db.start_session("/x", None).unwrap();

        assert_eq!(
            db.get_active_session("/x").unwrap().map(|s| s.session_id),
            Some(x.session_id)
        );
        assert!(db.get_active_session("/y").unwrap().is_none());
    }
}
