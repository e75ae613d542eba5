use rusqlite::{params, TransactionBehavior};
use tracing::{debug, warn};

use super::sessions::fetch_session;
use super::{now_ms, Database};
use crate::error::{require_non_empty, Error, Result};
use crate::models::StepType;

struct NewStep<'a> {
    step_type: StepType,
    agent_name: Option<&'a str>,
    agent_model: Option<&'a str>,
    action: &'a str,
    target: Option<&'a str>,
}

impl Database {
    /// Record an `agent_spawn` step and return its step number.
    pub fn record_agent_spawn(
        &self,
        session_id: &str,
        agent_name: &str,
        agent_model: &str,
        action: &str,
    ) -> Result<i64> {
        require_non_empty("agent_name", agent_name)?;
        self.record_step(
            session_id,
            NewStep {
                step_type: StepType::AgentSpawn,
                agent_name: Some(agent_name),
                agent_model: Some(agent_model),
                action,
                target: None,
            },
        )
    }

    /// Record a `file_modify` step against `file_path`.
    pub fn record_file_change(&self, session_id: &str, action: &str, file_path: &str) -> Result<()> {
        require_non_empty("file_path", file_path)?;
        self.record_step(
            session_id,
            NewStep {
                step_type: StepType::FileModify,
                agent_name: None,
                agent_model: None,
                action,
                target: Some(file_path),
            },
        )?;
        Ok(())
    }

    /// Numbering, insert and counter update commit together or not at all,
    /// so `total_steps` always equals the session's step row count.
    fn record_step(&self, session_id: &str, step: NewStep<'_>) -> Result<i64> {
        require_non_empty("action", step.action)?;

        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let session = fetch_session(&tx, session_id)?
            .ok_or_else(|| Error::not_found("session", session_id))?;
        if !session.is_active() {
            warn!(
                "Recording {} step on session {} which is {}",
                step.step_type.as_str(),
                session_id,
                session.status.as_str()
            );
        }

        let step_number: i64 = tx.query_row(
            "SELECT COALESCE(MAX(step_number), 0) + 1 FROM steps WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO steps (session_id, step_number, step_type, timestamp,
                                agent_name, agent_model, action, target)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session_id,
                step_number,
                step.step_type.as_str(),
                now_ms(),
                step.agent_name,
                step.agent_model,
                step.action,
                step.target
            ],
        )?;

        let spawned = i64::from(step.step_type == StepType::AgentSpawn);
        tx.execute(
            "UPDATE sessions
             SET total_steps = total_steps + 1,
                 total_agents_spawned = total_agents_spawned + ?1
             WHERE session_id = ?2",
            params![spawned, session_id],
        )?;
        tx.commit()?;

        debug!(
            "Recorded step {} ({}) for session {}",
            step_number,
            step.step_type.as_str(),
            session_id
        );
        Ok(step_number)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_support::temp_db;
    use crate::error::Error;
    use crate::models::StepType;

    #[test]
    fn first_step_is_number_one() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();

        let n = db
            .record_agent_spawn(&session.session_id, "athena", "opus", "create_prd")
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn mixed_steps_are_numbered_without_gaps() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();
        let id = &session.session_id;

        db.record_agent_spawn(id, "athena", "opus", "create_prd").unwrap();
        db.record_file_change(id, "edit", "src/lib.rs").unwrap();
        db.record_file_change(id, "edit", "src/main.rs").unwrap();
        let n = db.record_agent_spawn(id, "hephaestus", "sonnet", "implement").unwrap();
        assert_eq!(n, 4);

        let numbers: Vec<i64> = db
            .get_session_timeline(id)
            .unwrap()
            .iter()
            .map(|s| s.step_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn counters_track_step_rows() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();
        let id = &session.session_id;

        db.record_agent_spawn(id, "athena", "opus", "create_prd").unwrap();
        db.record_file_change(id, "edit", "prd.md").unwrap();
        db.record_agent_spawn(id, "metis", "opus", "review").unwrap();

        let stored = db.get_session(id).unwrap();
        let steps = db.get_session_timeline(id).unwrap();
        let agents = steps
            .iter()
            .filter(|s| s.step_type == StepType::AgentSpawn)
            .count() as i64;

        assert_eq!(stored.total_steps, steps.len() as i64);
        assert_eq!(stored.total_agents_spawned, agents);
        assert_eq!(stored.total_agents_spawned, 2);
    }

    #[test]
    fn variant_fields_are_stored() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();
        let id = &session.session_id;

        db.record_agent_spawn(id, "athena", "opus", "create_prd").unwrap();
        db.record_file_change(id, "write", "docs/prd.md").unwrap();

        let steps = db.get_session_timeline(id).unwrap();
        assert_eq!(steps[0].agent_name.as_deref(), Some("athena"));
        assert_eq!(steps[0].agent_model.as_deref(), Some("opus"));
        assert!(steps[0].target.is_none());
        assert_eq!(steps[1].step_type, StepType::FileModify);
        assert_eq!(steps[1].target.as_deref(), Some("docs/prd.md"));
        assert!(steps[1].agent_name.is_none());
    }

    #[test]
    fn numbering_is_per_session() {
        let (_dir, db) = temp_db();
        let a = db.start_session("/a", None).unwrap();
        let b = db.start_session("/b", None).unwrap();

        db.record_file_change(&a.session_id, "edit", "a.rs").unwrap();
        db.record_file_change(&a.session_id, "edit", "a.rs").unwrap();
        let n = db
            .record_agent_spawn(&b.session_id, "athena", "opus", "x")
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn unknown_session_is_not_found_and_writes_nothing() {
        let (_dir, db) = temp_db();

        let err = db
            .record_agent_spawn("missing", "athena", "opus", "x")
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(db.get_session_timeline("missing").unwrap().is_empty());
    }

    #[test]
    fn blank_inputs_are_rejected() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();

        let err = db
            .record_file_change(&session.session_id, "edit", "")
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "file_path", .. }));

        let err = db
            .record_agent_spawn(&session.session_id, "athena", "opus", " ")
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "action", .. }));

        assert_eq!(db.get_session(&session.session_id).unwrap().total_steps, 0);
    }

    #[test]
    fn failed_counter_update_rolls_back_the_step() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();

        db.connect()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER fail_counter BEFORE UPDATE OF total_steps ON sessions
                 BEGIN SELECT RAISE(ABORT, 'counter update refused'); END;",
            )
            .unwrap();

        let err = db
            .record_agent_spawn(&session.session_id, "athena", "opus", "create_prd")
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        let stored = db.get_session(&session.session_id).unwrap();
        assert!(db.get_session_timeline(&session.session_id).unwrap().is_empty());
        assert_eq!(stored.total_steps, 0);
        assert_eq!(stored.total_agents_spawned, 0);
    }

    #[test]
    fn steps_after_end_are_still_recorded() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();
        db.end_session(&session.session_id, None).unwrap();

        db.record_file_change(&session.session_id, "late flush", "a.rs")
            .unwrap();
        assert_eq!(db.get_session(&session.session_id).unwrap().total_steps, 1);
    }

    #[test]
    fn concurrent_writers_keep_numbering_dense() {
        let (_dir, db) = temp_db();
        let session = db.start_session("/x", None).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let db = db.clone();
                let id = session.session_id.clone();
                std::thread::spawn(move || {
                    for i in 0..5 {
                        db.record_file_change(&id, "edit", &format!("f{t}_{i}.rs"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let steps = db.get_session_timeline(&session.session_id).unwrap();
        let numbers: Vec<i64> = steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, (1..=20).collect::<Vec<i64>>());
        assert_eq!(db.get_session(&session.session_id).unwrap().total_steps, 20);
    }
}
