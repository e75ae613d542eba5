/// Bumped whenever `SCHEMA` changes shape.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL UNIQUE,
    project TEXT NOT NULL,
    feature_name TEXT,
    initial_request TEXT,
    started_at INTEGER NOT NULL,
    ended_at INTEGER,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'abandoned')),
    summary TEXT,
    total_steps INTEGER NOT NULL DEFAULT 0 CHECK (total_steps >= 0),
    total_agents_spawned INTEGER NOT NULL DEFAULT 0 CHECK (total_agents_spawned >= 0)
);

CREATE TABLE IF NOT EXISTS steps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(session_id) ON DELETE CASCADE,
    step_number INTEGER NOT NULL CHECK (step_number >= 1),
    step_type TEXT NOT NULL CHECK (step_type IN ('agent_spawn', 'file_modify', 'decision', 'command')),
    timestamp INTEGER NOT NULL,
    agent_name TEXT,
    agent_model TEXT,
    pipeline_stage INTEGER,
    action TEXT NOT NULL,
    target TEXT,
    result TEXT,
    context TEXT,
    UNIQUE (session_id, step_number)
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project, started_at);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status, started_at);
CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);
CREATE INDEX IF NOT EXISTS idx_steps_timestamp ON steps(timestamp);

-- Only one active session per project at a time
CREATE UNIQUE INDEX IF NOT EXISTS idx_one_active_session
    ON sessions(project) WHERE status = 'active' AND ended_at IS NULL;

-- Full-text index over step text, kept in sync with the steps table
CREATE VIRTUAL TABLE IF NOT EXISTS steps_fts USING fts5(
    action,
    target,
    result,
    context,
    agent_name,
    content='steps',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS steps_fts_insert AFTER INSERT ON steps BEGIN
    INSERT INTO steps_fts(rowid, action, target, result, context, agent_name)
    VALUES (new.id, new.action, new.target, new.result, new.context, new.agent_name);
END;

CREATE TRIGGER IF NOT EXISTS steps_fts_delete AFTER DELETE ON steps BEGIN
    INSERT INTO steps_fts(steps_fts, rowid, action, target, result, context, agent_name)
    VALUES ('delete', old.id, old.action, old.target, old.result, old.context, old.agent_name);
END;

CREATE TRIGGER IF NOT EXISTS steps_fts_update AFTER UPDATE ON steps BEGIN
    INSERT INTO steps_fts(steps_fts, rowid, action, target, result, context, agent_name)
    VALUES ('delete', old.id, old.action, old.target, old.result, old.context, old.agent_name);
    INSERT INTO steps_fts(rowid, action, target, result, context, agent_name)
    VALUES (new.id, new.action, new.target, new.result, new.context, new.agent_name);
END;
"#;
