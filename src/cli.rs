//! Command tree and handlers. Every handler returns one JSON value; `main`
//! prints it.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use serde_json::{json, Value};

use kratos_core::models::SessionStatus;
use kratos_core::pipeline::StageUpdate;
use kratos_core::{Config, Database, Error, PipelineStore, Priority, StageStatus};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the journey database and apply the schema (idempotent)
    Init,
    /// Show resolved paths and database statistics
    Status,
    /// Start, end and inspect sessions
    #[command(subcommand)]
    Session(SessionCommand),
    /// Record and list steps within a session
    #[command(subcommand)]
    Step(StepCommand),
    /// Read-only queries over sessions and steps
    #[command(subcommand)]
    Query(QueryCommand),
    /// Summaries for resuming work
    #[command(subcommand)]
    Recall(RecallCommand),
    /// Per-feature pipeline status documents
    #[command(subcommand)]
    Pipeline(PipelineCommand),
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Start a session for a project
    Start {
        project: String,
        feature: Option<String>,
    },
    /// End a session, optionally with a summary
    End {
        session_id: String,
        summary: Option<String>,
    },
    /// Show the active session for a project, if any
    Active { project: String },
    /// Show one session
    Get { session_id: String },
}

#[derive(Subcommand, Debug)]
pub enum StepCommand {
    /// Record an agent spawn
    RecordAgent {
        session_id: String,
        agent_name: String,
        agent_model: String,
        action: String,
    },
    /// Record a file modification
    RecordFile {
        session_id: String,
        action: String,
        file_path: String,
    },
    /// List the steps of a session in order
    List { session_id: String },
}

#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// Most recent sessions, for one project or across all of them
    Recent {
        project: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Sessions with the given status (active, completed, abandoned)
    ByStatus { status: String },
    /// Every session for a project
    ByProject { project: String },
    /// Sessions whose project, feature or summary contains the term
    Search { term: String },
    /// Steps of a session by step number
    Timeline { session_id: String },
    /// Total number of sessions
    Count,
    /// Full-text search over step content
    Steps {
        term: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum RecallCommand {
    /// Latest session for a project
    Last { project: String },
    /// Feature sessions that never completed
    Incomplete { project: String },
    /// A session together with its steps
    Context { session_id: String },
    /// Most recent sessions across all projects
    Global {
        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum PipelineCommand {
    /// Create the status document for a feature
    Init {
        #[arg(long)]
        feature: String,
        #[arg(long)]
        description: String,
        /// P0, P1, P2 or P3
        #[arg(long, default_value = "P2")]
        priority: String,
    },
    /// Set the status of one stage
    Update(PipelineUpdateArgs),
    /// Print the status document for a feature
    Get {
        #[arg(long)]
        feature: String,
    },
}

#[derive(Args, Debug)]
pub struct PipelineUpdateArgs {
    #[arg(long)]
    pub feature: String,
    /// Stage id, e.g. 1-prd
    #[arg(long)]
    pub stage: String,
    /// in-progress, complete, blocked, ready or skipped
    #[arg(long)]
    pub status: String,
    /// Implementation mode (ares or user)
    #[arg(long)]
    pub mode: Option<String>,
    /// Review verdict
    #[arg(long)]
    pub verdict: Option<String>,
    /// Document path to record for the stage
    #[arg(long)]
    pub document: Option<String>,
}

/// Run `command` against the stores described by `config`.
pub fn execute(command: Commands, config: &Config) -> anyhow::Result<Value> {
    match command {
        Commands::Init => {
            let db = open_database(config)?;
            Ok(json!({
                "status": "initialized",
                "database": db.path().display().to_string(),
                "schema_version": db.schema_version()?,
            }))
        }
        Commands::Status => status(config),
        Commands::Session(cmd) => session(cmd, &open_database(config)?),
        Commands::Step(cmd) => step(cmd, &open_database(config)?),
        Commands::Query(cmd) => query(cmd, &open_database(config)?),
        Commands::Recall(cmd) => recall(cmd, &open_database(config)?),
        Commands::Pipeline(cmd) => pipeline(cmd, &PipelineStore::new(&config.pipeline_root)),
    }
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let db = Database::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    db.migrate()?;
    Ok(db)
}

fn status(config: &Config) -> anyhow::Result<Value> {
    let size = std::fs::metadata(&config.database_path).ok().map(|m| m.len());
    let mut result = json!({
        "database": config.database_path.display().to_string(),
        "database_exists": size.is_some(),
        "database_bytes": size,
        "pipeline_root": config.pipeline_root.display().to_string(),
    });

    // Only inspect an existing database; status must not create one.
    if size.is_some() {
        let db = Database::open(&config.database_path)?;
        let version = db.schema_version()?;
        result["schema_version"] = json!(version);
        if version > 0 {
            result["session_count"] = json!(db.get_session_count()?);
        }
    }

    Ok(result)
}

fn session(cmd: SessionCommand, db: &Database) -> anyhow::Result<Value> {
    Ok(match cmd {
        SessionCommand::Start { project, feature } => {
            let session = db.start_session(&project, feature.as_deref())?;
            json!({ "session_id": &session.session_id, "session": &session })
        }
        SessionCommand::End {
            session_id,
            summary,
        } => json!({ "session": db.end_session(&session_id, summary.as_deref())? }),
        SessionCommand::Active { project } => {
            json!({ "project": project, "session": db.get_active_session(&project)? })
        }
        SessionCommand::Get { session_id } => json!({ "session": db.get_session(&session_id)? }),
    })
}

fn step(cmd: StepCommand, db: &Database) -> anyhow::Result<Value> {
    Ok(match cmd {
        StepCommand::RecordAgent {
            session_id,
            agent_name,
            agent_model,
            action,
        } => {
            let step_number =
                db.record_agent_spawn(&session_id, &agent_name, &agent_model, &action)?;
            json!({ "status": "success", "step_number": step_number })
        }
        StepCommand::RecordFile {
            session_id,
            action,
            file_path,
        } => {
            db.record_file_change(&session_id, &action, &file_path)?;
            json!({ "status": "success" })
        }
        StepCommand::List { session_id } => {
            let steps = db.get_session_timeline(&session_id)?;
            json!({ "session_id": session_id, "count": steps.len(), "steps": steps })
        }
    })
}

fn query(cmd: QueryCommand, db: &Database) -> anyhow::Result<Value> {
    Ok(match cmd {
        QueryCommand::Recent { project, limit } => {
            let sessions = match project {
                Some(project) => db.list_recent_sessions(&project, limit)?,
                None => db.get_recent_sessions_global(limit)?,
            };
            json!({ "sessions": sessions })
        }
        QueryCommand::ByStatus { status } => {
            let status = SessionStatus::from_str(&status).ok_or_else(|| {
                Error::validation("status", format!("unknown session status '{status}'"))
            })?;
            json!({ "sessions": db.list_sessions_by_status(status)? })
        }
        QueryCommand::ByProject { project } => {
            json!({ "sessions": db.list_sessions_by_project(&project)? })
        }
        QueryCommand::Search { term } => {
            let sessions = db.search_sessions(&term)?;
            json!({ "query": term, "sessions": sessions })
        }
        QueryCommand::Timeline { session_id } => {
            let steps = db.get_session_timeline(&session_id)?;
            json!({ "session_id": session_id, "steps": steps })
        }
        QueryCommand::Count => json!({ "count": db.get_session_count()? }),
        QueryCommand::Steps { term, limit } => {
            let steps = db.search_steps(&term, limit)?;
            json!({ "query": term, "steps": steps })
        }
    })
}

fn recall(cmd: RecallCommand, db: &Database) -> anyhow::Result<Value> {
    Ok(match cmd {
        RecallCommand::Last { project } => {
            json!({ "last_session": db.get_last_session_for_project(&project)? })
        }
        RecallCommand::Incomplete { project } => {
            json!({ "incomplete_features": db.get_incomplete_features(&project)? })
        }
        RecallCommand::Context { session_id } => {
            serde_json::to_value(db.get_session_context(&session_id)?)?
        }
        RecallCommand::Global { limit } => {
            json!({ "recent_sessions": db.get_recent_sessions_global(limit)? })
        }
    })
}

fn pipeline(cmd: PipelineCommand, store: &PipelineStore) -> anyhow::Result<Value> {
    let doc = match cmd {
        PipelineCommand::Init {
            feature,
            description,
            priority,
        } => store.init(&feature, &description, Priority::parse(&priority)?)?,
        PipelineCommand::Update(args) => {
            let mut update = StageUpdate::new(args.stage, StageStatus::parse(&args.status)?);
            update.mode = args.mode;
            update.verdict = args.verdict;
            update.document = args.document;
            store.update(&args.feature, update)?
        }
        PipelineCommand::Get { feature } => store.get(&feature)?,
    };
    Ok(serde_json::to_value(doc)?)
}

/// Directory pipeline documents hang off by default: the enclosing git
/// checkout, or the working directory outside of one.
pub fn project_root() -> anyhow::Result<PathBuf> {
    let output = std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output();

    if let Ok(output) = output {
        if output.status.success() {
            let top = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !top.is_empty() {
                return Ok(PathBuf::from(top));
            }
        }
    }

    std::env::current_dir().context("resolving working directory")
}
