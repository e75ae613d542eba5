//! Core library for Kratos.
//!
//! This crate records the journey of a multi-agent development workflow
//! (sessions and their ordered steps) and tracks the per-feature review
//! pipeline document, independent of any command surface.
//!
//! # Usage
//!
//! ```no_run
//! use kratos_core::{Config, Database, PipelineStore, Priority};
//!
//! let config = Config::from_env(std::path::Path::new("."))?;
//! let db = Database::open(&config.database_path)?;
//! db.migrate()?;
//!
//! let session = db.start_session("/path/to/project", Some("auth"))?;
//! db.record_agent_spawn(&session.session_id, "athena", "opus", "create_prd")?;
//!
//! let pipeline = PipelineStore::new(&config.pipeline_root);
//! pipeline.init("auth", "OAuth2 login", Priority::P1)?;
//! # Ok::<(), kratos_core::Error>(())
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;

// Re-export commonly used types at crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, ErrorKind, Result};
pub use pipeline::{PipelineDocument, PipelineStore, Priority, StageStatus};
