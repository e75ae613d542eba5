//! Installation-wide configuration.
//!
//! The core never reads the environment on its own; callers build a
//! [`Config`] once and hand its paths to [`crate::Database::open`] and
//! [`crate::PipelineStore::new`].

use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::error::{Error, Result};

/// Overrides the journey database location.
pub const DB_PATH_ENV: &str = "KRATOS_MEMORY_DB";
/// Overrides the directory holding per-feature pipeline documents.
pub const PIPELINE_ROOT_ENV: &str = "KRATOS_PIPELINE_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file holding sessions, steps and search indexes.
    pub database_path: PathBuf,
    /// Directory containing `<feature>/status.json` documents.
    pub pipeline_root: PathBuf,
}

impl Config {
    pub fn new(database_path: impl Into<PathBuf>, pipeline_root: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            pipeline_root: pipeline_root.into(),
        }
    }

    /// Resolve configuration from the process environment.
    ///
    /// `project_root` is the directory pipeline documents live under when
    /// `KRATOS_PIPELINE_ROOT` is unset (normally the git toplevel).
    pub fn from_env(project_root: &Path) -> Result<Self> {
        Self::from_env_with(project_root, None, None)
    }

    /// Like [`Config::from_env`], but explicit paths win. A path given here
    /// is never looked up, so `database_path` alone needs no home directory.
    pub fn from_env_with(
        project_root: &Path,
        database_path: Option<PathBuf>,
        pipeline_root: Option<PathBuf>,
    ) -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let database_path = match database_path {
            Some(path) => path,
            None => {
                let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
                resolve_database_path(home, lookup)?
            }
        };
        let pipeline_root =
            pipeline_root.unwrap_or_else(|| resolve_pipeline_root(project_root, lookup));

        Ok(Self {
            database_path,
            pipeline_root,
        })
    }

    #[cfg(test)]
    fn from_lookup<F>(project_root: &Path, home: Option<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_path: resolve_database_path(home, &lookup)?,
            pipeline_root: resolve_pipeline_root(project_root, &lookup),
        })
    }
}

fn resolve_database_path<F>(home: Option<PathBuf>, lookup: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = lookup(DB_PATH_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let home = home.ok_or_else(|| {
        Error::validation(
            "database_path",
            format!("could not determine home directory; set {DB_PATH_ENV}"),
        )
    })?;
    Ok(default_database_path(&home))
}

fn resolve_pipeline_root<F>(project_root: &Path, lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup(PIPELINE_ROOT_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| default_pipeline_root(project_root))
}

/// `~/.kratos/memory.db`
pub fn default_database_path(home: &Path) -> PathBuf {
    home.join(".kratos").join("memory.db")
}

/// `<project>/.claude/feature`
pub fn default_pipeline_root(project_root: &Path) -> PathBuf {
    project_root.join(".claude").join("feature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_home_and_project_root() {
        let config = Config::from_lookup(
            Path::new("/repo"),
            Some(PathBuf::from("/home/dev")),
            lookup(&[]),
        )
        .unwrap();

        assert_eq!(
            config.database_path,
            PathBuf::from("/home/dev/.kratos/memory.db")
        );
        assert_eq!(config.pipeline_root, PathBuf::from("/repo/.claude/feature"));
    }

    #[test]
    fn env_overrides_win() {
        let config = Config::from_lookup(
            Path::new("/repo"),
            None,
            lookup(&[(DB_PATH_ENV, "/tmp/k.db"), (PIPELINE_ROOT_ENV, "/tmp/features")]),
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/k.db"));
        assert_eq!(config.pipeline_root, PathBuf::from("/tmp/features"));
    }

    #[test]
    fn empty_override_falls_back_to_default() {
        let config = Config::from_lookup(
            Path::new("/repo"),
            Some(PathBuf::from("/home/dev")),
            lookup(&[(DB_PATH_ENV, "")]),
        )
        .unwrap();

        assert_eq!(
            config.database_path,
            PathBuf::from("/home/dev/.kratos/memory.db")
        );
    }

    #[test]
    fn explicit_database_path_skips_home_lookup() {
        let config = Config::from_env_with(
            Path::new("/repo"),
            Some(PathBuf::from("/tmp/explicit.db")),
            Some(PathBuf::from("/tmp/features")),
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/explicit.db"));
        assert_eq!(config.pipeline_root, PathBuf::from("/tmp/features"));
    }

    #[test]
    fn home_is_only_required_for_the_default_database_path() {
        assert!(resolve_database_path(None, lookup(&[(DB_PATH_ENV, "/tmp/k.db")])).is_ok());
        assert!(resolve_database_path(None, lookup(&[])).is_err());
    }

    #[test]
    fn missing_home_without_override_is_an_error() {
        let err = Config::from_lookup(Path::new("/repo"), None, lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Validation { field: "database_path", .. }));
    }
}
