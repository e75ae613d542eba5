//! Whole-file persistence for pipeline documents.
//!
//! Writes go to a uniquely named sibling temp file which is then published
//! over the canonical path, so readers only ever see a complete document.
//! Updates publish with a rename; creation publishes with a hard link so an
//! existing document is never replaced. Temp files orphaned by a crash are
//! left for the operator to remove.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::document::PipelineDocument;
use crate::error::{Error, Result};

pub(crate) fn read_document(path: &Path, feature: &str) -> Result<PipelineDocument> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::not_found("pipeline", feature))
        }
        Err(e) => return Err(Error::io(path, e)),
    };
    serde_json::from_str(&json).map_err(|e| Error::json(path, e))
}

/// Replace the document at `path`, creating it if absent.
pub(crate) fn write_document(path: &Path, document: &PipelineDocument) -> Result<()> {
    let temp_path = stage_temp(path, document)?;

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(path, e));
    }
    sync_parent(path)
}

/// Publish a new document at `path`. Fails with [`Error::Conflict`] if a
/// document is already there, including one created concurrently.
pub(crate) fn create_document(path: &Path, document: &PipelineDocument) -> Result<()> {
    let temp_path = stage_temp(path, document)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);
    match linked {
        Ok(()) => sync_parent(path),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::conflict(format!(
            "pipeline document already exists at {}",
            path.display()
        ))),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Serialize `document` into a fresh, fsynced sibling of `path`.
fn stage_temp(path: &Path, document: &PipelineDocument) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let mut json = serde_json::to_string_pretty(document).map_err(|e| Error::json(path, e))?;
    json.push('\n');

    let temp_path = temp_path_for(path);
    let written = write_synced(&temp_path, json.as_bytes());
    discard_on_error(&temp_path, written)?;
    Ok(temp_path)
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// A temp file that failed to fill is removed; only crashes leave one behind.
fn discard_on_error(temp_path: &Path, result: io::Result<()>) -> Result<()> {
    result.map_err(|e| {
        let _ = fs::remove_file(temp_path);
        Error::io(temp_path, e)
    })
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::File::open(parent)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| Error::io(parent, e)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<()> {
    Ok(())
}

/// `status.json` -> `status.json.<uuid>.tmp`, unique per write so that
/// concurrent writers never share a temp file.
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}
