//! Per-feature pipeline status documents.
//!
//! Each feature has one `status.json` under the configured root. Init
//! creates it, update performs a whole-document read-modify-write, get reads
//! it back. There is no locking between writers: each write is atomic, but
//! two racing updates resolve as last-writer-wins.

mod document;
mod persist;
pub mod stages;

use std::path::{Component, Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

use crate::error::{require_non_empty, Error, Result};

pub use document::{
    Gate, HistoryEntry, PipelineDocument, Priority, StageRecord, StageStatus, StageUpdate,
};
pub use stages::{StageDescriptor, STAGES};

const STATUS_FILE: &str = "status.json";

#[derive(Debug, Clone)]
pub struct PipelineStore {
    root: PathBuf,
}

impl PipelineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<feature>/status.json`
    pub fn document_path(&self, feature: &str) -> Result<PathBuf> {
        validate_feature(feature)?;
        Ok(self.root.join(feature).join(STATUS_FILE))
    }

    /// Create the document for `feature`. Fails with [`Error::Conflict`] if
    /// one already exists.
    pub fn init(
        &self,
        feature: &str,
        description: &str,
        priority: Priority,
    ) -> Result<PipelineDocument> {
        let path = self.document_path(feature)?;
        require_non_empty("description", description)?;

        let document = PipelineDocument::new(feature, description, priority, &now_rfc3339());
        persist::create_document(&path, &document)?;

        info!(
            "Initialized pipeline for {} ({}) at {}",
            feature,
            priority.as_str(),
            path.display()
        );
        Ok(document)
    }

    /// Apply one stage status change and persist the whole document.
    ///
    /// Gates are reported in the log but never enforced.
    pub fn update(&self, feature: &str, update: StageUpdate) -> Result<PipelineDocument> {
        let path = self.document_path(feature)?;
        let mut document = persist::read_document(&path, feature)?;

        if matches!(update.status, StageStatus::InProgress | StageStatus::Complete) {
            if let Ok(unmet) = document.unmet_prerequisites(&update.stage) {
                if !unmet.is_empty() {
                    warn!(
                        "{}: moving {} to {} with unmet prerequisites {:?}",
                        feature,
                        update.stage,
                        update.status.as_str(),
                        unmet
                    );
                }
            }
        }

        let old_status = document.apply(&update, &now_rfc3339())?;
        persist::write_document(&path, &document)?;

        info!(
            "{}: {} {} -> {}",
            feature,
            update.stage,
            old_status.as_str(),
            update.status.as_str()
        );
        Ok(document)
    }

    pub fn get(&self, feature: &str) -> Result<PipelineDocument> {
        let path = self.document_path(feature)?;
        persist::read_document(&path, feature)
    }
}

/// Feature names become a single directory component under the root.
fn validate_feature(feature: &str) -> Result<()> {
    require_non_empty("feature", feature)?;

    let mut components = Path::new(feature).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !feature.contains(&['/', '\\'][..]) => Ok(()),
        _ => Err(Error::validation(
            "feature",
            format!("{feature:?} must be a plain directory name"),
        )),
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
