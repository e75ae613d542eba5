use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::stages::{FIRST_STAGE, STAGES};
use crate::error::{Error, Result};

/// The persisted `status.json` for one feature.
///
/// Keys this type does not model are kept in `extra` so a read-modify-write
/// never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDocument {
    pub feature: String,
    pub description: String,
    pub priority: Priority,
    /// RFC 3339.
    pub created: String,
    /// RFC 3339.
    pub updated: String,
    /// Last stage moved to `in-progress` or `complete`.
    pub stage: String,
    pub pipeline: BTreeMap<String, StageRecord>,
    #[serde(default)]
    pub documents: BTreeMap<String, String>,
    /// Append-only, oldest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageStatus,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub started: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub document: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Prerequisites for starting a stage. Recorded, never enforced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub requires: Vec<String>,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub stage: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "P0" => Some(Self::P0),
            "P1" => Some(Self::P1),
            "P2" => Some(Self::P2),
            "P3" => Some(Self::P3),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s)
            .ok_or_else(|| Error::validation("priority", format!("expected P0-P3, got {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Blocked,
    Ready,
    InProgress,
    Complete,
    Skipped,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Ready => "ready",
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "blocked" => Some(Self::Blocked),
            "ready" => Some(Self::Ready),
            "in-progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| {
            Error::validation(
                "status",
                format!("expected blocked, ready, in-progress, complete or skipped, got {s:?}"),
            )
        })
    }

    /// Statuses that move the document's current-stage pointer.
    fn advances_pointer(&self) -> bool {
        matches!(self, Self::InProgress | Self::Complete)
    }
}

/// One status change for a stage, with the optional fields to record on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageUpdate {
    pub stage: String,
    pub status: StageStatus,
    pub mode: Option<String>,
    pub verdict: Option<String>,
    pub document: Option<String>,
}

impl StageUpdate {
    pub fn new(stage: impl Into<String>, status: StageStatus) -> Self {
        Self {
            stage: stage.into(),
            status,
            mode: None,
            verdict: None,
            document: None,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_verdict(mut self, verdict: impl Into<String>) -> Self {
        self.verdict = Some(verdict.into());
        self
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }
}

impl PipelineDocument {
    /// A new document seeded from the fixed stage graph.
    pub fn new(feature: &str, description: &str, priority: Priority, now: &str) -> Self {
        let pipeline = STAGES
            .iter()
            .map(|stage| (stage.id.to_string(), stage.initial_record(now)))
            .collect();

        Self {
            feature: feature.to_string(),
            description: description.to_string(),
            priority,
            created: now.to_string(),
            updated: now.to_string(),
            stage: FIRST_STAGE.to_string(),
            pipeline,
            documents: BTreeMap::new(),
            history: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn stage_record(&self, stage: &str) -> Option<&StageRecord> {
        self.pipeline.get(stage)
    }

    /// Apply `update` in memory and return the stage's previous status.
    ///
    /// Either every field below changes or, on error, none does.
    pub fn apply(&mut self, update: &StageUpdate, now: &str) -> Result<StageStatus> {
        let record = self
            .pipeline
            .get_mut(&update.stage)
            .ok_or_else(|| Error::not_found("stage", update.stage.as_str()))?;

        let old_status = record.status;
        record.status = update.status;

        if update.status == StageStatus::InProgress && old_status != StageStatus::InProgress {
            record.started = Some(now.to_string());
        }
        if update.status == StageStatus::Complete {
            record.completed = Some(now.to_string());
            if record.started.is_none() {
                record.started = Some(now.to_string());
            }
        }

        let mode = non_empty(&update.mode);
        let verdict = non_empty(&update.verdict);
        let document = non_empty(&update.document);

        if let Some(mode) = mode {
            record.mode = Some(mode.to_string());
        }
        if let Some(verdict) = verdict {
            record.verdict = Some(verdict.to_string());
        }
        if let Some(document) = document {
            record.document = document.to_string();
        }

        self.updated = now.to_string();
        if update.status.advances_pointer() {
            self.stage = update.stage.clone();
        }

        self.history.push(HistoryEntry {
            timestamp: now.to_string(),
            stage: update.stage.clone(),
            action: format!(
                "status changed from '{}' to '{}'",
                old_status.as_str(),
                update.status.as_str()
            ),
            verdict: verdict.map(str::to_string),
        });

        if let Some(document) = document {
            self.documents
                .insert(update.stage.clone(), document.to_string());
        }

        Ok(old_status)
    }

    /// Gate prerequisites of `stage` that are neither complete nor skipped.
    /// Purely informational; nothing in this crate acts on the answer.
    pub fn unmet_prerequisites(&self, stage: &str) -> Result<Vec<String>> {
        let record = self
            .stage_record(stage)
            .ok_or_else(|| Error::not_found("stage", stage))?;

        let Some(gate) = &record.gate else {
            return Ok(Vec::new());
        };

        Ok(gate
            .requires
            .iter()
            .filter(|required| {
                !matches!(
                    self.stage_record(required).map(|r| r.status),
                    Some(StageStatus::Complete | StageStatus::Skipped)
                )
            })
            .cloned()
            .collect())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn is_false(value: &bool) -> bool {
    !*value
}
