use serde::{Deserialize, Serialize};

use super::step::Step;

/// One tracked unit of work on a project.
///
/// `total_steps` and `total_agents_spawned` are cached counts of the
/// session's step rows; only the journey store writes them, in the same
/// transaction as the step insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Storage row id.
    pub id: i64,
    pub session_id: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_name: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub total_steps: i64,
    pub total_agents_spawned: i64,
}

impl Session {
    /// Active and not yet ended.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active && self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    /// Terminal state set by external retention policy only.
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// A session with its full timeline, as returned by recall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub session: Session,
    pub steps: Vec<Step>,
    pub total_steps: i64,
    pub total_agents: i64,
}
