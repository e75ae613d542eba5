use serde::{Deserialize, Serialize};

/// One recorded action within a session.
///
/// `step_number` is assigned by the store: 1-based and gap-free per
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub session_id: String,
    pub step_number: i64,
    pub step_type: StepType,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_stage: Option<i64>,
    pub action: String,
    /// File path for `file_modify` steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    AgentSpawn,
    FileModify,
    // Reserved in the schema; nothing in this crate records them yet.
    Decision,
    Command,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentSpawn => "agent_spawn",
            Self::FileModify => "file_modify",
            Self::Decision => "decision",
            Self::Command => "command",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "agent_spawn" => Some(Self::AgentSpawn),
            "file_modify" => Some(Self::FileModify),
            "decision" => Some(Self::Decision),
            "command" => Some(Self::Command),
            _ => None,
        }
    }
}
