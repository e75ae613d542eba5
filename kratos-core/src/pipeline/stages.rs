//! The fixed stage graph every feature pipeline is created from.
//!
//! Gates are advisory. They are copied into each document so callers can
//! decide whether a stage may start; [`super::PipelineStore::update`] never
//! checks them.

use serde_json::Value;

use super::document::{Gate, StageRecord, StageStatus};

pub const FIRST_STAGE: &str = "1-prd";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSpec {
    pub requires: &'static [&'static str],
    pub condition: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    pub id: &'static str,
    pub assignee: &'static str,
    pub document: &'static str,
    pub default_status: StageStatus,
    pub optional: bool,
    pub gate: Option<GateSpec>,
    /// Extra keys seeded as `null` for callers to fill in later.
    pub placeholders: &'static [&'static str],
}

/// Listed in topological order. Ids also sort lexicographically in this
/// order ("2-…" < "2.5-…" < "3-…"), which keeps the document's stage map
/// readable.
pub static STAGES: [StageDescriptor; 9] = [
    StageDescriptor {
        id: FIRST_STAGE,
        assignee: "pm-expert",
        document: "prd.md",
        default_status: StageStatus::InProgress,
        optional: false,
        placeholders: &[],
        gate: None,
    },
    StageDescriptor {
        id: "2-prd-review",
        assignee: "pm-expert",
        document: "prd-review.md",
        default_status: StageStatus::Blocked,
        optional: false,
        placeholders: &[],
        gate: Some(GateSpec {
            requires: &["1-prd"],
            condition: "prd.status === 'approved'",
        }),
    },
    StageDescriptor {
        id: "2.5-decomposition",
        assignee: "daedalus",
        document: "decomposition.md",
        default_status: StageStatus::Skipped,
        optional: true,
        placeholders: &[],
        gate: Some(GateSpec {
            requires: &["2-prd-review"],
            condition: "prd-review.verdict === 'approved' AND user opts in",
        }),
    },
    StageDescriptor {
        id: "3-tech-spec",
        assignee: "tech-spec",
        document: "tech-spec.md",
        default_status: StageStatus::Blocked,
        optional: false,
        placeholders: &[],
        gate: Some(GateSpec {
            requires: &["2-prd-review"],
            condition: "prd-review.verdict === 'approved'",
        }),
    },
    StageDescriptor {
        id: "4-spec-review-pm",
        assignee: "pm-expert",
        document: "spec-review-pm.md",
        default_status: StageStatus::Blocked,
        optional: false,
        placeholders: &[],
        gate: Some(GateSpec {
            requires: &["3-tech-spec"],
            condition: "tech-spec.status === 'complete'",
        }),
    },
    StageDescriptor {
        id: "5-spec-review-sa",
        assignee: "sa-expert",
        document: "spec-review-sa.md",
        default_status: StageStatus::Blocked,
        optional: false,
        placeholders: &[],
        gate: Some(GateSpec {
            requires: &["3-tech-spec"],
            condition: "tech-spec.status === 'complete'",
        }),
    },
    StageDescriptor {
        id: "6-test-plan",
        assignee: "qa-expert",
        document: "test-plan.md",
        default_status: StageStatus::Blocked,
        optional: false,
        placeholders: &[],
        gate: Some(GateSpec {
            requires: &["4-spec-review-pm", "5-spec-review-sa"],
            condition: "both reviews passed",
        }),
    },
    StageDescriptor {
        id: "7-implementation",
        assignee: "implementer",
        document: "implementation-notes.md",
        default_status: StageStatus::Blocked,
        optional: false,
        placeholders: &["tasks"],
        gate: Some(GateSpec {
            requires: &["6-test-plan"],
            condition: "test-plan exists",
        }),
    },
    StageDescriptor {
        id: "8-code-review",
        assignee: "code-review",
        document: "code-review.md",
        default_status: StageStatus::Blocked,
        optional: false,
        placeholders: &[],
        gate: Some(GateSpec {
            requires: &["7-implementation"],
            condition: "implementation complete",
        }),
    },
];

pub fn descriptor(id: &str) -> Option<&'static StageDescriptor> {
    STAGES.iter().find(|stage| stage.id == id)
}

impl StageDescriptor {
    /// The record a freshly initialized document holds for this stage.
    pub(crate) fn initial_record(&self, now: &str) -> StageRecord {
        let started = (self.default_status == StageStatus::InProgress).then(|| now.to_string());
        StageRecord {
            status: self.default_status,
            assignee: self.assignee.to_string(),
            started,
            completed: None,
            document: self.document.to_string(),
            optional: self.optional,
            gate: self.gate.map(|gate| Gate {
                requires: gate.requires.iter().map(|id| id.to_string()).collect(),
                condition: gate.condition.to_string(),
            }),
            mode: None,
            verdict: None,
            extra: self
                .placeholders
                .iter()
                .map(|key| (key.to_string(), Value::Null))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<_> = STAGES.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), STAGES.len());
    }

    #[test]
    fn gates_only_point_backwards() {
        for (index, stage) in STAGES.iter().enumerate() {
            let Some(gate) = stage.gate else { continue };
            for required in gate.requires {
                let position = STAGES.iter().position(|s| s.id == *required);
                assert!(
                    matches!(position, Some(p) if p < index),
                    "{} requires {} which is not an earlier stage",
                    stage.id,
                    required
                );
            }
        }
    }

    #[test]
    fn lexicographic_order_matches_topology() {
        let mut sorted: Vec<_> = STAGES.iter().map(|s| s.id).collect();
        sorted.sort();
        let listed: Vec<_> = STAGES.iter().map(|s| s.id).collect();
        assert_eq!(sorted, listed);
    }

    #[test]
    fn only_first_stage_starts_in_progress() {
        assert_eq!(STAGES[0].id, FIRST_STAGE);
        assert!(STAGES[0].gate.is_none());
        for stage in &STAGES[1..] {
            assert!(matches!(
                stage.default_status,
                StageStatus::Blocked | StageStatus::Skipped
            ));
        }
    }

    #[test]
    fn decomposition_is_the_optional_skipped_stage() {
        let optional: Vec<_> = STAGES.iter().filter(|s| s.optional).collect();
        assert_eq!(optional.len(), 1);
        assert_eq!(optional[0].id, "2.5-decomposition");
        assert_eq!(optional[0].default_status, StageStatus::Skipped);
    }

    #[test]
    fn initial_record_stamps_start_only_when_in_progress() {
        let now = "2026-01-01T00:00:00Z";
        let first = STAGES[0].initial_record(now);
        assert_eq!(first.started.as_deref(), Some(now));
        assert!(first.gate.is_none());

        let review = descriptor("6-test-plan").unwrap().initial_record(now);
        assert!(review.started.is_none());
        assert_eq!(
            review.gate.unwrap().requires,
            vec!["4-spec-review-pm", "5-spec-review-sa"]
        );
    }

    #[test]
    fn implementation_stage_seeds_tasks_placeholder() {
        let record = descriptor("7-implementation").unwrap().initial_record("now");
        assert_eq!(record.extra.get("tasks"), Some(&Value::Null));

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["tasks"].is_null());
        assert!(json.as_object().unwrap().contains_key("tasks"));

        assert!(descriptor("1-prd").unwrap().initial_record("now").extra.is_empty());
    }
}
