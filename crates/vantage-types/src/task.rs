use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::budget::BudgetPreset;

/// `spec.md` §3: immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_preset: Option<BudgetPreset>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            budget_preset: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_preset(mut self, preset: BudgetPreset) -> Self {
        self.budget_preset = Some(preset);
        self
    }
}

/// Success-criterion kinds (`spec.md` §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionType {
    FileExists,
    OutputContains,
    ToolSucceeded,
    PageState,
    Custom,
}

/// Type-specific check payload for a `SuccessCriterion`. Kept as an open
/// JSON-ish map rather than one struct per variant because the check content
/// is provider/tool defined (`spec.md` leaves "check (type-specific)" free
/// form) — the Planner and Task Executor agree on the handful of keys each
/// `CriterionType` needs (`path`, `substring`, `toolName`, `titleContains`,
/// `urlMatches`).
pub type CriterionCheck = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessCriterion {
    pub description: String,
    #[serde(rename = "type")]
    pub criterion_type: CriterionType,
    #[serde(default)]
    pub check: CriterionCheck,
}

/// `spec.md` §3.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub goal: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,
}

impl TaskSpec {
    /// The Planner's fallback spec (`spec.md` §4.5): guarantees at least one
    /// success criterion even when the model's output could not be parsed.
    pub fn fallback(task: &Task) -> Self {
        TaskSpec {
            goal: task.description.clone(),
            constraints: Vec::new(),
            success_criteria: vec![SuccessCriterion {
                description: "Task completed successfully".to_string(),
                criterion_type: CriterionType::ToolSucceeded,
                check: serde_json::json!({}),
            }],
        }
    }
}
