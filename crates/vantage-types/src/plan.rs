use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Browser navigation-strategy annotation (`spec.md` §4.5
/// `annotatePlanWithStrategies`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Dom,
    Vision,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStrategy {
    pub primary: StrategyKind,
    #[serde(default)]
    pub fallback_chain: Vec<StrategyKind>,
    pub reason: String,
}

/// A single planned step (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    pub index: usize,
    pub description: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StepStrategy>,
}

/// `spec.md` §3. `complexity` is the Planner's `classifyComplexity` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub task_id: String,
    pub complexity: f64,
    pub steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    pub fn new(task_id: impl Into<String>, complexity: f64, steps: Vec<PlanStep>) -> Self {
        Self {
            task_id: task_id.into(),
            complexity: complexity.clamp(0.0, 1.0),
            steps,
        }
    }

    /// `spec.md` §4.3 `validatePlan`: indices must be unique and contiguous
    /// in `0..n`; empty plans are legal (pure knowledge tasks).
    pub fn has_duplicate_indices(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.steps.iter().any(|step| !seen.insert(step.index))
    }
}

/// Plan-simulator issue severities (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    High,
    Medium,
    Informational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingTool,
    InvalidArgs,
    MissingDependency,
    HighRisk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationIssue {
    pub step_index: Option<usize>,
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub message: String,
}

/// The Plan Simulator's output (`spec.md` §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub valid: bool,
    pub issues: Vec<SimulationIssue>,
    pub estimated_budget: EstimatedBudget,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedBudget {
    pub estimated_tokens: u64,
    pub estimated_tool_calls: u64,
}

/// Planner `critique` output (`spec.md` §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CritiqueResult {
    pub overall: f64,
    pub step_confidences: Vec<f64>,
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_indices_are_detected() {
        let plan = ExecutionPlan::new(
            "t-1",
            0.3,
            vec![
                PlanStep {
                    index: 0,
                    description: "a".into(),
                    tool_name: "test_tool".into(),
                    tool_args: Value::Null,
                    strategy: None,
                },
                PlanStep {
                    index: 0,
                    description: "b".into(),
                    tool_name: "test_tool".into(),
                    tool_args: Value::Null,
                    strategy: None,
                },
            ],
        );
        assert!(plan.has_duplicate_indices());
    }

    #[test]
    fn empty_plan_has_no_duplicates() {
        let plan = ExecutionPlan::new("t-1", 0.0, Vec::new());
        assert!(!plan.has_duplicate_indices());
    }
}
