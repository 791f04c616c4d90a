use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::budget::BudgetUsage;
use crate::plan::{ExecutionPlan, SimulationResult};
use crate::task::TaskSpec;
use crate::trace::ExecutionTrace;

/// Outcome of invoking a single planned step (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_index: usize,
    pub tool_name: String,
    pub tool_args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// `spec.md` §3: the Task Executor's post-hoc criteria evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaResult {
    pub criterion: String,
    pub met: bool,
    pub evidence: String,
}

/// `spec.md` §7 / §8: the only shape a public kernel operation ever returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    BudgetExhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    pub task_id: String,
    pub trace_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<TaskSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    #[serde(default)]
    pub step_results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria_results: Option<Vec<CriteriaResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_result: Option<SimulationResult>,
    pub budget_used: BudgetUsage,
    pub trace: ExecutionTrace,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetPreset, BudgetState};
    use crate::trace::ExecutionTrace;

    #[test]
    fn task_result_serializes_status_snake_case() {
        let limits = BudgetPreset::Low.limits();
        let state = BudgetState::default();
        let usage = BudgetUsage {
            tokens_used: state.tokens_used,
            tokens_remaining: limits.max_tokens,
            tool_calls_used: 0,
            tool_calls_remaining: limits.max_tool_calls,
            escalations_used: 0,
            escalations_remaining: limits.max_escalations,
            cost_usd: 0.0,
            cost_remaining: limits.cost_ceiling_usd,
            elapsed_ms: 0,
            latency_remaining_ms: limits.max_latency_ms,
            energy_wh: 0.0,
            exceeded: false,
        };
        let result = TaskResult {
            id: "r-1".into(),
            task_id: "t-1".into(),
            trace_id: "tr-1".into(),
            status: TaskStatus::BudgetExhausted,
            spec: None,
            plan: None,
            step_results: Vec::new(),
            result: None,
            error: Some("budget exhausted".into()),
            criteria_results: None,
            simulation_result: None,
            budget_used: usage,
            trace: ExecutionTrace::new("tr-1", "t-1"),
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"status\":\"budget_exhausted\""));
    }
}
