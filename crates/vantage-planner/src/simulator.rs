//! Plan Simulator (C6, `spec.md` §4.6): a pure, synchronous-except-for-tool-
//! lookup pass over a plan that flags issues before any step executes.

use vantage_tools::ToolRegistry;
use vantage_types::{
    EstimatedBudget, ExecutionPlan, IssueKind, IssueSeverity, SimulationIssue, SimulationResult,
};

const HIGH_RISK_TOOL_NAMES: &[&str] = &["file_write", "shell_exec"];
const BROWSER_ACTION_TOOLS: &[&str] = &["browser_click", "browser_type", "browser_extract", "browser_evaluate", "browser_screenshot"];
const BROWSER_NAVIGATE_TOOL: &str = "browser_navigate";

/// A representative per-step token/tool-call estimate, used only to produce
/// a rough `estimatedBudget` — `spec.md` does not pin exact figures here.
const ESTIMATED_TOKENS_PER_STEP: u64 = 500;

pub async fn simulate(plan: &ExecutionPlan, tools: &ToolRegistry) -> SimulationResult {
    let mut issues = Vec::new();
    let mut seen_navigate = false;

    for step in &plan.steps {
        let Some(tool) = tools.get(&step.tool_name).await else {
            issues.push(SimulationIssue {
                step_index: Some(step.index),
                kind: IssueKind::MissingTool,
                severity: IssueSeverity::High,
                message: format!("tool '{}' is not registered", step.tool_name),
            });
            continue;
        };

        if let Err(reason) = vantage_tools::validate_value(&tool.input_schema(), &step.tool_args, "$") {
            issues.push(SimulationIssue {
                step_index: Some(step.index),
                kind: IssueKind::InvalidArgs,
                severity: IssueSeverity::High,
                message: reason,
            });
        }

        if step.tool_name == BROWSER_NAVIGATE_TOOL {
            seen_navigate = true;
        } else if BROWSER_ACTION_TOOLS.contains(&step.tool_name.as_str()) && !seen_navigate {
            issues.push(SimulationIssue {
                step_index: Some(step.index),
                kind: IssueKind::MissingDependency,
                severity: IssueSeverity::Medium,
                message: format!(
                    "'{}' appears before any '{BROWSER_NAVIGATE_TOOL}' in the plan",
                    step.tool_name
                ),
            });
        }

        let dangerous_by_name = HIGH_RISK_TOOL_NAMES.contains(&step.tool_name.as_str());
        let dangerous_by_tag = tool.tags().iter().any(|t| t == "dangerous");
        if dangerous_by_name || dangerous_by_tag {
            issues.push(SimulationIssue {
                step_index: Some(step.index),
                kind: IssueKind::HighRisk,
                severity: IssueSeverity::Informational,
                message: format!("'{}' is a high-risk tool", step.tool_name),
            });
        }
    }

    let valid = !issues.iter().any(|i| i.severity == IssueSeverity::High);
    let estimated_budget = EstimatedBudget {
        estimated_tokens: plan.steps.len() as u64 * ESTIMATED_TOKENS_PER_STEP,
        estimated_tool_calls: plan.steps.len() as u64,
    };

    SimulationResult {
        valid,
        issues,
        estimated_budget,
    }
}

/// Drops every step carrying a `high`-severity issue, preserving order —
/// the Task Executor's contract ("drops steps with any high severity issue
/// before execution", `spec.md` §4.6).
pub fn drop_high_severity_steps(plan: &ExecutionPlan, simulation: &SimulationResult) -> ExecutionPlan {
    let blocked: std::collections::HashSet<usize> = simulation
        .issues
        .iter()
        .filter(|i| i.severity == IssueSeverity::High)
        .filter_map(|i| i.step_index)
        .collect();
    let steps = plan
        .steps
        .iter()
        .filter(|s| !blocked.contains(&s.index))
        .cloned()
        .collect();
    ExecutionPlan::new(plan.task_id.clone(), plan.complexity, steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use vantage_tools::{Tool, ToolRegistry};
    use vantage_types::PlanStep;

    struct StubTool {
        name: &'static str,
        tags: Vec<String>,
    }

    #[async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "required": ["x"]})
        }
        fn tags(&self) -> Vec<String> {
            self.tags.clone()
        }
        async fn execute(&self, _input: Value, _cancel: CancellationToken) -> anyhow::Result<Value> {
            Ok(Value::Null)
        }
    }

    async fn registry_with(names: &[(&'static str, &[&str])]) -> ToolRegistry {
        let registry = ToolRegistry::new();
        for (name, tags) in names {
            registry
                .register(Arc::new(StubTool {
                    name,
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                }))
                .await
                .unwrap();
        }
        registry
    }

    fn step(index: usize, tool: &str, args: Value) -> PlanStep {
        PlanStep {
            index,
            description: "s".into(),
            tool_name: tool.into(),
            tool_args: args,
            strategy: None,
        }
    }

    #[tokio::test]
    async fn missing_tool_is_high_severity() {
        let tools = registry_with(&[]).await;
        let plan = ExecutionPlan::new("t", 0.3, vec![step(0, "ghost_tool", json!({}))]);
        let result = simulate(&plan, &tools).await;
        assert!(!result.valid);
        assert_eq!(result.issues[0].kind, IssueKind::MissingTool);
    }

    #[tokio::test]
    async fn invalid_args_is_high_severity() {
        let tools = registry_with(&[("file_read", &[])]).await;
        let plan = ExecutionPlan::new("t", 0.3, vec![step(0, "file_read", json!({}))]);
        let result = simulate(&plan, &tools).await;
        assert!(!result.valid);
        assert_eq!(result.issues[0].kind, IssueKind::InvalidArgs);
    }

    #[tokio::test]
    async fn browser_action_before_navigate_is_medium_severity() {
        let tools = registry_with(&[("browser_click", &[])]).await;
        let plan = ExecutionPlan::new("t", 0.3, vec![step(0, "browser_click", json!({"x": 1}))]);
        let result = simulate(&plan, &tools).await;
        assert!(result.valid);
        assert_eq!(result.issues[0].kind, IssueKind::MissingDependency);
        assert_eq!(result.issues[0].severity, IssueSeverity::Medium);
    }

    #[tokio::test]
    async fn navigate_before_action_silences_missing_dependency() {
        let tools = registry_with(&[("browser_navigate", &[]), ("browser_click", &[])]).await;
        let plan = ExecutionPlan::new(
            "t",
            0.3,
            vec![
                step(0, "browser_navigate", json!({"x": 1})),
                step(1, "browser_click", json!({"x": 1})),
            ],
        );
        let result = simulate(&plan, &tools).await;
        assert!(result.issues.iter().all(|i| i.kind != IssueKind::MissingDependency));
    }

    #[tokio::test]
    async fn dangerous_tool_is_informational_only() {
        let tools = registry_with(&[("shell_exec", &[])]).await;
        let plan = ExecutionPlan::new("t", 0.3, vec![step(0, "shell_exec", json!({"x": 1}))]);
        let result = simulate(&plan, &tools).await;
        assert!(result.valid);
        assert_eq!(result.issues[0].kind, IssueKind::HighRisk);
        assert_eq!(result.issues[0].severity, IssueSeverity::Informational);
    }

    #[tokio::test]
    async fn high_severity_steps_are_dropped_before_execution() {
        let tools = registry_with(&[("file_read", &[])]).await;
        let plan = ExecutionPlan::new(
            "t",
            0.3,
            vec![step(0, "ghost_tool", json!({})), step(1, "file_read", json!({"x": 1}))],
        );
        let simulation = simulate(&plan, &tools).await;
        let trimmed = drop_high_severity_steps(&plan, &simulation);
        assert_eq!(trimmed.steps.len(), 1);
        assert_eq!(trimmed.steps[0].tool_name, "file_read");
    }
}
