//! Success-criteria evaluation (`spec.md` §4.7): runs after synthesis,
//! checking each `SuccessCriterion` against the step results and the final
//! answer text.

use tokio_util::sync::CancellationToken;
use vantage_tools::{ToolInvocation, ToolRegistry};
use vantage_types::{CriteriaResult, CriterionType, StepResult, SuccessCriterion};

pub async fn evaluate_criteria(
    criteria: &[SuccessCriterion],
    step_results: &[StepResult],
    final_answer: &str,
    tools: &ToolRegistry,
) -> Vec<CriteriaResult> {
    let mut out = Vec::with_capacity(criteria.len());
    for criterion in criteria {
        let result = evaluate_one(criterion, step_results, final_answer, tools).await;
        out.push(result);
    }
    out
}

async fn evaluate_one(
    criterion: &SuccessCriterion,
    step_results: &[StepResult],
    final_answer: &str,
    tools: &ToolRegistry,
) -> CriteriaResult {
    match criterion.criterion_type {
        CriterionType::FileExists => {
            let tool_name = criterion
                .check
                .get("toolName")
                .and_then(|v| v.as_str())
                .unwrap_or("file_exists")
                .to_string();
            let path = criterion.check.get("path").cloned().unwrap_or_default();
            let invocation = ToolInvocation {
                tool_name: tool_name.clone(),
                input: serde_json::json!({ "path": path }),
                timeout_ms: None,
            };
            let result = tools.invoke(invocation, CancellationToken::new()).await;
            CriteriaResult {
                criterion: criterion.description.clone(),
                met: result.success,
                evidence: result.error.unwrap_or_else(|| format!("'{tool_name}' reported existence")),
            }
        }
        CriterionType::OutputContains => {
            let substring = criterion
                .check
                .get("substring")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            let met = !substring.is_empty() && final_answer.contains(substring);
            CriteriaResult {
                criterion: criterion.description.clone(),
                met,
                evidence: format!("looked for '{substring}' in the final answer"),
            }
        }
        CriterionType::ToolSucceeded => {
            let tool_name = criterion.check.get("toolName").and_then(|v| v.as_str()).unwrap_or_default();
            let met = step_results.iter().any(|r| r.tool_name == tool_name && r.success);
            CriteriaResult {
                criterion: criterion.description.clone(),
                met,
                evidence: format!("checked for a successful '{tool_name}' step"),
            }
        }
        CriterionType::PageState => {
            let tool_name = criterion
                .check
                .get("toolName")
                .and_then(|v| v.as_str())
                .unwrap_or("page_state")
                .to_string();
            let invocation = ToolInvocation {
                tool_name: tool_name.clone(),
                input: serde_json::Value::Null,
                timeout_ms: None,
            };
            let result = tools.invoke(invocation, CancellationToken::new()).await;
            let met = match &result.output {
                Some(output) => {
                    let title_ok = criterion
                        .check
                        .get("titleContains")
                        .and_then(|v| v.as_str())
                        .map(|expected| {
                            output.get("title").and_then(|t| t.as_str()).unwrap_or_default().contains(expected)
                        })
                        .unwrap_or(true);
                    let url_ok = criterion
                        .check
                        .get("urlMatches")
                        .and_then(|v| v.as_str())
                        .map(|expected| {
                            output.get("url").and_then(|t| t.as_str()).unwrap_or_default().contains(expected)
                        })
                        .unwrap_or(true);
                    result.success && title_ok && url_ok
                }
                None => false,
            };
            CriteriaResult {
                criterion: criterion.description.clone(),
                met,
                evidence: format!("inspected page state via '{tool_name}'"),
            }
        }
        CriterionType::Custom => {
            let met = step_results.iter().any(|r| r.success);
            CriteriaResult {
                criterion: criterion.description.clone(),
                met,
                evidence: "custom criterion: optimistic on any successful step".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_types::CriterionType;

    fn step(tool_name: &str, success: bool) -> StepResult {
        StepResult {
            step_index: 0,
            tool_name: tool_name.to_string(),
            tool_args: serde_json::Value::Null,
            output: None,
            error: None,
            success,
            duration_ms: 1,
            confidence: None,
        }
    }

    #[tokio::test]
    async fn output_contains_matches_substring() {
        let tools = ToolRegistry::new();
        let criterion = SuccessCriterion {
            description: "mentions summary".into(),
            criterion_type: CriterionType::OutputContains,
            check: serde_json::json!({"substring": "summary"}),
        };
        let results = evaluate_criteria(&[criterion], &[], "here is a summary of the document", &tools).await;
        assert!(results[0].met);
    }

    #[tokio::test]
    async fn tool_succeeded_requires_a_matching_successful_step() {
        let tools = ToolRegistry::new();
        let criterion = SuccessCriterion {
            description: "ran the search tool".into(),
            criterion_type: CriterionType::ToolSucceeded,
            check: serde_json::json!({"toolName": "web_search"}),
        };
        let steps = vec![step("web_search", false), step("other_tool", true)];
        let results = evaluate_criteria(&[criterion], &steps, "", &tools).await;
        assert!(!results[0].met);

        let steps_ok = vec![step("web_search", true)];
        let results_ok = evaluate_criteria(&[
            SuccessCriterion {
                description: "ran the search tool".into(),
                criterion_type: CriterionType::ToolSucceeded,
                check: serde_json::json!({"toolName": "web_search"}),
            },
        ], &steps_ok, "", &tools).await;
        assert!(results_ok[0].met);
    }

    #[tokio::test]
    async fn custom_criterion_is_optimistic() {
        let tools = ToolRegistry::new();
        let criterion = SuccessCriterion {
            description: "anything happened".into(),
            criterion_type: CriterionType::Custom,
            check: serde_json::Value::Null,
        };
        let steps = vec![step("x", true)];
        let results = evaluate_criteria(&[criterion], &steps, "", &tools).await;
        assert!(results[0].met);
    }
}
