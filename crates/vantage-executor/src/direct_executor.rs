//! Direct Executor (C8, `spec.md` §4.8): a tight react loop for
//! low-complexity tasks that skips planning/simulation entirely — one system
//! prompt, repeated model turns, tool calls parsed out of tolerant JSON.
//! Grounded in `tandem_core::engine_loop`'s turn loop, trimmed down to the
//! single-envelope, single-agent case.

use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vantage_budget::BudgetEnvelope;
use vantage_planner::parse_json_response;
use vantage_providers::{ModelRouter, RoutingContext};
use vantage_tools::{ToolInvocation, ToolRegistry};
use vantage_trace::TraceLogger;
use vantage_types::{
    BudgetPreset, ExecutionTrace, ExecutorConfig, MessageRole, ModelMessage, Purpose, StepResult,
    StreamEvent, Task, TaskResult, TaskStatus, TraceEvent,
};

use crate::llm_call::call_model;

const TOOL_RESULTS_OPEN_TAG: &str = "<tool_results>";
const TOOL_RESULTS_CLOSE_TAG: &str = "</tool_results>";

/// Strips `<tool_results>...</tool_results>` spans a model sometimes echoes
/// back verbatim from its own context, so they never leak into the final
/// answer or get re-fed into the sliding window.
fn strip_tool_result_tags(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(open) = rest.find(TOOL_RESULTS_OPEN_TAG) {
        out.push_str(&rest[..open]);
        rest = &rest[open + TOOL_RESULTS_OPEN_TAG.len()..];
        match rest.find(TOOL_RESULTS_CLOSE_TAG) {
            Some(close) => rest = &rest[close + TOOL_RESULTS_CLOSE_TAG.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn build_system_prompt(task: &Task, tool_descriptions: &[vantage_tools::ToolDescription]) -> String {
    let tools_json = serde_json::to_string(
        &tool_descriptions
            .iter()
            .map(|t| serde_json::json!({"name": t.name, "description": t.description, "inputSchema": t.input_schema}))
            .collect::<Vec<_>>(),
    )
    .unwrap_or_default();
    format!(
        "You are completing this task directly: {}\n\
         Available tools: {tools_json}\n\
         Respond with JSON only, either {{\"answer\": string}} when you are done, \
         or {{\"toolCalls\": [{{\"toolName\": string, \"input\": object}}]}} to act.",
        task.description
    )
}

struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: std::collections::HashMap<String, u32>,
}

impl CircuitBreaker {
    fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive_failures: std::collections::HashMap::new(),
        }
    }

    fn is_open(&self, tool_name: &str) -> bool {
        self.consecutive_failures.get(tool_name).copied().unwrap_or(0) >= self.threshold
    }

    fn record(&mut self, tool_name: &str, success: bool) {
        if success {
            self.consecutive_failures.remove(tool_name);
        } else {
            *self.consecutive_failures.entry(tool_name.to_string()).or_insert(0) += 1;
        }
    }
}

pub struct DirectExecutor {
    router: std::sync::Arc<ModelRouter>,
    tools: ToolRegistry,
    trace: TraceLogger,
    config: ExecutorConfig,
}

impl DirectExecutor {
    pub fn new(router: std::sync::Arc<ModelRouter>, tools: ToolRegistry, trace: TraceLogger, config: ExecutorConfig) -> Self {
        Self {
            router,
            tools,
            trace,
            config,
        }
    }

    /// `executeDirect(task, env) -> TaskResult` (`spec.md` §4.8). Never
    /// propagates an `Err`.
    pub async fn execute_task(
        &self,
        task: &Task,
        envelope: &BudgetEnvelope,
        progress: Option<&UnboundedSender<StreamEvent>>,
    ) -> TaskResult {
        let trace_id = format!("trace-{}", Uuid::new_v4());
        self.trace
            .create_trace(
                &trace_id,
                &task.id,
                task.budget_preset.unwrap_or(BudgetPreset::Medium).limits(),
            )
            .await;

        let tool_descriptions = self.tools.get_tool_descriptions().await;
        let system = build_system_prompt(task, &tool_descriptions);
        let mut messages = vec![ModelMessage::user(task.description.clone())];
        let mut step_results: Vec<StepResult> = Vec::new();
        let mut breaker = CircuitBreaker::new(self.config.direct_circuit_breaker_threshold);
        let started = Instant::now();

        for iteration in 0..self.config.direct_max_iterations {
            if started.elapsed().as_millis() as u64 >= self.config.direct_wall_timeout_ms {
                return self
                    .terminal_result(
                        task,
                        &trace_id,
                        envelope,
                        step_results,
                        None,
                        TaskStatus::Failed,
                        Some("direct executor wall-clock timeout exceeded".to_string()),
                    )
                    .await;
            }

            if let Some(tx) = progress {
                let _ = tx.send(StreamEvent::Progress {
                    phase: "act".to_string(),
                    step_index: Some(iteration as usize),
                    total_steps: None,
                    usage: envelope.get_usage(),
                });
            }

            let window_start = messages.len().saturating_sub(self.config.direct_window_size);
            let windowed = messages[window_start..].to_vec();

            let raw = match call_model(
                &self.router,
                &self.trace,
                Purpose::Execute,
                envelope,
                &trace_id,
                &system,
                windowed,
                RoutingContext::default(),
            )
            .await
            {
                Ok(r) => r,
                Err(e) => {
                    let status = if e.is_budget_exhausted() {
                        TaskStatus::BudgetExhausted
                    } else {
                        TaskStatus::Failed
                    };
                    return self
                        .terminal_result(task, &trace_id, envelope, step_results, None, status, Some(e.one_line()))
                        .await;
                }
            };

            let cleaned = strip_tool_result_tags(&raw);
            messages.push(ModelMessage::assistant(cleaned.clone()));

            let Some(parsed) = parse_json_response(&cleaned) else {
                // Unparseable turn: treat the raw text as the final answer,
                // matching the tolerant-output policy the Planner itself
                // uses for specify/classify/plan.
                return self
                    .terminal_result(task, &trace_id, envelope, step_results, Some(cleaned), TaskStatus::Completed, None)
                    .await;
            };

            if let Some(answer) = parsed.get("answer").and_then(|v| v.as_str()) {
                return self
                    .terminal_result(
                        task,
                        &trace_id,
                        envelope,
                        step_results,
                        Some(answer.to_string()),
                        TaskStatus::Completed,
                        None,
                    )
                    .await;
            }

            let tool_calls = parsed
                .get("toolCalls")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if tool_calls.is_empty() {
                return self
                    .terminal_result(task, &trace_id, envelope, step_results, Some(cleaned), TaskStatus::Completed, None)
                    .await;
            }

            let mut tool_results_text = String::new();
            for call in tool_calls {
                if let Err(e) = envelope.check_budget() {
                    return self
                        .terminal_result(
                            task,
                            &trace_id,
                            envelope,
                            step_results,
                            None,
                            TaskStatus::BudgetExhausted,
                            Some(e.one_line()),
                        )
                        .await;
                }

                let tool_name = call.get("toolName").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let mut input = call.get("input").cloned().unwrap_or(serde_json::Value::Null);
                sanitize_args(&mut input, self.config.direct_max_arg_chars);

                if breaker.is_open(&tool_name) {
                    let step = StepResult {
                        step_index: step_results.len(),
                        tool_name: tool_name.clone(),
                        tool_args: input,
                        output: None,
                        error: Some("circuit breaker open: too many consecutive failures".to_string()),
                        success: false,
                        duration_ms: 0,
                        confidence: None,
                    };
                    tool_results_text.push_str(&format!("{}: circuit open\n", step.tool_name));
                    step_results.push(step);
                    continue;
                }

                let invocation = ToolInvocation {
                    tool_name: tool_name.clone(),
                    input: input.clone(),
                    timeout_ms: None,
                };
                let outcome = self.tools.invoke(invocation, CancellationToken::new()).await;
                envelope.deduct_tool_call();
                breaker.record(&tool_name, outcome.success);

                let _ = self
                    .trace
                    .log_event(
                        &trace_id,
                        TraceEvent::ToolInvocation {
                            timestamp: chrono::Utc::now(),
                            data: serde_json::json!({"toolName": tool_name, "success": outcome.success}),
                        },
                    )
                    .await;

                tool_results_text.push_str(&format!(
                    "{}: {}\n",
                    tool_name,
                    outcome
                        .output
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| outcome.error.clone().unwrap_or_default())
                ));

                step_results.push(StepResult {
                    step_index: step_results.len(),
                    tool_name,
                    tool_args: input,
                    output: outcome.output,
                    error: outcome.error,
                    success: outcome.success,
                    duration_ms: outcome.duration_ms,
                    confidence: None,
                });
            }

            messages.push(ModelMessage {
                role: MessageRole::Tool,
                content: format!("{TOOL_RESULTS_OPEN_TAG}{tool_results_text}{TOOL_RESULTS_CLOSE_TAG}"),
                images: Vec::new(),
            });
        }

        self.terminal_result(
            task,
            &trace_id,
            envelope,
            step_results,
            None,
            TaskStatus::Failed,
            Some("direct executor exhausted its iteration budget without a final answer".to_string()),
        )
        .await
    }

    async fn terminal_result(
        &self,
        task: &Task,
        trace_id: &str,
        envelope: &BudgetEnvelope,
        step_results: Vec<StepResult>,
        result: Option<String>,
        status: TaskStatus,
        error: Option<String>,
    ) -> TaskResult {
        let trace = self
            .trace
            .get_trace(trace_id)
            .await
            .unwrap_or_else(|_| ExecutionTrace::new(trace_id, &task.id));
        TaskResult {
            id: Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            trace_id: trace_id.to_string(),
            status,
            spec: None,
            plan: None,
            step_results,
            result,
            error,
            criteria_results: None,
            simulation_result: None,
            budget_used: envelope.get_usage(),
            trace,
            completed_at: chrono::Utc::now(),
        }
    }
}

/// Caps any string-valued leaf of a tool call's `input` at `max_chars`
/// (`spec.md` §4.8). Walks the full JSON tree since a model can nest long
/// strings arbitrarily deep inside an object or array argument.
fn sanitize_args(value: &mut serde_json::Value, max_chars: usize) {
    match value {
        serde_json::Value::String(s) => {
            if s.chars().count() > max_chars {
                *s = s.chars().take(max_chars).collect();
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                sanitize_args(item, max_chars);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map.iter_mut() {
                sanitize_args(v, max_chars);
            }
        }
        _ => {}
    }
}
