//! Planner (C5, `spec.md` §4.5): `specifyTask`, `classifyComplexity`, `plan`,
//! `validatePlan`, `annotatePlanWithStrategies`, `critique`. Grounded in
//! `tandem_core::engine_loop`'s model-call-then-tolerant-JSON-parse idiom.

use std::sync::Arc;

use vantage_budget::BudgetEnvelope;
use vantage_observability::{emit_event, ObservabilityEvent};
use vantage_providers::{ModelRouter, RoutingContext};
use vantage_tools::ToolRegistry;
use vantage_trace::TraceLogger;
use vantage_types::{
    CritiqueResult, ExecutionPlan, ModelMessage, ModelRequest, PlanStep, Purpose, StepResult,
    StepStrategy, StrategyKind, Task, TaskSpec, TraceEvent, VantageError, VantageResult,
};

use crate::action_intent::classify_action_intent;
use crate::json_extract::parse_json_response;

/// Downstream confidence decay per preceding failed step (`SPEC_FULL.md` §9
/// decision #2).
const CONFIDENCE_DECAY: f64 = 0.8;
const DEFAULT_STEP_CONFIDENCE: f64 = 0.7;

const BROWSER_ACTION_TOOLS: &[&str] = &["browser_click", "browser_type", "browser_extract", "browser_evaluate", "browser_screenshot"];
const BROWSER_NAVIGATE_TOOL: &str = "browser_navigate";

pub struct Planner {
    router: Arc<ModelRouter>,
    trace: TraceLogger,
}

impl Planner {
    pub fn new(router: Arc<ModelRouter>, trace: TraceLogger) -> Self {
        Self { router, trace }
    }

    async fn call_model(
        &self,
        purpose: Purpose,
        envelope: &BudgetEnvelope,
        trace_id: &str,
        system: &str,
        user: &str,
        context: RoutingContext,
    ) -> VantageResult<String> {
        envelope.check_budget()?;
        let decision = self.router.route(purpose, envelope, context).await?;
        let _ = self
            .trace
            .log_event(
                trace_id,
                TraceEvent::RoutingDecision {
                    timestamp: chrono::Utc::now(),
                    data: serde_json::json!({
                        "purpose": purpose.as_str(),
                        "tier": decision.tier.as_str(),
                        "provider": decision.provider,
                        "model": decision.model,
                    }),
                },
            )
            .await;

        let provider = self.router.get_provider(&decision.provider).ok_or_else(|| {
            VantageError::NoAvailableProvider {
                tier: decision.tier.as_str().to_string(),
                purpose: purpose.as_str().to_string(),
            }
        })?;

        let request = ModelRequest {
            model: decision.model.clone(),
            provider: decision.provider.clone(),
            tier: decision.tier,
            system: Some(system.to_string()),
            messages: vec![ModelMessage::user(user)],
            temperature: None,
            max_tokens: None,
            response_format: None,
        };

        let response = provider
            .chat(request, tokio_util::sync::CancellationToken::new())
            .await
            .map_err(|e| VantageError::ProviderError {
                provider_id: decision.provider.clone(),
                message: e.to_string(),
            })?;

        envelope.deduct_tokens(
            vantage_budget::TokenUsage {
                prompt_tokens: response.token_usage.prompt,
                completion_tokens: response.token_usage.completion,
            },
            pricing_for(&provider, &decision.model).await,
        );

        Ok(response.content)
    }

    /// `specifyTask(task, env, traceId) -> TaskSpec` (`spec.md` §4.5).
    pub async fn specify_task(
        &self,
        task: &Task,
        envelope: &BudgetEnvelope,
        trace_id: &str,
    ) -> VantageResult<TaskSpec> {
        let raw = self
            .call_model(
                Purpose::Plan,
                envelope,
                trace_id,
                "You turn a task description into JSON {goal, constraints, successCriteria}.",
                &task.description,
                RoutingContext::default(),
            )
            .await?;

        let spec = parse_json_response(&raw)
            .and_then(|v| serde_json::from_value::<TaskSpec>(v).ok())
            .filter(|spec: &TaskSpec| !spec.success_criteria.is_empty())
            .unwrap_or_else(|| {
                emit_event(
                    tracing::Level::DEBUG,
                    ObservabilityEvent::new("spec_fallback", "planner")
                        .with_trace_id(trace_id)
                        .with_task_id(&task.id)
                        .with_detail("specifyTask model output unparseable, using fallback spec"),
                );
                TaskSpec::fallback(task)
            });

        let _ = self
            .trace
            .log_event(
                trace_id,
                TraceEvent::SpecGenerated {
                    timestamp: chrono::Utc::now(),
                    data: serde_json::to_value(&spec).unwrap_or_default(),
                },
            )
            .await;
        Ok(spec)
    }

    /// `classifyComplexity(task, env, traceId) -> c` (`spec.md` §4.5).
    pub async fn classify_complexity(
        &self,
        task: &Task,
        envelope: &BudgetEnvelope,
        trace_id: &str,
    ) -> VantageResult<f64> {
        let action_intent = classify_action_intent(&task.description);
        let raw = self
            .call_model(
                Purpose::Classify,
                envelope,
                trace_id,
                "Rate the complexity of this task from 0 to 1 as JSON {complexity: number}.",
                &task.description,
                RoutingContext::default(),
            )
            .await?;
        let model_score = parse_json_response(&raw)
            .and_then(|v| v.get("complexity").and_then(|c| c.as_f64()))
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.5);
        Ok(model_score.max(action_intent))
    }

    /// `plan(task, complexity, env, traceId) -> ExecutionPlan` (`spec.md`
    /// §4.5): a single escalation-and-retry if the first pass yields no
    /// steps for a task the action classifier thinks needs them.
    pub async fn plan(
        &self,
        task: &Task,
        complexity: f64,
        envelope: &BudgetEnvelope,
        trace_id: &str,
    ) -> VantageResult<ExecutionPlan> {
        let action_intent = classify_action_intent(&task.description);
        let mut plan = self.generate_plan(task, complexity, envelope, trace_id).await?;

        if plan.steps.is_empty() && action_intent > 0.0 {
            emit_event(
                tracing::Level::INFO,
                ObservabilityEvent::new("plan_escalation", "planner")
                    .with_trace_id(trace_id)
                    .with_task_id(&task.id)
                    .with_detail("empty plan for an action-intent task, escalating once"),
            );
            let _ = self
                .trace
                .log_event(
                    trace_id,
                    TraceEvent::Escalation {
                        timestamp: chrono::Utc::now(),
                        reason: "empty plan for an action-intent task; escalating once".to_string(),
                    },
                )
                .await;
            plan = self.generate_plan(task, 1.0, envelope, trace_id).await?;
        }

        Ok(plan)
    }

    async fn generate_plan(
        &self,
        task: &Task,
        complexity: f64,
        envelope: &BudgetEnvelope,
        trace_id: &str,
    ) -> VantageResult<ExecutionPlan> {
        let raw = self
            .call_model(
                Purpose::Plan,
                envelope,
                trace_id,
                "Produce an execution plan as JSON {steps: [{description, toolName, toolArgs}]}.",
                &task.description,
                RoutingContext {
                    complexity: Some(complexity),
                    ..Default::default()
                },
            )
            .await?;

        let parsed = parse_json_response(&raw).ok_or_else(|| VantageError::PlanValidation {
            reason: "model plan output was not valid JSON".to_string(),
        })?;

        let raw_steps = parsed
            .get("steps")
            .and_then(|s| s.as_array())
            .cloned()
            .unwrap_or_default();

        let mut steps = Vec::with_capacity(raw_steps.len());
        for (index, raw_step) in raw_steps.into_iter().enumerate() {
            let description = raw_step
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let tool_name = raw_step
                .get("toolName")
                .and_then(|v| v.as_str())
                .ok_or_else(|| VantageError::PlanValidation {
                    reason: format!("step {index} missing toolName"),
                })?
                .to_string();
            let tool_args = raw_step.get("toolArgs").cloned().unwrap_or(serde_json::Value::Null);
            steps.push(PlanStep {
                index,
                description,
                tool_name,
                tool_args,
                strategy: None,
            });
        }

        Ok(ExecutionPlan::new(task.id.clone(), complexity, steps))
    }

    /// `validatePlan(plan)` (`spec.md` §4.5): every `toolName` must be
    /// registered; duplicate indices are rejected; empty plans are legal.
    pub async fn validate_plan(&self, plan: &ExecutionPlan, tools: &ToolRegistry) -> VantageResult<()> {
        if plan.has_duplicate_indices() {
            return Err(VantageError::PlanValidation {
                reason: "plan contains duplicate step indices".to_string(),
            });
        }
        for step in &plan.steps {
            if !tools.has(&step.tool_name).await {
                return Err(VantageError::PlanValidation {
                    reason: format!("step {} references unregistered tool '{}'", step.index, step.tool_name),
                });
            }
        }
        Ok(())
    }

    /// `annotatePlanWithStrategies(task, plan)` (`spec.md` §4.5): browser
    /// steps get a `{primary, fallbackChain, reason}` strategy derived from
    /// description keywords; non-browser tools are untouched.
    pub fn annotate_plan_with_strategies(&self, task: &Task, plan: &mut ExecutionPlan) {
        let description = task.description.to_lowercase();
        let primary = if description.contains("visual") || description.contains("screenshot") {
            StrategyKind::Vision
        } else if description.contains("api") || description.contains("fetch") {
            StrategyKind::Api
        } else {
            StrategyKind::Dom
        };
        let fallback_chain: Vec<StrategyKind> = [StrategyKind::Dom, StrategyKind::Vision, StrategyKind::Api]
            .into_iter()
            .filter(|k| *k != primary)
            .collect();

        for step in &mut plan.steps {
            if is_browser_tool(&step.tool_name) {
                step.strategy = Some(StepStrategy {
                    primary,
                    fallback_chain: fallback_chain.clone(),
                    reason: format!("derived from task description keywords (primary={primary:?})"),
                });
            }
        }
    }

    /// `critique(plan, stepResults, env, traceId)` (`spec.md` §4.5): per-step
    /// confidence defaults to 0.7 if the model omits it, and decays by
    /// `CONFIDENCE_DECAY` for every downstream step following a failure.
    pub async fn critique(
        &self,
        plan: &ExecutionPlan,
        step_results: &[StepResult],
        envelope: &BudgetEnvelope,
        trace_id: &str,
    ) -> VantageResult<CritiqueResult> {
        let raw = self
            .call_model(
                Purpose::Verify,
                envelope,
                trace_id,
                "Critique this plan's execution as JSON {overall, stepConfidences, issues}.",
                &serde_json::to_string(step_results).unwrap_or_default(),
                RoutingContext::default(),
            )
            .await?;

        let parsed = parse_json_response(&raw);
        let model_confidences: Vec<f64> = parsed
            .as_ref()
            .and_then(|v| v.get("stepConfidences"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_f64()).collect())
            .unwrap_or_default();
        let issues: Vec<String> = parsed
            .as_ref()
            .and_then(|v| v.get("issues"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();

        let mut decay = 1.0;
        let mut step_confidences = Vec::with_capacity(plan.steps.len());
        for (i, step) in plan.steps.iter().enumerate() {
            let base = model_confidences
                .get(i)
                .copied()
                .unwrap_or(DEFAULT_STEP_CONFIDENCE);
            let confidence = (base * decay).clamp(0.0, 1.0);
            step_confidences.push(confidence);

            let failed = step_results
                .iter()
                .find(|r| r.step_index == step.index)
                .map(|r| !r.success)
                .unwrap_or(false);
            if failed {
                decay *= CONFIDENCE_DECAY;
            }

            let _ = self
                .trace
                .log_event(
                    trace_id,
                    TraceEvent::ConfidenceUpdate {
                        timestamp: chrono::Utc::now(),
                        step_index: step.index,
                        confidence,
                    },
                )
                .await;
        }

        let overall = if step_confidences.is_empty() {
            model_confidences
                .first()
                .copied()
                .or_else(|| parsed.as_ref().and_then(|v| v.get("overall")).and_then(|v| v.as_f64()))
                .unwrap_or(DEFAULT_STEP_CONFIDENCE)
        } else {
            step_confidences.iter().sum::<f64>() / step_confidences.len() as f64
        };

        let _ = self
            .trace
            .log_event(
                trace_id,
                TraceEvent::PlanCritique {
                    timestamp: chrono::Utc::now(),
                    data: serde_json::json!({"overall": overall, "issues": issues}),
                },
            )
            .await;

        Ok(CritiqueResult {
            overall: overall.clamp(0.0, 1.0),
            step_confidences,
            issues,
        })
    }
}

fn is_browser_tool(tool_name: &str) -> bool {
    tool_name == BROWSER_NAVIGATE_TOOL || BROWSER_ACTION_TOOLS.contains(&tool_name)
}

async fn pricing_for(provider: &Arc<dyn vantage_providers::Provider>, model_id: &str) -> vantage_budget::TokenPricing {
    let models = provider.list_models().await;
    models
        .into_iter()
        .find(|m| m.id == model_id)
        .map(|m| vantage_budget::TokenPricing {
            cost_per_input_token: m.cost_per_input_token.unwrap_or(0.0),
            cost_per_output_token: m.cost_per_output_token.unwrap_or(0.0),
            energy_per_input_token_wh: m.energy_per_input_token_wh.unwrap_or(0.0),
            energy_per_output_token_wh: m.energy_per_output_token_wh.unwrap_or(0.0),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vantage_providers::EchoProvider;
    use vantage_types::{BudgetPreset, Tier};

    fn planner_with_echo() -> (Planner, BudgetEnvelope) {
        let provider: Arc<dyn vantage_providers::Provider> = Arc::new(EchoProvider::new("echo"));
        let mut priority = HashMap::new();
        priority.insert(Tier::Slm, vec!["echo".to_string()]);
        priority.insert(Tier::Llm, vec!["echo".to_string()]);
        let router = Arc::new(ModelRouter::new(
            vec![provider],
            priority,
            Default::default(),
            Default::default(),
        ));
        let trace = TraceLogger::new();
        (Planner::new(router, trace), BudgetEnvelope::from_preset(BudgetPreset::Medium))
    }

    #[tokio::test]
    async fn specify_task_falls_back_when_model_output_is_unparseable() {
        let (planner, envelope) = planner_with_echo();
        let trace = TraceLogger::new();
        trace.create_trace("tr-1", "t-1", BudgetPreset::Medium.limits()).await;
        // EchoProvider always echoes plain text, never JSON, so this always
        // exercises the fallback path.
        let task = Task::new("t-1", "summarize this document");
        let planner = Planner::new(planner_router(&planner), trace);
        let spec = planner.specify_task(&task, &envelope, "tr-1").await.unwrap();
        assert_eq!(spec.goal, "summarize this document");
        assert!(!spec.success_criteria.is_empty());
    }

    fn planner_router(planner: &Planner) -> Arc<ModelRouter> {
        planner.router.clone()
    }

    #[tokio::test]
    async fn classify_complexity_uses_action_intent_floor() {
        let (planner, envelope) = planner_with_echo();
        let task = Task::new("t-1", "run command to delete a file");
        let complexity = planner.classify_complexity(&task, &envelope, "tr-x").await.unwrap();
        assert!(complexity >= 0.7);
    }

    #[tokio::test]
    async fn plan_rejects_unparseable_model_output() {
        let (planner, envelope) = planner_with_echo();
        let task = Task::new("t-1", "do something");
        // EchoProvider's plain-text echo is never valid {"steps": [...]}
        // JSON, so plan() must surface PlanValidation.
        let result = planner.generate_plan(&task, 0.5, &envelope, "tr-y").await;
        assert!(matches!(result, Err(VantageError::PlanValidation { .. })));
    }

    #[test]
    fn annotate_assigns_vision_strategy_for_visual_tasks() {
        let (planner, _envelope) = planner_with_echo();
        let task = Task::new("t-1", "take a visual screenshot of the page");
        let mut plan = ExecutionPlan::new(
            "t-1",
            0.5,
            vec![PlanStep {
                index: 0,
                description: "navigate".into(),
                tool_name: "browser_navigate".into(),
                tool_args: serde_json::Value::Null,
                strategy: None,
            }],
        );
        planner.annotate_plan_with_strategies(&task, &mut plan);
        assert_eq!(plan.steps[0].strategy.as_ref().unwrap().primary, StrategyKind::Vision);
    }

    #[test]
    fn annotate_leaves_non_browser_tools_unannotated() {
        let (planner, _envelope) = planner_with_echo();
        let task = Task::new("t-1", "add two numbers");
        let mut plan = ExecutionPlan::new(
            "t-1",
            0.2,
            vec![PlanStep {
                index: 0,
                description: "calc".into(),
                tool_name: "calculator".into(),
                tool_args: serde_json::Value::Null,
                strategy: None,
            }],
        );
        planner.annotate_plan_with_strategies(&task, &mut plan);
        assert!(plan.steps[0].strategy.is_none());
    }

    #[tokio::test]
    async fn critique_decays_confidence_after_a_failed_step() {
        let (planner, envelope) = planner_with_echo();
        let trace = TraceLogger::new();
        trace.create_trace("tr-2", "t-1", BudgetPreset::Medium.limits()).await;
        let planner = Planner::new(planner_router(&planner), trace);
        let plan = ExecutionPlan::new(
            "t-1",
            0.5,
            vec![
                PlanStep {
                    index: 0,
                    description: "a".into(),
                    tool_name: "test_tool".into(),
                    tool_args: serde_json::Value::Null,
                    strategy: None,
                },
                PlanStep {
                    index: 1,
                    description: "b".into(),
                    tool_name: "test_tool".into(),
                    tool_args: serde_json::Value::Null,
                    strategy: None,
                },
            ],
        );
        let step_results = vec![
            StepResult {
                step_index: 0,
                tool_name: "test_tool".into(),
                tool_args: serde_json::Value::Null,
                output: None,
                error: Some("boom".into()),
                success: false,
                duration_ms: 1,
                confidence: None,
            },
            StepResult {
                step_index: 1,
                tool_name: "test_tool".into(),
                tool_args: serde_json::Value::Null,
                output: Some(serde_json::Value::Null),
                error: None,
                success: true,
                duration_ms: 1,
                confidence: None,
            },
        ];
        let critique = planner.critique(&plan, &step_results, &envelope, "tr-2").await.unwrap();
        assert_eq!(critique.step_confidences.len(), 2);
        assert!(critique.step_confidences[1] < critique.step_confidences[0]);
    }
}
