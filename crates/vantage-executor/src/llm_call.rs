//! Shared "route, call, deduct" helper used by both the Task Executor's
//! synthesis call and the Direct Executor's react loop. Mirrors the pattern
//! `vantage_planner::Planner`'s own private `call_model` follows — kept as a
//! small free function here rather than exported from `vantage-planner`,
//! since the Planner's version is purpose-bound to spec/classify/plan/critique
//! prompts while this one serves synthesis and direct-execution turns.

use vantage_budget::BudgetEnvelope;
use vantage_observability::{emit_event, ObservabilityEvent};
use vantage_providers::{ModelRouter, RoutingContext};
use vantage_trace::TraceLogger;
use vantage_types::{ModelMessage, ModelRequest, Purpose, TraceEvent, VantageError, VantageResult};

pub async fn call_model(
    router: &ModelRouter,
    trace: &TraceLogger,
    purpose: Purpose,
    envelope: &BudgetEnvelope,
    trace_id: &str,
    system: &str,
    messages: Vec<ModelMessage>,
    context: RoutingContext,
) -> VantageResult<String> {
    envelope.check_budget()?;
    let decision = router.route(purpose, envelope, context).await?;
    let _ = trace
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
    emit_event(
        tracing::Level::INFO,
        ObservabilityEvent::new("routing_decision", "llm_call")
            .with_trace_id(trace_id)
            .with_provider_id(&decision.provider)
            .with_model_id(&decision.model),
    );

    let provider = router.get_provider(&decision.provider).ok_or_else(|| VantageError::NoAvailableProvider {
        tier: decision.tier.as_str().to_string(),
        purpose: purpose.as_str().to_string(),
    })?;

    let request = ModelRequest {
        model: decision.model.clone(),
        provider: decision.provider.clone(),
        tier: decision.tier,
        system: Some(system.to_string()),
        messages,
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

    let models = provider.list_models().await;
    let pricing = models
        .into_iter()
        .find(|m| m.id == decision.model)
        .map(|m| vantage_budget::TokenPricing {
            cost_per_input_token: m.cost_per_input_token.unwrap_or(0.0),
            cost_per_output_token: m.cost_per_output_token.unwrap_or(0.0),
            energy_per_input_token_wh: m.energy_per_input_token_wh.unwrap_or(0.0),
            energy_per_output_token_wh: m.energy_per_output_token_wh.unwrap_or(0.0),
        })
        .unwrap_or_default();
    envelope.deduct_tokens(
        vantage_budget::TokenUsage {
            prompt_tokens: response.token_usage.prompt,
            completion_tokens: response.token_usage.completion,
        },
        pricing,
    );

    if response.content.trim().is_empty() {
        return Err(VantageError::ProviderError {
            provider_id: decision.provider.clone(),
            message: "empty response from provider".to_string(),
        });
    }

    Ok(response.content)
}
