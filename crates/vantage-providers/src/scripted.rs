//! Deterministic scripted-response provider test double. Unlike
//! `EchoProvider`, which only reflects the caller's last message, this
//! returns a fixed, ordered queue of canned responses across successive
//! `chat` calls — needed wherever a test has to drive a real JSON turn
//! sequence (spec, classify, plan, critique, synthesis) rather than an
//! echo. Grounded in the same stub-friendly `Provider` shape as `echo.rs`.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vantage_types::{ModelInfo, ModelRequest, ModelResponse, Tier, TokenUsage};

use crate::provider::Provider;

pub struct ScriptedProvider {
    id: String,
    models: Vec<ModelInfo>,
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedProvider {
    /// `responses` are popped in order, one per `chat` call. A call past the
    /// end of the queue gets `"{}"` rather than panicking, so a misscripted
    /// test fails on an assertion instead of a poisoned mutex.
    pub fn new<S: Into<String>>(id: impl Into<String>, responses: Vec<S>) -> Self {
        let id = id.into();
        Self {
            models: vec![
                ModelInfo {
                    id: format!("{id}-slm"),
                    name: format!("{id} SLM"),
                    tier: Tier::Slm,
                    context_window: 8_192,
                    cost_per_input_token: Some(0.0000001),
                    cost_per_output_token: Some(0.0000002),
                    energy_per_input_token_wh: Some(0.00000001),
                    energy_per_output_token_wh: Some(0.00000002),
                },
                ModelInfo {
                    id: format!("{id}-llm"),
                    name: format!("{id} LLM"),
                    tier: Tier::Llm,
                    context_window: 128_000,
                    cost_per_input_token: Some(0.000003),
                    cost_per_output_token: Some(0.000015),
                    energy_per_input_token_wh: Some(0.0000005),
                    energy_per_output_token_wh: Some(0.000001),
                },
            ],
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            id,
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn chat(&self, request: ModelRequest, _cancel: CancellationToken) -> anyhow::Result<ModelResponse> {
        let content = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "{}".to_string());
        let prompt_tokens = request.messages.iter().map(|m| m.content.len() as u64 / 4).sum();
        let completion_tokens = (content.len() as u64 / 4).max(1);
        Ok(ModelResponse {
            model: request.model,
            provider: self.id.clone(),
            tier: request.tier,
            content,
            token_usage: TokenUsage {
                prompt: prompt_tokens,
                completion: completion_tokens,
                total: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
            cost_usd: 0.0,
            finish_reason: "stop".to_string(),
            energy_wh: Some(0.0),
        })
    }
}
