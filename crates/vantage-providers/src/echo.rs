//! A deterministic in-memory provider test double (`SPEC_FULL.md` §12:
//! "a small number of deterministic in-memory/test-double implementations
//! sufficient to exercise and demonstrate the kernel ... never a real HTTP
//! provider client"). Grounded in `tandem_providers`'s own stub-friendly
//! `Provider` trait shape.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vantage_types::{ModelInfo, ModelRequest, ModelResponse, Tier, TokenUsage};

use crate::provider::Provider;

/// Echoes the last user message back, prefixed. Useful for wiring up
/// end-to-end tests of the kernel without a real model call.
pub struct EchoProvider {
    id: String,
    models: Vec<ModelInfo>,
}

impl EchoProvider {
    pub fn new(id: impl Into<String>) -> Self {
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
            id,
        }
    }
}

#[async_trait]
impl Provider for EchoProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    async fn chat(
        &self,
        request: ModelRequest,
        _cancel: CancellationToken,
    ) -> anyhow::Result<ModelResponse> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, vantage_types::MessageRole::User))
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let content = format!("echo: {last_user}");
        let prompt_tokens = request.messages.iter().map(|m| m.content.len() as u64 / 4).sum();
        let completion_tokens = content.len() as u64 / 4;
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

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_types::ModelMessage;

    #[tokio::test]
    async fn echo_provider_reflects_the_last_user_message() {
        let provider = EchoProvider::new("test");
        let response = provider
            .chat(
                ModelRequest {
                    model: "test-slm".into(),
                    provider: "test".into(),
                    tier: Tier::Slm,
                    system: None,
                    messages: vec![ModelMessage::user("hello")],
                    temperature: None,
                    max_tokens: None,
                    response_format: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.content, "echo: hello");
    }

    #[tokio::test]
    async fn echo_provider_exposes_both_tiers() {
        let provider = EchoProvider::new("test");
        let models = provider.list_models().await;
        assert!(models.iter().any(|m| m.tier == Tier::Slm));
        assert!(models.iter().any(|m| m.tier == Tier::Llm));
    }
}
