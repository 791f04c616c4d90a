//! Outbound provider contract (`spec.md` §6), grounded in
//! `tandem_providers::Provider` — widened from a freeform `complete`/`stream`
//! pair to the typed `ModelRequest`/`ModelResponse` contract this kernel
//! routes against.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vantage_types::{ModelInfo, ModelRequest, ModelResponse, ModelStreamChunk};

/// A model provider the router can pick candidates from. Implementations are
/// never shipped here beyond a deterministic in-memory test double — real
/// HTTP provider clients are out of scope (`SPEC_FULL.md` §12).
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    async fn is_available(&self) -> bool;

    async fn list_models(&self) -> Vec<ModelInfo>;

    async fn chat(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<ModelResponse>;

    /// Default streaming shim mirrors `tandem_providers::Provider::stream`:
    /// providers that cannot natively stream fall back to one non-streamed
    /// chunk followed by a `done` chunk.
    async fn chat_stream(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> anyhow::Result<Vec<ModelStreamChunk>> {
        let response = self.chat(request, cancel).await?;
        Ok(vec![
            ModelStreamChunk {
                content: response.content,
                done: false,
                token_usage: None,
                finish_reason: None,
            },
            ModelStreamChunk {
                content: String::new(),
                done: true,
                token_usage: Some(response.token_usage),
                finish_reason: Some(response.finish_reason),
            },
        ])
    }
}
