//! Traits for model clients.

use crate::model::types::{ChatReply, ChatRequest, ModelError};

/// The seam between the simulation engine and a chat model.
/// Implemented by `OpenAiClient`; tests substitute scripted models.
#[async_trait::async_trait]
pub trait SimulationModel: Send + Sync {
    fn model_id(&self) -> String;

    async fn chat(&self, req: ChatRequest) -> Result<ChatReply, ModelError>;

    /// Streaming variant; `on_delta` receives content fragments as they arrive.
    /// The default implementation delivers the whole reply as a single delta.
    async fn chat_streaming(
        &self,
        req: ChatRequest,
        on_delta: &mut (dyn FnMut(String) + Send),
    ) -> Result<ChatReply, ModelError> {
        let reply = self.chat(req).await?;
        if !reply.content.is_empty() {
            on_delta(reply.content.clone());
        }
        Ok(reply)
    }
}
