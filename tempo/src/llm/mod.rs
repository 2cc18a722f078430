//! Model gateway: one façade for chat-completion calls.
//!
//! The caller supplies everything per call — messages, the tool specs to
//! advertise, temperature — and gets back either a full assistant message
//! (with optional tool-call requests) or a token stream ending in the same
//! aggregated response. The gateway keeps no state between calls.

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::ChatOpenAI;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::{Message, ToolCall};
use crate::stream::MessageChunk;
use crate::tools::ToolSpec;

/// One completion call: messages plus the tools advertised for this call.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from one completion: assistant text and optional tool calls.
pub struct LlmResponse {
    pub content: String,
    /// Tool calls requested this turn; empty means a final message.
    pub tool_calls: Vec<ToolCall>,
}

/// Chat-completion client: request in, assistant text + tool calls out.
///
/// Implementations: [`ChatOpenAI`] (vendor API), [`MockLlm`] (scripted, for
/// tests). Failures are surfaced as [`AgentError::Model`]; retrying beyond
/// the transport's small built-in attempt count is the caller's business.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse, AgentError>;

    /// Streaming variant: sends [`MessageChunk`]s through `chunk_tx` as they
    /// arrive and still returns the complete response at the end.
    ///
    /// Default implementation calls [`complete`](Self::complete) and sends
    /// the full content as one chunk.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<MessageChunk>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.complete(request).await?;
        if !response.content.is_empty() {
            let _ = chunk_tx
                .send(MessageChunk {
                    content: response.content.clone(),
                })
                .await;
        }
        Ok(response)
    }
}
