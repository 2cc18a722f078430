//! OpenAI-compatible Chat Completions client implementing `LlmClient`.
//!
//! Works against any endpoint speaking the Chat Completions dialect
//! (`LLM_BASE_URL`), which is how the platform talks to DeepSeek-style
//! providers. Tool specs are translated to vendor function declarations per
//! call; tool-call requests come back as [`ToolCall`]s with parsed argument
//! objects.
//!
//! # Vision
//!
//! The `vision_supported` flag decides whether image parts are forwarded as
//! `image_url` content parts or dropped with a user-visible note appended to
//! the text, so a non-vision deployment degrades loudly instead of erroring
//! upstream.
//!
//! # Retries
//!
//! The underlying client retries transient failures with its own small
//! backoff; no additional retry loop lives here. Vendor 4xx and malformed
//! responses surface verbatim as [`AgentError::Model`].

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::error::AgentError;
use crate::llm::{CompletionRequest, LlmClient, LlmResponse};
use crate::message::{Message, MessageContent, Part, ToolCall};
use crate::stream::MessageChunk;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        ChatCompletionTool, ChatCompletionTools, CreateChatCompletionRequestArgs, FunctionCall,
        FunctionObject, ImageUrlArgs,
    },
    Client,
};

/// Chat Completions client for the platform's configured vendor.
pub struct ChatOpenAI {
    client: Client<OpenAIConfig>,
    model: String,
    vision_supported: bool,
}

impl ChatOpenAI {
    /// Client from explicit parts.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        vision_supported: bool,
    ) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(base_url);
        Self {
            client: Client::with_config(config),
            model: model.into(),
            vision_supported,
        }
    }

    /// Client from `LLM_API_KEY`, `LLM_BASE_URL`, `LLM_MODEL`,
    /// `LLM_VISION_SUPPORT`. A missing key is a startup error.
    pub fn from_env() -> Result<Self, AgentError> {
        let api_key = std::env::var("LLM_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AgentError::Model("LLM_API_KEY is not set".to_string()))?;
        let base_url = config::env_or("LLM_BASE_URL", "https://api.deepseek.com/v1");
        let model = config::env_or("LLM_MODEL", "deepseek-chat");
        let vision = config::env_flag("LLM_VISION_SUPPORT", true);
        Ok(Self::new(api_key, base_url, model, vision))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Converts one user message, handling multimodal parts and the
    /// vision-off downgrade note.
    fn user_to_request(
        &self,
        content: &MessageContent,
    ) -> Result<ChatCompletionRequestMessage, AgentError> {
        let parts = match content {
            MessageContent::Plain(text) => {
                return Ok(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(text.as_str()),
                ))
            }
            MessageContent::Multipart(parts) => parts,
        };

        let image_count = parts
            .iter()
            .filter(|p| matches!(p, Part::Image { .. }))
            .count();
        let mut out: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        let mut text_accum = String::new();

        for part in parts {
            match part {
                Part::Text { text } => {
                    if !text_accum.is_empty() {
                        text_accum.push('\n');
                    }
                    text_accum.push_str(text);
                }
                Part::Image { data_uri } => {
                    if self.vision_supported {
                        out.push(
                            ChatCompletionRequestMessageContentPartImageArgs::default()
                                .image_url(
                                    ImageUrlArgs::default()
                                        .url(data_uri.clone())
                                        .build()
                                        .map_err(to_model_err)?,
                                )
                                .build()
                                .map_err(to_model_err)?
                                .into(),
                        );
                    }
                }
                Part::File { name, text, .. } => {
                    if !text_accum.is_empty() {
                        text_accum.push_str("\n\n");
                    }
                    text_accum.push_str(&format!("Attachment: {name}\n```\n{text}\n```"));
                }
                Part::Audio { name, format, .. } => {
                    // Audio transport is vendor-specific; the thread keeps the
                    // clip, the model gets a note.
                    if !text_accum.is_empty() {
                        text_accum.push('\n');
                    }
                    text_accum.push_str(&format!("[audio attachment: {name} ({format})]"));
                }
            }
        }

        if !self.vision_supported && image_count > 0 {
            text_accum.push_str(&format!(
                "\n\n[system note: you sent {image_count} image(s), but the current model \
                 cannot see images, so they were ignored. Switch to a vision-capable model \
                 and retry.]"
            ));
        }

        if out.is_empty() {
            // Everything collapsed to text; send a plain user message.
            return Ok(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage::from(text_accum.as_str()),
            ));
        }

        if !text_accum.is_empty() {
            out.insert(
                0,
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(text_accum)
                    .build()
                    .map_err(to_model_err)?
                    .into(),
            );
        }

        Ok(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(out)
                .build()
                .map_err(to_model_err)?,
        ))
    }

    fn messages_to_request(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, AgentError> {
        messages
            .iter()
            .map(|m| match m {
                Message::System { content } => Ok(ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(content.as_str()),
                )),
                Message::User { content } => self.user_to_request(content),
                Message::Assistant {
                    content,
                    tool_calls,
                } => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    args.content(content.as_str());
                    if !tool_calls.is_empty() {
                        let calls: Vec<ChatCompletionMessageToolCalls> = tool_calls
                            .iter()
                            .map(|tc| {
                                ChatCompletionMessageToolCalls::Function(
                                    ChatCompletionMessageToolCall {
                                        id: tc.id.clone(),
                                        function: FunctionCall {
                                            name: tc.name.clone(),
                                            arguments: tc.arguments.to_string(),
                                        },
                                    },
                                )
                            })
                            .collect();
                        args.tool_calls(calls);
                    }
                    Ok(ChatCompletionRequestMessage::Assistant(
                        args.build().map_err(to_model_err)?,
                    ))
                }
                Message::Tool {
                    call_id, content, ..
                } => Ok(ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(content.as_str())
                        .tool_call_id(call_id.clone())
                        .build()
                        .map_err(to_model_err)?,
                )),
            })
            .collect()
    }

    fn build_request(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<async_openai::types::chat::CreateChatCompletionRequest, AgentError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(self.messages_to_request(&request.messages)?);
        if stream {
            args.stream(true);
        }
        if !request.tools.is_empty() {
            let chat_tools: Vec<ChatCompletionTools> = request
                .tools
                .iter()
                .map(|t| {
                    ChatCompletionTools::Function(ChatCompletionTool {
                        function: FunctionObject {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: Some(t.parameters.clone()),
                            ..Default::default()
                        },
                    })
                })
                .collect();
            args.tools(chat_tools);
        }
        if let Some(t) = request.temperature {
            args.temperature(t);
        }
        if let Some(n) = request.max_tokens {
            args.max_completion_tokens(n);
        }
        args.build().map_err(to_model_err)
    }
}

fn to_model_err<E: std::fmt::Display>(e: E) -> AgentError {
    AgentError::Model(e.to_string())
}

/// Argument strings from the vendor become JSON objects; malformed argument
/// text is kept verbatim as a JSON string so nothing is silently lost.
fn parse_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[async_trait]
impl LlmClient for ChatOpenAI {
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse, AgentError> {
        let api_request = self.build_request(&request, false)?;
        debug!(
            model = %self.model,
            message_count = request.messages.len(),
            tools_count = request.tools.len(),
            "chat completion"
        );

        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .map_err(|e| AgentError::Model(format!("vendor API error: {e}")))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Model("vendor returned no choices".to_string()))?;

        let msg = choice.message;
        let tool_calls: Vec<ToolCall> = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(ToolCall {
                    id: f.id,
                    name: f.function.name,
                    arguments: parse_arguments(&f.function.arguments),
                }),
                _ => None,
            })
            .collect();

        Ok(LlmResponse {
            content: msg.content.unwrap_or_default(),
            tool_calls,
        })
    }

    /// Streaming variant: content deltas go out through `chunk_tx` as they
    /// arrive; tool calls are accumulated by stream index and returned whole.
    async fn complete_stream(
        &self,
        request: CompletionRequest,
        chunk_tx: mpsc::Sender<MessageChunk>,
    ) -> Result<LlmResponse, AgentError> {
        let api_request = self.build_request(&request, true)?;
        debug!(
            model = %self.model,
            message_count = request.messages.len(),
            tools_count = request.tools.len(),
            "chat completion stream"
        );

        let mut stream = self
            .client
            .chat()
            .create_stream(api_request)
            .await
            .map_err(|e| AgentError::Model(format!("vendor stream error: {e}")))?;

        let mut full_content = String::new();
        let mut sent_any = false;
        // index -> (id, name, arguments) accumulated across deltas
        let mut tool_call_map: std::collections::BTreeMap<u32, (String, String, String)> =
            std::collections::BTreeMap::new();

        while let Some(result) = stream.next().await {
            let response =
                result.map_err(|e| AgentError::Model(format!("vendor stream error: {e}")))?;
            for choice in response.choices {
                let delta = &choice.delta;
                if let Some(ref content) = delta.content {
                    if !content.is_empty() {
                        full_content.push_str(content);
                        sent_any = true;
                        let _ = chunk_tx
                            .send(MessageChunk {
                                content: content.clone(),
                            })
                            .await;
                    }
                }
                if let Some(ref tool_calls) = delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_map.entry(tc.index).or_default();
                        if let Some(ref id) = tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        if let Some(ref func) = tc.function {
                            if let Some(ref name) = func.name {
                                entry.1.push_str(name);
                            }
                            if let Some(ref arguments) = func.arguments {
                                entry.2.push_str(arguments);
                            }
                        }
                    }
                }
            }
        }

        // Some proxies send content only in the final payload, not in deltas.
        if !sent_any && !full_content.is_empty() {
            let _ = chunk_tx
                .send(MessageChunk {
                    content: full_content.clone(),
                })
                .await;
        }

        let tool_calls: Vec<ToolCall> = tool_call_map
            .into_values()
            .map(|(id, name, arguments)| ToolCall {
                id,
                name,
                arguments: parse_arguments(&arguments),
            })
            .collect();

        Ok(LlmResponse {
            content: full_content,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(vision: bool) -> ChatOpenAI {
        ChatOpenAI::new("test-key", "http://127.0.0.1:1/v1", "test-model", vision)
    }

    #[test]
    fn parse_arguments_keeps_malformed_text() {
        assert_eq!(parse_arguments(r#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(
            parse_arguments("not json"),
            serde_json::Value::String("not json".into())
        );
    }

    /// **Scenario**: with vision off, an image-bearing message collapses to
    /// plain text carrying the downgrade note.
    #[test]
    fn vision_off_drops_images_with_note() {
        let c = client(false);
        let msg = c
            .user_to_request(&MessageContent::Multipart(vec![
                Part::Text { text: "look".into() },
                Part::Image {
                    data_uri: "data:image/png;base64,AAAA".into(),
                },
            ]))
            .unwrap();
        match msg {
            ChatCompletionRequestMessage::User(u) => {
                let text = format!("{:?}", u.content);
                assert!(text.contains("cannot see images"));
                assert!(!text.contains("base64,AAAA"));
            }
            other => panic!("expected user message, got {other:?}"),
        }
    }

    /// **Scenario**: invoke against an unreachable base returns Err rather
    /// than hanging or panicking.
    #[tokio::test]
    async fn complete_with_unreachable_base_returns_error() {
        let c = client(true);
        let result = c
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await;
        assert!(result.is_err());
    }
}
