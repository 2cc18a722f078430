//! Message types for agent state.
//!
//! Four kinds flow through a thread: user input (possibly multimodal),
//! assistant replies (possibly carrying tool-call requests), tool results
//! bound to a call id, and transient system instructions. System messages are
//! only prepended at prompt time and never persisted.
//!
//! Content is a tagged variant: plain text or a list of parts. One canonical
//! text extraction ([`MessageContent::text`]) is shared by session listing
//! and old-message stripping so the two never disagree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Stable call id; the matching tool result echoes it.
    pub id: String,
    pub name: String,
    /// JSON argument object as produced by the model.
    pub arguments: Value,
}

/// Kind of an attached file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Text,
    Pdf,
}

/// One part of a multimodal user message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    /// Image as a base64 data URI.
    Image { data_uri: String },
    /// Attached file: extracted text plus, for PDFs in vision mode, the raw
    /// document as a data URI so the model can see the original.
    File {
        name: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_data_uri: Option<String>,
        kind: FileKind,
    },
    /// Audio clip, base64-encoded.
    Audio {
        base64: String,
        format: String,
        name: String,
    },
}

/// Content of a user message: plain text or a list of parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Plain(String),
    Multipart(Vec<Part>),
}

impl MessageContent {
    /// Canonical text extraction: text parts joined by newlines, non-text
    /// parts ignored. Plain content is returned as-is.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Plain(s) => s.clone(),
            MessageContent::Multipart(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|p| match p {
                        Part::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                texts.join("\n")
            }
        }
    }

    /// Like [`text`](Self::text) but non-text parts collapse into compact
    /// placeholders. Used when stripping old multimodal messages before a
    /// model call so binary blobs are not resubmitted every turn.
    pub fn text_with_placeholders(&self) -> String {
        match self {
            MessageContent::Plain(s) => s.clone(),
            MessageContent::Multipart(parts) => {
                let lines: Vec<String> = parts
                    .iter()
                    .map(|p| match p {
                        Part::Text { text } => text.clone(),
                        Part::Image { .. } => "[user uploaded image]".to_string(),
                        Part::File { name, .. } => format!("[user uploaded file: {name}]"),
                        Part::Audio { name, .. } => format!("[user uploaded audio: {name}]"),
                    })
                    .filter(|l| !l.is_empty())
                    .collect();
                lines.join("\n")
            }
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, MessageContent::Multipart(_))
    }
}

/// A single message in a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: MessageContent,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        #[serde(default)]
        name: String,
        content: String,
    },
    System {
        content: String,
    },
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: MessageContent::Plain(content.into()),
        }
    }

    pub fn user_parts(parts: Vec<Part>) -> Self {
        Self::User {
            content: MessageContent::Multipart(parts),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool(call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Tool calls of an assistant message; empty slice for other kinds.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Message::User { .. })
    }
}

/// Replaces the multimodal content of every user message except the last one
/// with its placeholder text. Other messages pass through untouched. Returns
/// a new list; the stored thread keeps its original content.
pub fn strip_old_multimodal(messages: &[Message]) -> Vec<Message> {
    let last_idx = messages.len().saturating_sub(1);
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| match m {
            Message::User { content } if content.is_multipart() && i != last_idx => {
                let text = content.text_with_placeholders();
                Message::User {
                    content: MessageContent::Plain(if text.is_empty() {
                        "(empty message)".to_string()
                    } else {
                        text
                    }),
                }
            }
            other => other.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_extraction_joins_text_parts_only() {
        let content = MessageContent::Multipart(vec![
            Part::Text {
                text: "look at this".into(),
            },
            Part::Image {
                data_uri: "data:image/png;base64,AAAA".into(),
            },
            Part::Text {
                text: "please".into(),
            },
        ]);
        assert_eq!(content.text(), "look at this\nplease");
    }

    #[test]
    fn placeholder_text_names_files() {
        let content = MessageContent::Multipart(vec![
            Part::Text { text: "see".into() },
            Part::File {
                name: "report.pdf".into(),
                text: "extracted".into(),
                raw_data_uri: None,
                kind: FileKind::Pdf,
            },
        ]);
        assert_eq!(
            content.text_with_placeholders(),
            "see\n[user uploaded file: report.pdf]"
        );
    }

    /// **Scenario**: stripping keeps the latest user message's parts intact
    /// and collapses earlier ones.
    #[test]
    fn strip_keeps_current_turn_multimodal() {
        let old = Message::user_parts(vec![
            Part::Text { text: "old".into() },
            Part::Image {
                data_uri: "data:image/png;base64,BBBB".into(),
            },
        ]);
        let current = Message::user_parts(vec![Part::Image {
            data_uri: "data:image/png;base64,CCCC".into(),
        }]);
        let stripped = strip_old_multimodal(&[old, Message::assistant("ok"), current.clone()]);
        match &stripped[0] {
            Message::User {
                content: MessageContent::Plain(t),
            } => assert_eq!(t, "old\n[user uploaded image]"),
            other => panic!("expected stripped plain user message, got {other:?}"),
        }
        assert_eq!(stripped[2], current);
    }

    #[test]
    fn message_roundtrips_through_serde() {
        let msgs = vec![
            Message::user("hi"),
            Message::assistant_with_calls(
                "",
                vec![ToolCall {
                    id: "call_1".into(),
                    name: "list_files".into(),
                    arguments: serde_json::json!({"username": "ada"}),
                }],
            ),
            Message::tool("call_1", "list_files", "a.txt"),
        ];
        let json = serde_json::to_string(&msgs).unwrap();
        let back: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(msgs, back);
    }
}
