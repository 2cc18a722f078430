//! Request bodies and the attachment → message conversion.

use serde::Deserialize;

use tempo::message::{FileKind, Message, Part};

fn default_session() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

/// Body of `/ask` and `/ask_stream`.
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub user_id: String,
    pub password: String,
    pub text: String,
    /// Subset of tool names enabled this turn; absent = all.
    #[serde(default)]
    pub enabled_tools: Option<Vec<String>>,
    #[serde(default = "default_session")]
    pub session_id: String,
    /// Images as base64 data URIs.
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub files: Option<Vec<FileAttachment>>,
    #[serde(default)]
    pub audios: Option<Vec<AudioAttachment>>,
}

/// One attached file. For `type: "pdf"` the frontend delivers the parsed
/// text in `content` (or a `data:` URI when only the raw document is
/// available); plain files carry their text directly.
#[derive(Debug, Deserialize)]
pub struct FileAttachment {
    #[serde(default = "unnamed_file")]
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "text_type", rename = "type")]
    pub kind: String,
}

fn unnamed_file() -> String {
    "unnamed file".to_string()
}

fn text_type() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AudioAttachment {
    #[serde(default)]
    pub base64: String,
    #[serde(default = "default_audio_name")]
    pub name: String,
    #[serde(default = "default_audio_format")]
    pub format: String,
}

fn default_audio_name() -> String {
    "recording.webm".to_string()
}

fn default_audio_format() -> String {
    "webm".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub user_id: String,
    pub password: String,
    #[serde(default = "default_session")]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SystemTriggerRequest {
    pub user_id: String,
    #[serde(default = "default_trigger_text")]
    pub text: String,
    #[serde(default = "default_session")]
    pub session_id: String,
}

fn default_trigger_text() -> String {
    "summary".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SessionListRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionHistoryRequest {
    pub user_id: String,
    pub password: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSessionRequest {
    pub user_id: String,
    pub password: String,
    /// Empty deletes every session of the user.
    #[serde(default)]
    pub session_id: String,
}

/// One entry of an OASIS bridge history.
#[derive(Debug, Deserialize)]
pub struct BridgePost {
    #[serde(default = "unknown_expert")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn unknown_expert() -> String {
    "unknown expert".to_string()
}

/// Body of `/oasis/ask`: the forum invites this agent to participate.
#[derive(Debug, Deserialize)]
pub struct OasisAskRequest {
    pub session_id: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub history: Vec<BridgePost>,
    #[serde(default = "default_bridge_user")]
    pub user_id: String,
    #[serde(default)]
    pub enabled_tools: Option<Vec<String>>,
    /// Persona instruction, delivered with the first call of a session.
    #[serde(default)]
    pub persona: Option<String>,
}

fn default_topic() -> String {
    "unknown topic".to_string()
}

fn default_bridge_user() -> String {
    "oasis_external".to_string()
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub user_id: String,
    pub password: String,
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
}

const MAX_INLINE_FILE_CHARS: usize = 50_000;

fn clip_file(content: &str) -> String {
    if content.chars().count() > MAX_INLINE_FILE_CHARS {
        let clipped: String = content.chars().take(MAX_INLINE_FILE_CHARS).collect();
        format!(
            "{clipped}\n\n... (file too long, truncated; {} chars total)",
            content.chars().count()
        )
    } else {
        content.to_string()
    }
}

/// Builds the user message for one turn: plain text when there are no
/// binary attachments, a part list otherwise. Text files are inlined into
/// the message text; PDFs become file parts carrying extracted text (and the
/// raw document when the frontend sent a data URI); images and audio become
/// their own parts.
pub fn build_user_message(request: &UserRequest) -> Message {
    let mut combined_text = request.text.clone();

    let mut pdf_parts: Vec<Part> = Vec::new();
    for file in request.files.as_deref().unwrap_or_default() {
        if file.kind == "pdf" {
            let is_raw = file.content.starts_with("data:");
            pdf_parts.push(Part::File {
                name: file.name.clone(),
                text: if is_raw {
                    "(PDF delivered as raw document)".to_string()
                } else {
                    clip_file(&file.content)
                },
                raw_data_uri: is_raw.then(|| file.content.clone()),
                kind: FileKind::Pdf,
            });
        } else {
            combined_text.push_str(&format!(
                "\n\nAttachment: {}\n```\n{}\n```",
                file.name,
                clip_file(&file.content)
            ));
        }
    }

    let images = request.images.as_deref().unwrap_or_default();
    let audios = request.audios.as_deref().unwrap_or_default();
    if images.is_empty() && audios.is_empty() && pdf_parts.is_empty() {
        return Message::user(if combined_text.is_empty() {
            "(empty message)".to_string()
        } else {
            combined_text
        });
    }

    let mut parts = Vec::new();
    if !combined_text.is_empty() {
        parts.push(Part::Text {
            text: combined_text,
        });
    } else if !audios.is_empty() {
        // Voice-only message: keep one text part so every consumer has text
        // to anchor on.
        parts.push(Part::Text {
            text: "please listen to and handle the following audio:".to_string(),
        });
    }
    for data_uri in images {
        parts.push(Part::Image {
            data_uri: data_uri.clone(),
        });
    }
    parts.extend(pdf_parts);
    for audio in audios {
        parts.push(Part::Audio {
            base64: audio.base64.clone(),
            format: audio.format.clone(),
            name: audio.name.clone(),
        });
    }
    Message::user_parts(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempo::message::MessageContent;

    fn request(text: &str) -> UserRequest {
        UserRequest {
            user_id: "ada".into(),
            password: "pw".into(),
            text: text.into(),
            enabled_tools: None,
            session_id: "s1".into(),
            images: None,
            files: None,
            audios: None,
        }
    }

    #[test]
    fn plain_text_stays_plain() {
        let msg = build_user_message(&request("hello"));
        assert_eq!(msg, Message::user("hello"));
    }

    #[test]
    fn text_files_are_inlined() {
        let mut req = request("see attachment");
        req.files = Some(vec![FileAttachment {
            name: "notes.txt".into(),
            content: "line one".into(),
            kind: "text".into(),
        }]);
        match build_user_message(&req) {
            Message::User {
                content: MessageContent::Plain(text),
            } => {
                assert!(text.contains("see attachment"));
                assert!(text.contains("Attachment: notes.txt"));
                assert!(text.contains("line one"));
            }
            other => panic!("expected plain user message, got {other:?}"),
        }
    }

    /// **Scenario**: images and a raw PDF produce a part list with the text
    /// part first.
    #[test]
    fn binary_attachments_become_parts() {
        let mut req = request("look");
        req.images = Some(vec!["data:image/png;base64,AA".into()]);
        req.files = Some(vec![FileAttachment {
            name: "doc.pdf".into(),
            content: "data:application/pdf;base64,BB".into(),
            kind: "pdf".into(),
        }]);
        match build_user_message(&req) {
            Message::User {
                content: MessageContent::Multipart(parts),
            } => {
                assert!(matches!(&parts[0], Part::Text { text } if text == "look"));
                assert!(matches!(&parts[1], Part::Image { .. }));
                assert!(matches!(
                    &parts[2],
                    Part::File { raw_data_uri: Some(_), kind: FileKind::Pdf, .. }
                ));
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }

    #[test]
    fn voice_only_gets_placeholder_text() {
        let mut req = request("");
        req.audios = Some(vec![AudioAttachment {
            base64: "AAAA".into(),
            name: "memo.webm".into(),
            format: "webm".into(),
        }]);
        match build_user_message(&req) {
            Message::User {
                content: MessageContent::Multipart(parts),
            } => {
                assert!(matches!(&parts[0], Part::Text { text } if text.contains("audio")));
                assert!(matches!(&parts[1], Part::Audio { .. }));
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }
}
