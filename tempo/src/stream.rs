//! Streaming events emitted by a graph run.
//!
//! Nodes publish through the optional sender in
//! [`RunContext`](crate::graph::RunContext); the session manager bridges them
//! into the SSE response. Senders are bounded; a full queue blocks the node
//! at its next await point rather than dropping tokens.

/// One incremental piece of assistant text from the model stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageChunk {
    pub content: String,
}

/// Event from a running agent graph.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Incremental assistant text.
    Token(String),
    /// A tool is about to execute.
    ToolStart { name: String },
    /// A tool finished (successfully or with an error result).
    ToolEnd { name: String },
}

/// Escapes a payload for one SSE `data:` line: backslashes double, newlines
/// become the two characters `\n`. [`sse_unescape`] is the exact inverse, so
/// the pair is an involution on arbitrary UTF-8 payloads.
pub fn sse_escape(payload: &str) -> String {
    payload.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Reverses [`sse_escape`]. Client-side counterpart lives in the frontend;
/// this one exists for tests and internal consumers.
pub fn sse_unescape(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    let mut chars = payload.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                // Unknown escape: keep both characters.
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
