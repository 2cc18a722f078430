//! Mapping from session stream items to SSE events.
//!
//! Framing: `data: <payload>\n\n`, payload escaped so newlines inside
//! content become the literal two characters `\n` (clients reverse it). The
//! terminal sentinel `[DONE]` is sent verbatim.

use axum::response::sse::Event;

use tempo::session::StreamItem;
use tempo::stream::sse_escape;

/// Converts one stream item into its SSE event.
pub fn item_to_event(item: &StreamItem) -> Event {
    let payload = match item {
        StreamItem::Token(text) => sse_escape(text),
        StreamItem::ToolStart(name) => sse_escape(&format!("\n🔧 tool: {name}...\n")),
        StreamItem::ToolEnd(_) => sse_escape("\n✅ tool done\n"),
        StreamItem::Terminated => sse_escape("\n\n⚠️ (reply terminated by user)"),
        StreamItem::Error(text) => sse_escape(&format!("\n❌ stream error: {text}\n")),
        StreamItem::Done => "[DONE]".to_string(),
    };
    Event::default().data(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(item: &StreamItem) -> String {
        // Event has no public accessor; rely on its Debug output carrying
        // the payload.
        format!("{:?}", item_to_event(item))
    }

    #[test]
    fn tokens_are_escaped() {
        let out = rendered(&StreamItem::Token("two\nlines".into()));
        assert!(out.contains("two\\\\nlines") || out.contains("two\\nlines"));
    }

    #[test]
    fn tool_marker_and_done_sentinel() {
        let out = rendered(&StreamItem::ToolStart("list_files".into()));
        assert!(out.contains("🔧 tool: list_files..."));
        let out = rendered(&StreamItem::Done);
        assert!(out.contains("[DONE]"));
    }
}
