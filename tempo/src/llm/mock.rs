//! Scripted LLM for tests: pops one canned response per call and records
//! the requests it saw.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::llm::{CompletionRequest, LlmClient, LlmResponse};
use crate::message::ToolCall;

/// Deterministic `LlmClient`: replies in order from a script, then repeats
/// the last entry. Requests are captured for assertions.
pub struct MockLlm {
    script: Mutex<Vec<ScriptEntry>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

#[derive(Clone)]
struct ScriptEntry {
    content: String,
    tool_calls: Vec<ToolCall>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, content: impl Into<String>) -> Self {
        self.push(content.into(), Vec::new());
        self
    }

    pub fn reply_with_calls(self, content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        self.push(content.into(), tool_calls);
        self
    }

    fn push(&self, content: String, tool_calls: Vec<ToolCall>) {
        self.script
            .lock()
            .unwrap()
            .push(ScriptEntry { content, tool_calls });
    }

    /// Requests seen so far, in call order.
    pub fn seen_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<LlmResponse, AgentError> {
        let call_index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        let script = self.script.lock().unwrap();
        let entry = script
            .get(call_index)
            .or_else(|| script.last())
            .cloned()
            .unwrap_or(ScriptEntry {
                content: "(mock: empty script)".to_string(),
                tool_calls: Vec::new(),
            });
        Ok(LlmResponse {
            content: entry.content,
            tool_calls: entry.tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn replies_in_order_then_repeats_last() {
        let llm = MockLlm::new().reply("one").reply("two");
        let req = || CompletionRequest::new(vec![Message::user("x")]);
        assert_eq!(llm.complete(req()).await.unwrap().content, "one");
        assert_eq!(llm.complete(req()).await.unwrap().content, "two");
        assert_eq!(llm.complete(req()).await.unwrap().content, "two");
        assert_eq!(llm.call_count(), 3);
    }
}
