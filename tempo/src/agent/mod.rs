//! The platform's agent graph: a model node and a tool node alternating
//! until the model emits a final message or calls an external tool.
//!
//! ```text
//!       ┌─────────┐   no tool calls, or any external call   ┌─────┐
//! START → │  model  │ ───────────────────────────────────► │ END │
//!       │         │ ◄──────────────┐
//!       └────┬────┘                │
//!            │ internal tool calls │
//!            ▼                     │
//!       ┌─────────┐                │
//!       │  tools  │ ───────────────┘
//!       └─────────┘
//! ```

mod model_node;
mod sanitize;
mod tool_node;
mod user_files;

pub use model_node::ModelNode;
pub use sanitize::sanitize_messages;
pub use tool_node::ToolNode;
pub use user_files::{load_profile, load_skills_block};

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::graph::{CompiledStateGraph, CompilationError, StateGraph, END, START};
use crate::llm::LlmClient;
use crate::memory::SqliteCheckpointStore;
use crate::prompts::PromptSet;
use crate::state::AgentState;
use crate::tools::ToolRegistry;

/// Immutable per-process context: gateway, registry, prompts, data layout,
/// model knobs, and the per-user enabled-set cache that keeps the system
/// prompt prefix stable across turns.
pub struct RuntimeContext {
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub prompts: Arc<PromptSet>,
    pub dirs: config::DataDirs,
    pub temperature: f32,
    pub max_tokens: u32,
    /// user id → enabled set used on that user's previous turn.
    pub(crate) last_tool_state: DashMap<String, BTreeSet<String>>,
}

impl RuntimeContext {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        prompts: Arc<PromptSet>,
        dirs: config::DataDirs,
    ) -> Self {
        Self {
            llm,
            registry,
            prompts,
            dirs,
            temperature: 0.7,
            max_tokens: 2048,
            last_tool_state: DashMap::new(),
        }
    }
}

/// Routes after the model node: END on a final message or any external call,
/// the tool node otherwise.
fn route_after_model(state: &AgentState, registry: &ToolRegistry) -> String {
    let Some(last) = state.messages.last() else {
        return END.to_string();
    };
    let calls = last.tool_calls();
    if calls.is_empty() {
        return END.to_string();
    }
    for call in calls {
        if !registry.contains(&call.name) {
            tracing::info!(tool = %call.name, "external tool call; returning to caller");
            return END.to_string();
        }
    }
    "tools".to_string()
}

/// Builds the compiled agent graph over the given checkpoint store. New
/// input messages are appended to the thread history on resume.
pub fn build_agent_graph(
    ctx: Arc<RuntimeContext>,
    store: Arc<SqliteCheckpointStore>,
) -> Result<CompiledStateGraph<AgentState>, CompilationError> {
    let mut graph = StateGraph::new().with_state_merger(|saved: AgentState, mut input: AgentState| {
        let mut messages = saved.messages;
        messages.append(&mut input.messages);
        AgentState { messages, ..input }
    });
    graph.add_node("model", Arc::new(ModelNode::new(ctx.clone())));
    graph.add_node("tools", Arc::new(ToolNode::new(ctx.clone(), store.clone())));
    graph.add_edge(START, "model");
    let registry = ctx.registry.clone();
    graph.add_conditional_edges(
        "model",
        Arc::new(move |state: &AgentState| route_after_model(state, &registry)),
    );
    graph.add_edge("tools", "model");
    graph.compile_with_checkpointer(store)
}
