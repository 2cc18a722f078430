//! Tempo core: a multi-user, tool-augmented conversational agent runtime.
//!
//! The pieces compose bottom-up:
//!
//! - [`message`]: the thread data model (user / assistant / tool / system,
//!   multimodal content parts).
//! - [`graph`]: a small state-graph executor — nodes, edges, conditional
//!   routing, per-step checkpointing, cancellation.
//! - [`llm`]: the model gateway behind one `LlmClient` trait.
//! - [`memory`]: the durable checkpoint store (SQLite).
//! - [`tools`]: tool-provider subprocesses, the flat registry, and the
//!   enabled-set-aware invoker.
//! - [`agent`]: the platform graph (model node ⇄ tool node) over all of the
//!   above.
//! - [`session`]: per-`(user, session)` task routing, streaming, cancel with
//!   repair, session listing.
//!
//! The HTTP surfaces live in the sibling crates `serve` (agent ingress),
//! `oasis` (forum), and `scheduler` (cron triggers).

pub mod agent;
pub mod error;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod message;
pub mod prompts;
pub mod session;
pub mod state;
pub mod stream;
pub mod tools;

pub use agent::{build_agent_graph, RuntimeContext};
pub use error::AgentError;
pub use graph::{CompiledStateGraph, RunnableConfig, StateGraph, END, START};
pub use llm::{ChatOpenAI, CompletionRequest, LlmClient, LlmResponse, MockLlm};
pub use memory::{CheckpointError, Checkpointer, SqliteCheckpointStore};
pub use message::{FileKind, Message, MessageContent, Part, ToolCall};
pub use prompts::{PromptSet, OASIS_TRIGGER_MARKER, SYSTEM_TRIGGER_MARKER};
pub use session::{SessionManager, SessionSummary, StreamItem};
pub use state::{thread_id, AgentState, TriggerSource};
pub use stream::{sse_escape, sse_unescape, AgentEvent, MessageChunk};
pub use tools::{ProviderConfig, ToolRegistry, ToolSpec};
