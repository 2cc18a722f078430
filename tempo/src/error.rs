//! Agent execution error types.

use thiserror::Error;

use crate::memory::CheckpointError;

/// Error from one graph run or one of its nodes.
///
/// Vendor/LLM failures and tool failures that should stay user-visible are
/// converted into messages by the nodes themselves (spec'd soft-failure
/// behaviour); what surfaces here is the hard-failure remainder.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Model call failed after the gateway's own retries.
    #[error("model call failed: {0}")]
    Model(String),

    /// Tool dispatch failed at the transport level (a provider result that
    /// carries an error is a normal tool message, not this).
    #[error("tool invocation failed: {0}")]
    Tool(String),

    /// Checkpoint load/save failed.
    #[error("checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Graph-level misuse: unknown node id from a router, exhausted step budget.
    #[error("graph: {0}")]
    Graph(String),

    /// The run was cancelled by its caller.
    #[error("run cancelled")]
    Cancelled,
}
