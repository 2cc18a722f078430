//! Graph compilation errors.

use thiserror::Error;

/// Raised by `StateGraph::compile` when the node/edge wiring is invalid.
#[derive(Debug, Error)]
pub enum CompilationError {
    #[error("edge references unknown node: {0}")]
    NodeNotFound(String),
    #[error("no edge from START")]
    MissingStart,
    #[error("no path to END")]
    MissingEnd,
    #[error("node {0} has both an edge and conditional edges")]
    NodeHasBothEdgeAndConditional(String),
    #[error("conditional path targets unknown node: {0}")]
    InvalidConditionalTarget(String),
}
