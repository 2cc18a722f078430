//! Checkpointer trait and CheckpointError.

use async_trait::async_trait;

/// Error type for checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("storage: {0}")]
    Storage(String),
}

/// Saves and loads run state by thread id.
///
/// **Interaction**: injected at `StateGraph::compile_with_checkpointer`;
/// the executor loads before a run and saves after every node step.
#[async_trait]
pub trait Checkpointer<S>: Send + Sync
where
    S: Clone + Send + Sync + 'static,
{
    async fn load(&self, thread_id: &str) -> Result<Option<S>, CheckpointError>;

    async fn save(&self, thread_id: &str, state: &S) -> Result<(), CheckpointError>;
}
