//! Node trait and per-run context.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::stream::AgentEvent;

/// Run-scoped context handed to every node: the streaming event sender (when
/// the caller asked for streaming) and the cancellation token for the run.
#[derive(Clone)]
pub struct RunContext {
    pub events: Option<mpsc::Sender<AgentEvent>>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(events: Option<mpsc::Sender<AgentEvent>>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Context with no streaming and a token nobody cancels. For tests and
    /// fire-and-forget invocations.
    pub fn detached() -> Self {
        Self {
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sends an event when streaming is on; a dropped receiver is ignored.
    pub async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

/// A unit of work in the graph: state in, state out.
#[async_trait]
pub trait Node<S>: Send + Sync {
    fn id(&self) -> &str;

    async fn run(&self, state: S, ctx: &RunContext) -> Result<S, AgentError>;
}
