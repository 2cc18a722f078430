//! Executable graph: the node loop with checkpointing and cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::graph::node::{Node, RunContext};
use crate::graph::state_graph::END;
use crate::memory::Checkpointer;
use crate::stream::AgentEvent;

/// Routing function of a conditional edge: `(state) -> next node id`.
pub type RouterFn<S> = Arc<dyn Fn(&S) -> String + Send + Sync>;

/// Outgoing wiring of one node.
pub enum NextEntry<S> {
    Unconditional(String),
    Conditional(RouterFn<S>),
}

/// Per-run configuration. With a `thread_id` and a compiled-in checkpointer,
/// state is loaded before the run and saved after every node step, so a
/// cancelled run leaves the latest completed step on disk.
#[derive(Debug, Clone, Default)]
pub struct RunnableConfig {
    pub thread_id: Option<String>,
}

impl RunnableConfig {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
        }
    }
}

impl<S> std::fmt::Debug for CompiledStateGraph<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledStateGraph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("first_node_id", &self.first_node_id)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

/// Immutable, executable state graph produced by `StateGraph::compile`.
pub struct CompiledStateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    first_node_id: String,
    next_map: HashMap<String, NextEntry<S>>,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    merger: Option<Arc<dyn Fn(S, S) -> S + Send + Sync>>,
    /// Hard ceiling on node steps per run; a runaway model/tool loop fails
    /// instead of spinning forever.
    max_steps: usize,
}

impl<S> CompiledStateGraph<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        nodes: HashMap<String, Arc<dyn Node<S>>>,
        first_node_id: String,
        next_map: HashMap<String, NextEntry<S>>,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
        merger: Option<Arc<dyn Fn(S, S) -> S + Send + Sync>>,
    ) -> Self {
        Self {
            nodes,
            first_node_id,
            next_map,
            checkpointer,
            merger,
            max_steps: 64,
        }
    }

    /// Runs the graph to END without streaming.
    pub async fn invoke(&self, input: S, config: &RunnableConfig) -> Result<S, AgentError> {
        self.run(input, config, RunContext::detached()).await
    }

    /// Runs the graph to END, emitting [`AgentEvent`]s through `events` and
    /// honouring `cancel` between node steps. The in-flight node is dropped
    /// when the caller drops the returned future; checking the token here
    /// keeps a non-dropped caller prompt as well.
    pub async fn invoke_stream(
        &self,
        input: S,
        config: &RunnableConfig,
        events: mpsc::Sender<AgentEvent>,
        cancel: CancellationToken,
    ) -> Result<S, AgentError> {
        self.run(input, config, RunContext::new(Some(events), cancel))
            .await
    }

    async fn run(&self, input: S, config: &RunnableConfig, ctx: RunContext) -> Result<S, AgentError> {
        let mut state = self.load_and_merge(input, config).await?;
        self.save(config, &state).await?;

        let mut current = self.first_node_id.clone();
        for _ in 0..self.max_steps {
            if ctx.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| AgentError::Graph(format!("unknown node: {current}")))?;
            state = node.run(state, &ctx).await?;
            self.save(config, &state).await?;

            current = match self.next_map.get(&current) {
                Some(NextEntry::Unconditional(to)) => to.clone(),
                Some(NextEntry::Conditional(router)) => {
                    let to = router(&state);
                    if to != END && !self.nodes.contains_key(&to) {
                        return Err(AgentError::Graph(format!("router returned unknown node: {to}")));
                    }
                    to
                }
                None => END.to_string(),
            };
            if current == END {
                return Ok(state);
            }
        }
        Err(AgentError::Graph(format!(
            "run exceeded {} steps without reaching END",
            self.max_steps
        )))
    }

    async fn load_and_merge(&self, input: S, config: &RunnableConfig) -> Result<S, AgentError> {
        let (Some(cp), Some(tid)) = (&self.checkpointer, &config.thread_id) else {
            return Ok(input);
        };
        let loaded = cp.load(tid).await?;
        Ok(match (loaded, &self.merger) {
            (Some(saved), Some(merge)) => merge(saved, input),
            // Without a merger the input replaces the saved state.
            _ => input,
        })
    }

    async fn save(&self, config: &RunnableConfig, state: &S) -> Result<(), AgentError> {
        if let (Some(cp), Some(tid)) = (&self.checkpointer, &config.thread_id) {
            cp.save(tid, state).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::graph::{StateGraph, START};
    use crate::memory::CheckpointError;

    #[derive(Clone, Debug, Default)]
    struct Log(Vec<String>);

    struct Append(&'static str);

    #[async_trait]
    impl Node<Log> for Append {
        fn id(&self) -> &str {
            self.0
        }
        async fn run(&self, mut state: Log, _ctx: &RunContext) -> Result<Log, AgentError> {
            state.0.push(self.0.to_string());
            Ok(state)
        }
    }

    struct MemorySaver {
        saved: Mutex<HashMap<String, Log>>,
    }

    #[async_trait]
    impl Checkpointer<Log> for MemorySaver {
        async fn load(&self, thread_id: &str) -> Result<Option<Log>, CheckpointError> {
            Ok(self.saved.lock().unwrap().get(thread_id).cloned())
        }
        async fn save(&self, thread_id: &str, state: &Log) -> Result<(), CheckpointError> {
            self.saved
                .lock()
                .unwrap()
                .insert(thread_id.to_string(), state.clone());
            Ok(())
        }
    }

    fn one_node_graph(saver: Arc<MemorySaver>) -> CompiledStateGraph<Log> {
        let mut graph = StateGraph::<Log>::new().with_state_merger(|mut saved: Log, input: Log| {
            saved.0.extend(input.0);
            saved
        });
        graph.add_node("step", Arc::new(Append("step")));
        graph.add_edge(START, "step");
        graph.add_edge("step", END);
        graph.compile_with_checkpointer(saver).unwrap()
    }

    /// **Scenario**: a second run on the same thread resumes from the saved
    /// state, merged with the new input.
    #[tokio::test]
    async fn checkpointed_runs_accumulate_state() {
        let saver = Arc::new(MemorySaver {
            saved: Mutex::new(HashMap::new()),
        });
        let graph = one_node_graph(saver.clone());
        let cfg = RunnableConfig::for_thread("u#s");

        let out1 = graph.invoke(Log(vec!["in1".into()]), &cfg).await.unwrap();
        assert_eq!(out1.0, vec!["in1", "step"]);

        let out2 = graph.invoke(Log(vec!["in2".into()]), &cfg).await.unwrap();
        assert_eq!(out2.0, vec!["in1", "step", "in2", "step"]);
    }

    /// **Scenario**: runs on different threads never see each other's state.
    #[tokio::test]
    async fn threads_are_isolated() {
        let saver = Arc::new(MemorySaver {
            saved: Mutex::new(HashMap::new()),
        });
        let graph = one_node_graph(saver);
        let a = graph
            .invoke(Log(vec!["a".into()]), &RunnableConfig::for_thread("u#a"))
            .await
            .unwrap();
        let b = graph
            .invoke(Log(vec!["b".into()]), &RunnableConfig::for_thread("u#b"))
            .await
            .unwrap();
        assert_eq!(a.0, vec!["a", "step"]);
        assert_eq!(b.0, vec!["b", "step"]);
    }

    /// **Scenario**: a pre-cancelled token stops the run before the first node.
    #[tokio::test]
    async fn cancelled_token_aborts_run() {
        let saver = Arc::new(MemorySaver {
            saved: Mutex::new(HashMap::new()),
        });
        let graph = one_node_graph(saver);
        let token = CancellationToken::new();
        token.cancel();
        let (tx, _rx) = mpsc::channel(4);
        let err = graph
            .invoke_stream(Log::default(), &RunnableConfig::default(), tx, token)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
