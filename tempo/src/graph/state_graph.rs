//! Graph builder: nodes, edges, conditional routing, compile-time validation.
//!
//! A node has either one outgoing `add_edge` or `add_conditional_edges`, not
//! both. Conditional routing calls `(state) -> node id` after the source node
//! runs; the returned id must be a registered node or [`END`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::graph::compile_error::CompilationError;
use crate::graph::compiled::{CompiledStateGraph, NextEntry, RouterFn};
use crate::graph::node::Node;
use crate::memory::Checkpointer;

/// Sentinel for graph entry: use as `from_id` in `add_edge(START, first)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as the routed/edge target to finish a run.
pub const END: &str = "__end__";

/// State graph under construction. Generic over the state type `S`.
pub struct StateGraph<S> {
    nodes: HashMap<String, Arc<dyn Node<S>>>,
    edges: Vec<(String, String)>,
    conditional_edges: HashMap<String, RouterFn<S>>,
    /// Merges the previously checkpointed state with the new input when a
    /// thread resumes. Defaults to replacing with the input.
    merger: Option<Arc<dyn Fn(S, S) -> S + Send + Sync>>,
}

impl<S> Default for StateGraph<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> StateGraph<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            conditional_edges: HashMap::new(),
            merger: None,
        }
    }

    /// Sets how a loaded checkpoint and the run input combine into the
    /// starting state (e.g. append the input's messages to the history).
    pub fn with_state_merger(
        mut self,
        merger: impl Fn(S, S) -> S + Send + Sync + 'static,
    ) -> Self {
        self.merger = Some(Arc::new(merger));
        self
    }

    /// Adds a node; same id replaces.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node<S>>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Adds an unconditional edge. Use `START` / `END` for entry and exit.
    pub fn add_edge(&mut self, from_id: impl Into<String>, to_id: impl Into<String>) -> &mut Self {
        self.edges.push((from_id.into(), to_id.into()));
        self
    }

    /// Adds conditional edges from `source`: after it runs, `router(state)`
    /// names the next node (or `END`).
    pub fn add_conditional_edges(
        &mut self,
        source: impl Into<String>,
        router: RouterFn<S>,
    ) -> &mut Self {
        self.conditional_edges.insert(source.into(), router);
        self
    }

    /// Validates the wiring and produces an executable graph.
    pub fn compile(self) -> Result<CompiledStateGraph<S>, CompilationError> {
        self.compile_internal(None)
    }

    /// Like [`compile`](Self::compile), with checkpoint persistence: when a
    /// run has a `thread_id`, state is loaded before and saved after every
    /// node step.
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn Checkpointer<S>>,
    ) -> Result<CompiledStateGraph<S>, CompilationError> {
        self.compile_internal(Some(checkpointer))
    }

    fn compile_internal(
        self,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    ) -> Result<CompiledStateGraph<S>, CompilationError> {
        for (from, to) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
        }
        for source in self.conditional_edges.keys() {
            if !self.nodes.contains_key(source) {
                return Err(CompilationError::NodeNotFound(source.clone()));
            }
        }

        let start_edges: Vec<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f == START)
            .map(|(_, t)| t.clone())
            .collect();
        let first = start_edges
            .into_iter()
            .next()
            .ok_or(CompilationError::MissingStart)?;

        let reaches_end = self.edges.iter().any(|(_, t)| t == END)
            || !self.conditional_edges.is_empty();
        if !reaches_end {
            return Err(CompilationError::MissingEnd);
        }

        let edge_froms: HashSet<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f != START)
            .map(|(f, _)| f.clone())
            .collect();
        for source in self.conditional_edges.keys() {
            if edge_froms.contains(source) {
                return Err(CompilationError::NodeHasBothEdgeAndConditional(
                    source.clone(),
                ));
            }
        }

        let mut next_map: HashMap<String, NextEntry<S>> = self
            .edges
            .iter()
            .filter(|(f, _)| f != START)
            .map(|(f, t)| (f.clone(), NextEntry::Unconditional(t.clone())))
            .collect();
        for (source, router) in self.conditional_edges {
            next_map.insert(source, NextEntry::Conditional(router));
        }

        Ok(CompiledStateGraph::new(
            self.nodes,
            first,
            next_map,
            checkpointer,
            self.merger,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::AgentError;
    use crate::graph::node::RunContext;

    #[derive(Clone, Debug, Default)]
    struct Count(u32);

    struct Inc(&'static str);

    #[async_trait]
    impl Node<Count> for Inc {
        fn id(&self) -> &str {
            self.0
        }
        async fn run(&self, state: Count, _ctx: &RunContext) -> Result<Count, AgentError> {
            Ok(Count(state.0 + 1))
        }
    }

    /// **Scenario**: compile fails when an edge names a missing node.
    #[test]
    fn compile_rejects_unknown_edge_target() {
        let mut graph = StateGraph::<Count>::new();
        graph.add_node("a", Arc::new(Inc("a")));
        graph.add_edge(START, "a");
        graph.add_edge("a", "ghost");
        match graph.compile() {
            Err(CompilationError::NodeNotFound(id)) => assert_eq!(id, "ghost"),
            other => panic!("expected NodeNotFound, got {other:?}"),
        }
    }

    /// **Scenario**: a node may not have both an edge and conditional edges.
    #[test]
    fn compile_rejects_double_wiring() {
        let mut graph = StateGraph::<Count>::new();
        graph.add_node("a", Arc::new(Inc("a")));
        graph.add_edge(START, "a");
        graph.add_edge("a", END);
        graph.add_conditional_edges("a", Arc::new(|_s: &Count| END.to_string()));
        match graph.compile() {
            Err(CompilationError::NodeHasBothEdgeAndConditional(id)) => assert_eq!(id, "a"),
            other => panic!("expected NodeHasBothEdgeAndConditional, got {other:?}"),
        }
    }

    /// **Scenario**: a graph with no edge from START does not compile.
    #[test]
    fn compile_requires_start_edge() {
        let mut graph = StateGraph::<Count>::new();
        graph.add_node("a", Arc::new(Inc("a")));
        graph.add_edge("a", END);
        assert!(matches!(graph.compile(), Err(CompilationError::MissingStart)));
    }

    #[tokio::test]
    async fn linear_chain_runs_to_end() {
        let mut graph = StateGraph::<Count>::new();
        graph.add_node("a", Arc::new(Inc("a")));
        graph.add_node("b", Arc::new(Inc("b")));
        graph.add_edge(START, "a");
        graph.add_edge("a", "b");
        graph.add_edge("b", END);
        let compiled = graph.compile().unwrap();
        let out = compiled
            .invoke(Count(0), &crate::graph::RunnableConfig::default())
            .await
            .unwrap();
        assert_eq!(out.0, 2);
    }

    #[tokio::test]
    async fn conditional_route_loops_until_done() {
        let mut graph = StateGraph::<Count>::new();
        graph.add_node("a", Arc::new(Inc("a")));
        graph.add_edge(START, "a");
        graph.add_conditional_edges(
            "a",
            Arc::new(|s: &Count| {
                if s.0 < 3 {
                    "a".to_string()
                } else {
                    END.to_string()
                }
            }),
        );
        let compiled = graph.compile().unwrap();
        let out = compiled
            .invoke(Count(0), &crate::graph::RunnableConfig::default())
            .await
            .unwrap();
        assert_eq!(out.0, 3);
    }
}
