//! State graph: nodes + explicit edges (from → to) and optional conditional edges.
//!
//! Add nodes with `add_node`, define the chain with `add_edge(from, to)` using
//! `START` and `END` for graph entry/exit, route with `add_conditional_edges`,
//! then `compile` (or `compile_with_checkpointer`) into a
//! [`CompiledStateGraph`] that can be invoked per thread.

mod compile_error;
mod compiled;
mod node;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::{CompiledStateGraph, RunnableConfig};
pub use node::{Node, RunContext};
pub use state_graph::{StateGraph, END, START};
