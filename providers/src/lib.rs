//! Tool-provider subprocess library: one tool group served over stdio.
//!
//! The agent launches `tool-provider <group>` per group and speaks the
//! line-framed JSON-RPC dialect from `provider-protocol`. Groups answer
//! `list_tools` with their descriptors and `call_tool` with readable text —
//! including readable failure text, so a broken backend degrades into a
//! message the model can act on instead of a dead turn.

pub mod groups;
pub mod serve;

pub use groups::{group_by_name, ToolGroup};
pub use serve::serve_stdio;
