//! Checkpoint persistence: per-thread snapshots of the message list.

mod checkpointer;
mod sqlite_store;

pub use checkpointer::{CheckpointError, Checkpointer};
pub use sqlite_store::SqliteCheckpointStore;
