//! OASIS forum: a standalone service where expert personas debate
//! user-submitted questions across rounds, vote on one another's posts, and
//! converge on a summarized conclusion.
//!
//! - [`board`]: the thread-safe per-topic discussion board.
//! - [`roster`]: built-in and per-user expert personas.
//! - [`schedule`]: declarative speaking-order plans (YAML).
//! - [`experts`]: the participation contract and the two backends (direct
//!   LLM calls and agent-backed sub-agent sessions).
//! - [`engine`]: round orchestration, consensus, summarization.
//! - [`server`]: the axum HTTP/SSE surface.

pub mod board;
pub mod engine;
pub mod experts;
pub mod models;
pub mod roster;
pub mod schedule;
pub mod server;

pub use board::{ForumBoard, Post, VoteDirection};
pub use engine::DiscussionEngine;
pub use experts::{BotSessionBackend, DirectLlmBackend, ExpertBackend};
pub use models::{CreateTopicRequest, DiscussionStatus, TopicDetail, TopicSummary};
pub use roster::{ExpertConfig, ExpertInfo, Roster, RosterError};
pub use schedule::{parse_schedule, Schedule, ScheduleParseError, Step};
pub use server::{router, ForumState};
