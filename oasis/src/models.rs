//! Wire DTOs of the forum service.

use serde::{Deserialize, Serialize};

/// Lifecycle of one discussion topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionStatus {
    Pending,
    Discussing,
    Concluded,
    Error,
}

impl DiscussionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Concluded | Self::Error)
    }
}

/// Body of `POST /topics`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTopicRequest {
    pub question: String,
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default = "default_rounds")]
    pub max_rounds: u32,
    /// Empty = every expert visible to the owner participates.
    #[serde(default)]
    pub expert_tags: Vec<String>,
    #[serde(default)]
    pub schedule_yaml: Option<String>,
    #[serde(default)]
    pub schedule_file: Option<String>,
    /// When true, experts are backed by stateful agent sessions with tools.
    #[serde(default)]
    pub use_bot_session: bool,
    #[serde(default)]
    pub bot_enabled_tools: Option<Vec<String>>,
}

fn default_user() -> String {
    "anonymous".to_string()
}

fn default_rounds() -> u32 {
    5
}

/// One post in a topic detail.
#[derive(Debug, Clone, Serialize)]
pub struct PostInfo {
    pub id: u64,
    pub author: String,
    pub content: String,
    pub reply_to: Option<u64>,
    pub upvotes: u32,
    pub downvotes: u32,
    pub timestamp: f64,
}

/// `GET /topics/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct TopicDetail {
    pub topic_id: String,
    pub question: String,
    pub status: DiscussionStatus,
    pub current_round: u32,
    pub max_rounds: u32,
    pub posts: Vec<PostInfo>,
    pub conclusion: Option<String>,
}

/// One row of `GET /topics`.
#[derive(Debug, Clone, Serialize)]
pub struct TopicSummary {
    pub topic_id: String,
    pub question: String,
    pub status: DiscussionStatus,
    pub post_count: usize,
    pub current_round: u32,
    pub max_rounds: u32,
    pub created_at: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_topic_defaults() {
        let req: CreateTopicRequest =
            serde_json::from_str(r#"{"question": "should we launch?"}"#).unwrap();
        assert_eq!(req.user_id, "anonymous");
        assert_eq!(req.max_rounds, 5);
        assert!(req.expert_tags.is_empty());
        assert!(!req.use_bot_session);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&DiscussionStatus::Concluded).unwrap(),
            "\"concluded\""
        );
        assert!(DiscussionStatus::Error.is_terminal());
        assert!(!DiscussionStatus::Discussing.is_terminal());
    }
}
