//! Thread-safe discussion board for a single topic.
//!
//! All experts read and write through one instance concurrently; every
//! mutation and every snapshot goes through the single internal mutex.
//! Topics are not hot enough to need anything finer.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use crate::models::{DiscussionStatus, PostInfo, TopicDetail, TopicSummary};

/// Direction of one vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// A single post in the discussion.
#[derive(Debug, Clone)]
pub struct Post {
    pub id: u64,
    pub author: String,
    pub content: String,
    pub reply_to: Option<u64>,
    pub upvotes: u32,
    pub downvotes: u32,
    pub timestamp: f64,
    /// voter name → direction; an author never appears for their own post.
    pub voters: HashMap<String, VoteDirection>,
}

struct BoardState {
    status: DiscussionStatus,
    current_round: u32,
    max_rounds: u32,
    posts: Vec<Post>,
    conclusion: Option<String>,
    counter: u64,
}

/// One topic's shared board.
pub struct ForumBoard {
    pub topic_id: String,
    pub question: String,
    pub owner: String,
    pub created_at: f64,
    state: Mutex<BoardState>,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl ForumBoard {
    pub fn new(
        topic_id: impl Into<String>,
        question: impl Into<String>,
        owner: impl Into<String>,
        max_rounds: u32,
    ) -> Self {
        Self {
            topic_id: topic_id.into(),
            question: question.into(),
            owner: owner.into(),
            created_at: now_secs(),
            state: Mutex::new(BoardState {
                status: DiscussionStatus::Pending,
                current_round: 0,
                max_rounds,
                posts: Vec::new(),
                conclusion: None,
                counter: 0,
            }),
        }
    }

    /// Publishes a new post; ids are monotone from 1 within the topic.
    pub async fn publish(
        &self,
        author: &str,
        content: &str,
        reply_to: Option<u64>,
    ) -> Post {
        let mut state = self.state.lock().await;
        state.counter += 1;
        let post = Post {
            id: state.counter,
            author: author.to_string(),
            content: content.to_string(),
            reply_to,
            upvotes: 0,
            downvotes: 0,
            timestamp: now_secs(),
            voters: HashMap::new(),
        };
        state.posts.push(post.clone());
        post
    }

    /// Casts a vote. No-op when the voter is the author, has already voted
    /// on this post, or the post does not exist.
    pub async fn vote(&self, voter: &str, post_id: u64, direction: VoteDirection) {
        let mut state = self.state.lock().await;
        let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) else {
            return;
        };
        if post.author == voter || post.voters.contains_key(voter) {
            return;
        }
        post.voters.insert(voter.to_string(), direction);
        match direction {
            VoteDirection::Up => post.upvotes += 1,
            VoteDirection::Down => post.downvotes += 1,
        }
    }

    /// Point-in-time snapshot of the posts, optionally without the viewer's
    /// own.
    pub async fn browse(&self, viewer: Option<&str>, exclude_self: bool) -> Vec<Post> {
        let state = self.state.lock().await;
        match (viewer, exclude_self) {
            (Some(name), true) => state
                .posts
                .iter()
                .filter(|p| p.author != name)
                .cloned()
                .collect(),
            _ => state.posts.clone(),
        }
    }

    /// Top `n` posts by net upvotes, ties broken by ascending id.
    pub async fn top_k(&self, n: usize) -> Vec<Post> {
        let state = self.state.lock().await;
        let mut posts = state.posts.clone();
        posts.sort_by(|a, b| {
            let net_a = a.upvotes as i64 - a.downvotes as i64;
            let net_b = b.upvotes as i64 - b.downvotes as i64;
            net_b.cmp(&net_a).then(a.id.cmp(&b.id))
        });
        posts.truncate(n);
        posts
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.posts.len()
    }

    pub async fn status(&self) -> DiscussionStatus {
        self.state.lock().await.status
    }

    pub async fn set_status(&self, status: DiscussionStatus) {
        self.state.lock().await.status = status;
    }

    pub async fn current_round(&self) -> u32 {
        self.state.lock().await.current_round
    }

    pub async fn set_current_round(&self, round: u32) {
        self.state.lock().await.current_round = round;
    }

    pub async fn max_rounds(&self) -> u32 {
        self.state.lock().await.max_rounds
    }

    /// Once-mode schedules override the round total for display.
    pub async fn set_max_rounds(&self, max_rounds: u32) {
        self.state.lock().await.max_rounds = max_rounds;
    }

    pub async fn conclusion(&self) -> Option<String> {
        self.state.lock().await.conclusion.clone()
    }

    pub async fn set_conclusion(&self, conclusion: impl Into<String>) {
        self.state.lock().await.conclusion = Some(conclusion.into());
    }

    pub async fn detail(&self) -> TopicDetail {
        let state = self.state.lock().await;
        TopicDetail {
            topic_id: self.topic_id.clone(),
            question: self.question.clone(),
            status: state.status,
            current_round: state.current_round,
            max_rounds: state.max_rounds,
            posts: state.posts.iter().map(post_info).collect(),
            conclusion: state.conclusion.clone(),
        }
    }

    pub async fn summary(&self) -> TopicSummary {
        let state = self.state.lock().await;
        TopicSummary {
            topic_id: self.topic_id.clone(),
            question: self.question.clone(),
            status: state.status,
            post_count: state.posts.len(),
            current_round: state.current_round,
            max_rounds: state.max_rounds,
            created_at: self.created_at,
        }
    }
}

fn post_info(p: &Post) -> PostInfo {
    PostInfo {
        id: p.id,
        author: p.author.clone(),
        content: p.content.clone(),
        reply_to: p.reply_to,
        upvotes: p.upvotes,
        downvotes: p.downvotes,
        timestamp: p.timestamp,
    }
}
