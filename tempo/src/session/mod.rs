//! Session & task manager: per-`(user, session)` routing of streaming turns,
//! cancellation with thread repair, and session listing/history/deletion over
//! the checkpoint store.
//!
//! One rule keeps threads serialized: a new streaming request for a key
//! cancels the previous task and awaits its cleanup before starting. The
//! active-task map never holds a finished task — each worker removes its own
//! entry (guarded by a task id so it cannot evict a successor).

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AgentError;
use crate::graph::{CompiledStateGraph, RunnableConfig};
use crate::memory::{CheckpointError, SqliteCheckpointStore};
use crate::message::Message;
use crate::prompts::SYSTEM_TRIGGER_MARKER;
use crate::state::{thread_id, AgentState};
use crate::stream::AgentEvent;

/// Suffix appended to a partial reply cut off by the user.
pub const TERMINATED_SUFFIX: &str = "⚠️ (reply terminated by user)";
/// Content of a synthesized tool result for a call pending at cancellation.
pub const CANCELLED_TOOL_RESULT: &str = "tool call terminated by user";

/// Grace period awaited for a cancelled task's cleanup.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Items bridged from a streaming turn to the SSE generator.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Token(String),
    ToolStart(String),
    ToolEnd(String),
    /// The turn was cancelled; thread already repaired.
    Terminated,
    /// The turn failed; the text is user-visible.
    Error(String),
    /// Terminal marker; always the last item.
    Done,
}

/// One row of the session listing.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub title: String,
    pub last_message: String,
    pub message_count: usize,
}

struct ActiveTask {
    task_id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Routes turns into the agent graph and owns every in-flight streaming task.
pub struct SessionManager {
    graph: Arc<CompiledStateGraph<AgentState>>,
    store: Arc<SqliteCheckpointStore>,
    active: DashMap<String, ActiveTask>,
    /// thread id of a forum sub-agent session → posts already delivered.
    oasis_offsets: DashMap<String, usize>,
}

impl SessionManager {
    pub fn new(
        graph: Arc<CompiledStateGraph<AgentState>>,
        store: Arc<SqliteCheckpointStore>,
    ) -> Self {
        Self {
            graph,
            store,
            active: DashMap::new(),
            oasis_offsets: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<SqliteCheckpointStore> {
        &self.store
    }

    /// Runs one turn to completion and returns the final assistant text.
    pub async fn ask(&self, input: AgentState) -> Result<String, AgentError> {
        let tid = thread_id(&input.user_id, &input.session_id);
        let out = self
            .graph
            .invoke(input, &RunnableConfig::for_thread(tid))
            .await?;
        Ok(out.last_assistant_reply().unwrap_or_default().to_string())
    }

    /// Cancels the active task for `(user, session)` and awaits its cleanup
    /// with a bounded grace period. No-op when nothing is running.
    pub async fn cancel(&self, user_id: &str, session_id: &str) {
        let key = thread_id(user_id, session_id);
        let Some((_, task)) = self.active.remove(&key) else {
            return;
        };
        task.cancel.cancel();
        if tokio::time::timeout(CANCEL_GRACE, task.handle).await.is_err() {
            tracing::warn!(thread = %key, "cancelled task did not finish within grace period");
        }
    }

    /// Starts a streaming turn, cancelling any active one for the same key
    /// first. Items arrive on the returned receiver and always end with
    /// [`StreamItem::Done`].
    pub async fn spawn_stream(self: &Arc<Self>, input: AgentState) -> mpsc::Receiver<StreamItem> {
        let key = thread_id(&input.user_id, &input.session_id);
        self.cancel(&input.user_id, &input.session_id).await;

        let (item_tx, item_rx) = mpsc::channel::<StreamItem>(64);
        let token = CancellationToken::new();
        let task_id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);

        let manager = self.clone();
        let worker_token = token.clone();
        let worker_key = key.clone();
        let handle = tokio::spawn(async move {
            manager
                .stream_worker(input, worker_key.clone(), item_tx, worker_token)
                .await;
            manager
                .active
                .remove_if(&worker_key, |_, task| task.task_id == task_id);
        });

        self.active.insert(
            key,
            ActiveTask {
                task_id,
                cancel: token,
                handle,
            },
        );
        item_rx
    }

    async fn stream_worker(
        &self,
        input: AgentState,
        key: String,
        item_tx: mpsc::Sender<StreamItem>,
        token: CancellationToken,
    ) {
        let (event_tx, mut event_rx) = mpsc::channel::<AgentEvent>(64);
        let config = RunnableConfig::for_thread(key.clone());

        let mut collected = String::new();
        let forward = |ev: AgentEvent, collected: &mut String| match ev {
            AgentEvent::Token(t) => {
                collected.push_str(&t);
                StreamItem::Token(t)
            }
            AgentEvent::ToolStart { name } => StreamItem::ToolStart(name),
            AgentEvent::ToolEnd { name } => StreamItem::ToolEnd(name),
        };

        // The run future lives inside this block: leaving it — completion or
        // cancellation — drops any in-flight model call before cleanup.
        let outcome = {
            let run = self
                .graph
                .invoke_stream(input, &config, event_tx, token.clone());
            tokio::pin!(run);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break None,
                    res = &mut run => break Some(res),
                    ev = event_rx.recv() => {
                        if let Some(ev) = ev {
                            let _ = item_tx.send(forward(ev, &mut collected)).await;
                        }
                    }
                }
            }
        };
        // Flush events that raced the run's completion.
        while let Ok(ev) = event_rx.try_recv() {
            let _ = item_tx.send(forward(ev, &mut collected)).await;
        }

        match outcome {
            Some(Ok(_)) => {
                let _ = item_tx.send(StreamItem::Done).await;
            }
            None | Some(Err(AgentError::Cancelled)) => {
                // Dropping `run` above aborted the in-flight model call; now
                // restore the thread invariant before acknowledging.
                if let Err(e) = repair_after_cancel(&self.store, &key, &collected).await {
                    tracing::error!(thread = %key, "cancel repair failed: {e}");
                }
                let _ = item_tx.send(StreamItem::Terminated).await;
                let _ = item_tx.send(StreamItem::Done).await;
            }
            Some(Err(e)) => {
                tracing::error!(thread = %key, "streaming turn failed: {e}");
                let _ = item_tx.send(StreamItem::Error(e.to_string())).await;
                let _ = item_tx.send(StreamItem::Done).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Session listing / history / deletion
    // ------------------------------------------------------------------

    /// Summaries of the user's sessions. Threads whose user messages are all
    /// synthetic triggers are hidden.
    pub async fn list_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<SessionSummary>, CheckpointError> {
        let prefix = format!("{user_id}#");
        let mut sessions = Vec::new();
        for tid in self.store.list_threads(&prefix).await? {
            let session_id = tid[prefix.len()..].to_string();
            let Some(messages) = self.store.load_latest(&tid).await? else {
                continue;
            };
            let mut title = String::new();
            let mut last = String::new();
            let mut count = 0usize;
            for msg in &messages {
                let Message::User { content } = msg else {
                    continue;
                };
                let mut text = content.text();
                if text.is_empty() && content.is_multipart() {
                    text = "(image message)".to_string();
                }
                // Scheduler triggers are synthetic and hidden; forum
                // invitations stay visible so expert sessions appear in the
                // owner's listing.
                if text.starts_with(SYSTEM_TRIGGER_MARKER) {
                    continue;
                }
                count += 1;
                if title.is_empty() {
                    title = preview(&text);
                }
                last = preview(&text);
            }
            if title.is_empty() {
                continue; // empty or trigger-only thread
            }
            sessions.push(SessionSummary {
                session_id,
                title,
                last_message: last,
                message_count: count,
            });
        }
        Ok(sessions)
    }

    /// Full thread history filtered to user/assistant/tool messages, with
    /// multimodal user content preserved.
    pub async fn session_history(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<Message>, CheckpointError> {
        let tid = thread_id(user_id, session_id);
        let messages = self.store.load_latest(&tid).await?.unwrap_or_default();
        Ok(messages
            .into_iter()
            .filter(|m| !matches!(m, Message::System { .. }))
            .collect())
    }

    /// Deletes one session, or all of the user's sessions when `session_id`
    /// is `None`. Also cancels any running task and forgets forum offsets.
    pub async fn delete_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<(), CheckpointError> {
        match session_id {
            Some(sid) => {
                self.cancel(user_id, sid).await;
                let tid = thread_id(user_id, sid);
                self.store.delete(&tid).await?;
                self.oasis_offsets.remove(&tid);
            }
            None => {
                let prefix = format!("{user_id}#");
                let keys: Vec<String> = self
                    .active
                    .iter()
                    .map(|e| e.key().clone())
                    .filter(|k| k.starts_with(&prefix))
                    .collect();
                for key in keys {
                    if let Some(sid) = key.strip_prefix(&prefix) {
                        let sid = sid.to_string();
                        self.cancel(user_id, &sid).await;
                    }
                }
                self.store.delete_prefix(&prefix).await?;
                self.oasis_offsets.retain(|k, _| !k.starts_with(&prefix));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // OASIS bridge offsets
    // ------------------------------------------------------------------

    /// Posts already delivered into the given forum sub-agent thread; 0 for
    /// an unknown thread (full history resend).
    pub fn oasis_offset(&self, thread: &str) -> usize {
        self.oasis_offsets.get(thread).map(|e| *e).unwrap_or(0)
    }

    pub fn set_oasis_offset(&self, thread: &str, delivered: usize) {
        self.oasis_offsets.insert(thread.to_string(), delivered);
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// Restores the thread invariant after a cancelled turn: synthesizes one tool
/// result per pending call of the trailing assistant message, then appends
/// the buffered partial reply with the termination suffix.
pub async fn repair_after_cancel(
    store: &SqliteCheckpointStore,
    thread: &str,
    partial_text: &str,
) -> Result<(), CheckpointError> {
    let mut messages = store.load_latest(thread).await?.unwrap_or_default();

    let answered: HashSet<String> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Tool { call_id, .. } => Some(call_id.clone()),
            _ => None,
        })
        .collect();
    let pending: Vec<(String, String)> = messages
        .last()
        .map(|m| {
            m.tool_calls()
                .iter()
                .filter(|c| !answered.contains(&c.id))
                .map(|c| (c.id.clone(), c.name.clone()))
                .collect()
        })
        .unwrap_or_default();
    for (call_id, name) in pending {
        messages.push(Message::tool(call_id, name, CANCELLED_TOOL_RESULT));
    }

    if !partial_text.is_empty() {
        messages.push(Message::assistant(format!(
            "{partial_text}\n\n{TERMINATED_SUFFIX}"
        )));
    }

    store.save_messages(thread, &messages).await
}
