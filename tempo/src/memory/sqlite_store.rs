//! SQLite-backed checkpoint store. Persistent across process restarts.
//!
//! Two tables keyed by `thread_id` (string `user#session`):
//! `checkpoints` holds append-only snapshots of the whole message list with a
//! per-thread sequence number; `writes` holds intra-turn message appends,
//! folded onto the snapshot by every load and cleared by the next snapshot
//! save. Uses `spawn_blocking` for async, one connection per operation.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;

use crate::memory::checkpointer::{CheckpointError, Checkpointer};
use crate::message::Message;
use crate::state::AgentState;

/// Append-only snapshot store of `(thread_id, message list)`.
pub struct SqliteCheckpointStore {
    db_path: std::path::PathBuf,
}

impl SqliteCheckpointStore {
    /// Opens (and creates) the database and both tables.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            }
        }
        let conn = open(&db_path)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                snapshot TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (thread_id, seq)
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS writes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(Self { db_path })
    }

    /// Appends a new snapshot (next sequence number) and clears the thread's
    /// pending writes in the same transaction.
    pub async fn save_messages(
        &self,
        thread_id: &str,
        messages: &[Message],
    ) -> Result<(), CheckpointError> {
        let thread_id = thread_id.to_string();
        let snapshot = serde_json::to_string(messages)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open(&db_path)?;
            let tx = conn
                .transaction()
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let next_seq: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM checkpoints WHERE thread_id = ?1",
                    params![thread_id],
                    |row| row.get(0),
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO checkpoints (thread_id, seq, snapshot, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![thread_id, next_seq, snapshot, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            tx.execute(
                "DELETE FROM writes WHERE thread_id = ?1",
                params![thread_id],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            tx.commit()
                .map_err(|e| CheckpointError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    /// Latest state of a thread: the newest snapshot plus any pending
    /// `writes` rows folded onto it. The fold is what makes the writes
    /// table real durability — a turn that stopped between a tool result
    /// and its snapshot resumes with the result present. `None` for an
    /// unknown thread.
    pub async fn load_latest(
        &self,
        thread_id: &str,
    ) -> Result<Option<Vec<Message>>, CheckpointError> {
        let thread_id = thread_id.to_string();
        let db_path = self.db_path.clone();
        let (snapshot, pending): (Option<String>, Vec<String>) =
            tokio::task::spawn_blocking(move || {
                let conn = open(&db_path)?;
                let mut stmt = conn
                    .prepare(
                        "SELECT snapshot FROM checkpoints WHERE thread_id = ?1 ORDER BY seq DESC LIMIT 1",
                    )
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let mut rows = stmt
                    .query(params![thread_id])
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let snapshot = match rows
                    .next()
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?
                {
                    Some(row) => Some(
                        row.get::<_, String>(0)
                            .map_err(|e| CheckpointError::Storage(e.to_string()))?,
                    ),
                    None => None,
                };

                let mut stmt = conn
                    .prepare("SELECT payload FROM writes WHERE thread_id = ?1 ORDER BY id ASC")
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let pending = stmt
                    .query_map(params![thread_id], |row| row.get::<_, String>(0))
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?;
                Ok::<(Option<String>, Vec<String>), CheckpointError>((snapshot, pending))
            })
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))??;

        if snapshot.is_none() && pending.is_empty() {
            return Ok(None);
        }
        let mut messages: Vec<Message> = match snapshot {
            Some(s) => serde_json::from_str(&s)
                .map_err(|e| CheckpointError::Serialization(e.to_string()))?,
            None => Vec::new(),
        };
        for payload in pending {
            messages.push(
                serde_json::from_str(&payload)
                    .map_err(|e| CheckpointError::Serialization(e.to_string()))?,
            );
        }
        Ok(Some(messages))
    }

    /// Out-of-band repair: appends `extra` to the latest snapshot and saves a
    /// new one. A missing thread starts from an empty list.
    pub async fn update(
        &self,
        thread_id: &str,
        extra: &[Message],
    ) -> Result<(), CheckpointError> {
        let mut messages = self.load_latest(thread_id).await?.unwrap_or_default();
        messages.extend_from_slice(extra);
        self.save_messages(thread_id, &messages).await
    }

    /// Records one message in the `writes` table. [`Self::load_latest`]
    /// folds pending rows onto the snapshot until the next
    /// [`Self::save_messages`] clears them.
    pub async fn append_write(
        &self,
        thread_id: &str,
        message: &Message,
    ) -> Result<(), CheckpointError> {
        let thread_id = thread_id.to_string();
        let payload = serde_json::to_string(message)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            conn.execute(
                "INSERT INTO writes (thread_id, payload) VALUES (?1, ?2)",
                params![thread_id, payload],
            )
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    /// Thread ids with the given prefix, sorted.
    pub async fn list_threads(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        let pattern = format!("{}%", like_escape(prefix));
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT thread_id FROM checkpoints WHERE thread_id LIKE ?1 ESCAPE '\\' ORDER BY thread_id",
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(params![pattern], |row| row.get::<_, String>(0))
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| CheckpointError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    /// Hard-deletes one thread from both tables.
    pub async fn delete(&self, thread_id: &str) -> Result<(), CheckpointError> {
        let thread_id = thread_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            for table in ["checkpoints", "writes"] {
                conn.execute(
                    &format!("DELETE FROM {table} WHERE thread_id = ?1"),
                    params![thread_id],
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            }
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }

    /// Hard-deletes every thread with the given prefix from both tables.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), CheckpointError> {
        let pattern = format!("{}%", like_escape(prefix));
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            for table in ["checkpoints", "writes"] {
                conn.execute(
                    &format!("DELETE FROM {table} WHERE thread_id LIKE ?1 ESCAPE '\\'"),
                    params![pattern],
                )
                .map_err(|e| CheckpointError::Storage(e.to_string()))?;
            }
            Ok::<(), CheckpointError>(())
        })
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?
    }
}

fn open(db_path: &Path) -> Result<rusqlite::Connection, CheckpointError> {
    let conn = rusqlite::Connection::open(db_path)
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
    Ok(conn)
}

/// Escapes `%`, `_`, and the escape char itself for a LIKE prefix pattern, so
/// user/session ids containing them cannot widen a prefix match.
fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Graph-executor view of the store: the snapshot is the message list; the
/// rest of [`AgentState`] is per-turn context reconstructed by the caller.
#[async_trait]
impl Checkpointer<AgentState> for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, CheckpointError> {
        Ok(self.load_latest(thread_id).await?.map(|messages| AgentState {
            messages,
            ..Default::default()
        }))
    }

    async fn save(&self, thread_id: &str, state: &AgentState) -> Result<(), CheckpointError> {
        self.save_messages(thread_id, &state.messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, SqliteCheckpointStore) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteCheckpointStore::new(file.path()).unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn save_and_load_latest_roundtrip() {
        let (_f, store) = store();
        let msgs = vec![Message::user("hi"), Message::assistant("hello")];
        store.save_messages("u#s", &msgs).await.unwrap();
        let loaded = store.load_latest("u#s").await.unwrap().unwrap();
        assert_eq!(loaded, msgs);
        assert!(store.load_latest("u#other").await.unwrap().is_none());
    }

    /// **Scenario**: saves append snapshots; load always returns the newest.
    #[tokio::test]
    async fn snapshots_are_append_only() {
        let (_f, store) = store();
        store
            .save_messages("u#s", &[Message::user("one")])
            .await
            .unwrap();
        store
            .save_messages("u#s", &[Message::user("one"), Message::assistant("two")])
            .await
            .unwrap();
        let loaded = store.load_latest("u#s").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn update_appends_to_latest() {
        let (_f, store) = store();
        store
            .save_messages("u#s", &[Message::user("q")])
            .await
            .unwrap();
        store
            .update("u#s", &[Message::tool("c1", "list_files", "cancelled")])
            .await
            .unwrap();
        let loaded = store.load_latest("u#s").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(matches!(loaded[1], Message::Tool { .. }));
    }

    #[tokio::test]
    async fn list_threads_filters_by_prefix() {
        let (_f, store) = store();
        for tid in ["ada#a", "ada#b", "bob#a"] {
            store.save_messages(tid, &[Message::user("x")]).await.unwrap();
        }
        let threads = store.list_threads("ada#").await.unwrap();
        assert_eq!(threads, vec!["ada#a", "ada#b"]);
    }

    /// **Scenario**: a user id containing LIKE wildcards cannot see other
    /// users' threads.
    #[tokio::test]
    async fn prefix_wildcards_are_literal() {
        let (_f, store) = store();
        store.save_messages("a%b#s", &[Message::user("x")]).await.unwrap();
        store.save_messages("aXb#s", &[Message::user("y")]).await.unwrap();
        let threads = store.list_threads("a%b#").await.unwrap();
        assert_eq!(threads, vec!["a%b#s"]);
    }

    #[tokio::test]
    async fn delete_and_delete_prefix() {
        let (_f, store) = store();
        for tid in ["ada#a", "ada#b", "bob#a"] {
            store.save_messages(tid, &[Message::user("x")]).await.unwrap();
        }
        store.delete("ada#a").await.unwrap();
        assert!(store.load_latest("ada#a").await.unwrap().is_none());
        store.delete_prefix("ada#").await.unwrap();
        assert!(store.list_threads("ada#").await.unwrap().is_empty());
        assert_eq!(store.list_threads("bob#").await.unwrap().len(), 1);
    }

    /// **Scenario**: a turn that stopped after a tool result but before its
    /// snapshot recovers the result on the next load; the following
    /// snapshot clears the pending rows without duplicating them.
    #[tokio::test]
    async fn pending_writes_fold_into_load() {
        let (_f, store) = store();
        store
            .save_messages("u#s", &[Message::user("list files")])
            .await
            .unwrap();
        store
            .append_write("u#s", &Message::tool("c1", "list_files", "a.txt"))
            .await
            .unwrap();

        let folded = store.load_latest("u#s").await.unwrap().unwrap();
        assert_eq!(folded.len(), 2);
        assert!(matches!(&folded[1], Message::Tool { call_id, .. } if call_id == "c1"));

        // Snapshotting the folded state clears writes; no double-count.
        store.save_messages("u#s", &folded).await.unwrap();
        let again = store.load_latest("u#s").await.unwrap().unwrap();
        assert_eq!(again, folded);
    }

    #[tokio::test]
    async fn writes_alone_recover_without_snapshot() {
        let (_f, store) = store();
        store
            .append_write("u#fresh", &Message::tool("c1", "t", "r"))
            .await
            .unwrap();
        let loaded = store.load_latest("u#fresh").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn writes_cleared_on_snapshot() {
        let (_f, store) = store();
        store
            .append_write("u#s", &Message::tool("c1", "t", "r"))
            .await
            .unwrap();
        // Snapshot folds the turn; the writes row must be gone afterwards.
        store.save_messages("u#s", &[Message::user("x")]).await.unwrap();
        let db_path = store.db_path.clone();
        let count: i64 = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path).unwrap();
            conn.query_row("SELECT COUNT(*) FROM writes", [], |r| r.get(0))
                .unwrap()
        })
        .await
        .unwrap();
        assert_eq!(count, 0);
    }
}
