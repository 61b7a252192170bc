//! Message table: `messages(id serial, session_id fk cascade, content,
//! sort_order, created_at)` (§4.9). Wired as `Context.on_message =
//! append_message(session_id, _)`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;

use crate::error::EnvoyError;
use crate::message::Message;

pub struct MessageStore {
    db_path: PathBuf,
}

impl MessageStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, EnvoyError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (id TEXT PRIMARY KEY, created_at TEXT NOT NULL)",
            [],
        )?;
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                sort_order INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            [],
        )?;
        Ok(Self { db_path })
    }

    pub async fn append_message(
        &self,
        session_id: &str,
        message: &Message,
        sort_order: u32,
    ) -> Result<(), EnvoyError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        let content = serde_json::to_string(message)?;
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            conn.execute(
                "INSERT INTO messages (session_id, content, sort_order, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, content, sort_order, Utc::now().to_rfc3339()],
            )?;
            Ok::<(), EnvoyError>(())
        })
        .await
        .map_err(|e| EnvoyError::internal(format!("join: {e}")))?
    }

    /// Rows in `sort_order` ascending, decoded.
    pub async fn load_messages(&self, session_id: &str) -> Result<Vec<Message>, EnvoyError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT content FROM messages WHERE session_id = ?1 ORDER BY sort_order ASC",
            )?;
            let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
            let mut messages = Vec::new();
            for row in rows {
                let content = row?;
                messages.push(serde_json::from_str(&content)?);
            }
            Ok::<Vec<Message>, EnvoyError>(messages)
        })
        .await
        .map_err(|e| EnvoyError::internal(format!("join: {e}")))?
    }

    /// Builds a `Context` append observer that persists each message under
    /// `session_id` with a dense, monotonically increasing `sort_order`
    /// (§4.9 "Wired in via `Context.on_message`"). `next_sort_order` starts
    /// at whatever `SessionStore::ensure_session` returned.
    pub fn append_observer(
        self: Arc<Self>,
        session_id: String,
        next_sort_order: u32,
    ) -> impl Fn(&Message) + Send + Sync {
        let counter = AtomicU32::new(next_sort_order);
        move |message: &Message| {
            let store = self.clone();
            let session_id = session_id.clone();
            let sort_order = counter.fetch_add(1, Ordering::SeqCst);
            let message = message.clone();
            tokio::spawn(async move {
                let _ = store.append_message(&session_id, &message, sort_order).await;
            });
        }
    }
}
