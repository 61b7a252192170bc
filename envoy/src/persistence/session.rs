//! Session table: `{id: hex16, created_at}` (§4.9, §6 "session ids are
//! lowercase hex of 16 random bytes").

use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::RngCore;
use rusqlite::params;

use crate::error::EnvoyError;

pub struct SessionStore {
    db_path: PathBuf,
}

fn random_hex16() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl SessionStore {
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

    /// If `id` is supplied and present, returns it with `next_sort_order` set
    /// to the session's current message count. Otherwise creates a fresh
    /// session with a random id (§4.9).
    pub async fn ensure_session(&self, id: Option<String>) -> Result<(String, u32), EnvoyError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            conn.execute("PRAGMA foreign_keys = ON", [])?;

            if let Some(id) = id {
                let exists: bool = conn
                    .query_row(
                        "SELECT 1 FROM sessions WHERE id = ?1",
                        params![id],
                        |_| Ok(true),
                    )
                    .unwrap_or(false);
                if exists {
                    let count: u32 = conn.query_row(
                        "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
                        params![id],
                        |row| row.get(0),
                    )?;
                    return Ok((id, count));
                }
                conn.execute(
                    "INSERT INTO sessions (id, created_at) VALUES (?1, ?2)",
                    params![id, Utc::now().to_rfc3339()],
                )?;
                return Ok((id, 0));
            }

            let id = random_hex16();
            conn.execute(
                "INSERT INTO sessions (id, created_at) VALUES (?1, ?2)",
                params![id, Utc::now().to_rfc3339()],
            )?;
            Ok::<(String, u32), EnvoyError>((id, 0))
        })
        .await
        .map_err(|e| EnvoyError::internal(format!("join: {e}")))?
    }
}
