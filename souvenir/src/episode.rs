//! Episode Store (§3, §4.12): append-only, session-scoped raw events
//! consumed by consolidation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::SouvenirError;

/// Kind of a recorded event, mirroring how it entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EpisodeType {
    UserDirective,
    ToolResult,
    Decision,
    Observation,
    Error,
}

impl EpisodeType {
    fn as_str(&self) -> &'static str {
        match self {
            EpisodeType::UserDirective => "userDirective",
            EpisodeType::ToolResult => "toolResult",
            EpisodeType::Decision => "decision",
            EpisodeType::Observation => "observation",
            EpisodeType::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "userDirective" => Some(EpisodeType::UserDirective),
            "toolResult" => Some(EpisodeType::ToolResult),
            "decision" => Some(EpisodeType::Decision),
            "observation" => Some(EpisodeType::Observation),
            "error" => Some(EpisodeType::Error),
            _ => None,
        }
    }
}

/// A single recorded event within a session (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub session_id: String,
    pub r#type: EpisodeType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One line of a consolidation transcript: `[type] content`.
pub fn transcript_line(episode: &Episode) -> String {
    format!("[{}] {}", episode.r#type.as_str(), episode.content)
}

/// Builds the full transcript the consolidation LLM call reads (§4.10 step 2).
pub fn build_transcript(episodes: &[Episode]) -> String {
    episodes.iter().map(transcript_line).collect::<Vec<_>>().join("\n")
}

pub struct EpisodeStore {
    db_path: PathBuf,
}

impl EpisodeStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SouvenirError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)?;
        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS episodes_session_idx ON episodes(session_id)",
            [],
        )?;
        Ok(Self { db_path })
    }

    /// Appends a new episode, returning its assigned id.
    pub async fn record(
        &self,
        session_id: &str,
        r#type: EpisodeType,
        content: impl Into<String>,
    ) -> Result<i64, SouvenirError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        let content = content.into();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            conn.execute(
                "INSERT INTO episodes (session_id, type, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![session_id, r#type.as_str(), content, Utc::now().to_rfc3339()],
            )?;
            Ok::<i64, SouvenirError>(conn.last_insert_rowid())
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }

    /// All episodes for `session_id`, oldest first.
    pub async fn load_session(&self, session_id: &str) -> Result<Vec<Episode>, SouvenirError> {
        let db_path = self.db_path.clone();
        let session_id = session_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT id, session_id, type, content, created_at FROM episodes WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![session_id], row_to_episode)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(SouvenirError::from)
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }

    /// All episodes not yet consolidated, i.e. every row (the core has no
    /// separate "consumed" flag; callers that want at-most-once consolidation
    /// should delete or archive rows after a successful `consolidate` call).
    pub async fn load_unconsolidated(&self) -> Result<Vec<Episode>, SouvenirError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT id, session_id, type, content, created_at FROM episodes ORDER BY id ASC",
            )?;
            let rows = stmt.query_map([], row_to_episode)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(SouvenirError::from)
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }
}

fn row_to_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<Episode> {
    let type_str: String = row.get(2)?;
    let created_at_str: String = row.get(4)?;
    Ok(Episode {
        id: row.get(0)?,
        session_id: row.get(1)?,
        r#type: EpisodeType::parse(&type_str).unwrap_or(EpisodeType::Observation),
        content: row.get(3)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_load_session_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpisodeStore::new(dir.path().join("episodes.db")).unwrap();
        store.record("s1", EpisodeType::UserDirective, "do the thing").await.unwrap();
        store.record("s1", EpisodeType::ToolResult, "did the thing").await.unwrap();
        store.record("s2", EpisodeType::Observation, "unrelated").await.unwrap();

        let episodes = store.load_session("s1").await.unwrap();
        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].content, "do the thing");
        assert_eq!(episodes[1].content, "did the thing");
    }

    #[tokio::test]
    async fn load_unconsolidated_spans_all_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = EpisodeStore::new(dir.path().join("episodes.db")).unwrap();
        store.record("s1", EpisodeType::Decision, "a").await.unwrap();
        store.record("s2", EpisodeType::Decision, "b").await.unwrap();
        let episodes = store.load_unconsolidated().await.unwrap();
        assert_eq!(episodes.len(), 2);
    }

    #[test]
    fn transcript_line_wraps_type_in_brackets() {
        let episode = Episode {
            id: 1,
            session_id: "s".into(),
            r#type: EpisodeType::Error,
            content: "boom".into(),
            created_at: Utc::now(),
        };
        assert_eq!(transcript_line(&episode), "[error] boom");
    }
}
