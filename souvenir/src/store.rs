//! `MemoryStore`: the typed-memory persistence layer behind consolidation and
//! recall (§4.9's connection strategy, applied to §3's `StoredMemory`).
//!
//! A dual-table design: a plain metadata table plus a `vec0` virtual table
//! for embeddings, with the `sqlite_vec` extension registered exactly once
//! behind a `Once` guard. An FTS5 table is added alongside for the BM25
//! signal, wired with the same insert/delete/update trigger trio as the
//! tool registry in `envoy::persistence::registry`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::embedder::Embedder;
use crate::error::SouvenirError;
use crate::memory::{EnvironmentalCategory, MemoryKind, MemoryMetadata, MemoryStatus, StoredMemory};

static SQLITE_VEC_INIT: Once = Once::new();
static SQLITE_VEC_INITIALIZED: AtomicBool = AtomicBool::new(false);

fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
    SQLITE_VEC_INITIALIZED.store(true, Ordering::SeqCst);
}

fn vector_to_json(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|f| f.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// A raw, unnormalized candidate from one signal source. Recall is
/// responsible for normalizing and fusing these (§4.11).
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub id: String,
    pub raw_score: f64,
}

pub struct SqliteMemoryStore {
    db_path: PathBuf,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
}

impl SqliteMemoryStore {
    pub fn new(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self, SouvenirError> {
        ensure_sqlite_vec_registered();

        let db_path = path.as_ref().to_path_buf();
        let dimension = embedder.dimension();
        let conn = rusqlite::Connection::open(&db_path)?;

        conn.execute(
            r#"CREATE TABLE IF NOT EXISTS memories (
                pk INTEGER PRIMARY KEY,
                id TEXT UNIQUE NOT NULL,
                content TEXT NOT NULL,
                kind TEXT NOT NULL,
                importance REAL NOT NULL,
                source_episode_ids TEXT NOT NULL,
                entities TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_accessed TEXT,
                access_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                embedding TEXT,
                metadata TEXT NOT NULL
            )"#,
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS memories_vec USING vec0(embedding float[{dimension}])"
            ),
            [],
        )?;
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(content, content='memories', content_rowid='pk')",
            [],
        )?;
        conn.execute(
            r#"CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
                INSERT INTO memories_fts(rowid, content) VALUES (new.pk, new.content);
            END"#,
            [],
        )?;
        conn.execute(
            r#"CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
                INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', old.pk, old.content);
            END"#,
            [],
        )?;
        conn.execute(
            r#"CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE ON memories BEGIN
                INSERT INTO memories_fts(memories_fts, rowid, content) VALUES ('delete', old.pk, old.content);
                INSERT INTO memories_fts(rowid, content) VALUES (new.pk, new.content);
            END"#,
            [],
        )?;

        Ok(Self { db_path, embedder, dimension })
    }

    /// Embeds `memory.content` if it has no embedding yet, then upserts both
    /// the metadata row and its `vec0` entry by internal rowid.
    pub async fn upsert(&self, mut memory: StoredMemory) -> Result<StoredMemory, SouvenirError> {
        if memory.embedding.is_none() {
            let vectors = self.embedder.embed(&[memory.content.as_str()]).await?;
            memory.embedding = vectors.into_iter().next();
        }
        let embedding = memory.embedding.clone();
        if let Some(ref v) = embedding {
            if v.len() != self.dimension {
                return Err(SouvenirError::internal(format!(
                    "embedder dimension {} != store dimension {}",
                    v.len(),
                    self.dimension
                )));
            }
        }

        let db_path = self.db_path.clone();
        let record = memory.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let metadata_json = serde_json::to_string(&record.metadata)?;
            let source_ids_json = serde_json::to_string(&record.source_episode_ids)?;
            let entities_json = serde_json::to_string(&record.entities)?;
            let embedding_json = embedding.as_deref().map(vector_to_json);
            let kind_str = kind_slug(record.kind);
            let status_str = status_slug(record.status);

            conn.execute(
                "INSERT INTO memories (id, content, kind, importance, source_episode_ids, entities,
                    created_at, updated_at, last_accessed, access_count, status, embedding, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    kind = excluded.kind,
                    importance = excluded.importance,
                    source_episode_ids = excluded.source_episode_ids,
                    entities = excluded.entities,
                    updated_at = excluded.updated_at,
                    last_accessed = excluded.last_accessed,
                    access_count = excluded.access_count,
                    status = excluded.status,
                    embedding = excluded.embedding,
                    metadata = excluded.metadata",
                params![
                    record.id,
                    record.content,
                    kind_str,
                    record.importance,
                    source_ids_json,
                    entities_json,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                    record.last_accessed.map(|t| t.to_rfc3339()),
                    record.access_count,
                    status_str,
                    embedding_json,
                    metadata_json,
                ],
            )?;

            let pk: i64 = conn.query_row(
                "SELECT pk FROM memories WHERE id = ?1",
                params![record.id],
                |row| row.get(0),
            )?;
            conn.execute("DELETE FROM memories_vec WHERE rowid = ?1", params![pk])?;
            if let Some(v) = &record.embedding {
                conn.execute(
                    "INSERT INTO memories_vec (rowid, embedding) VALUES (?1, ?2)",
                    params![pk, vector_to_json(v)],
                )?;
            }
            Ok::<(), SouvenirError>(())
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))??;

        Ok(memory)
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredMemory>, SouvenirError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(select_columns_sql("WHERE id = ?1").as_str())?;
            let mut rows = stmt.query_map(params![id], row_to_memory)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }

    /// All active memories, optionally filtered by kind; used by consolidation
    /// for merge-candidate lookup and by decay's sweep.
    pub async fn list_active(&self, kind: Option<MemoryKind>) -> Result<Vec<StoredMemory>, SouvenirError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let sql = match kind {
                Some(k) => select_columns_sql(&format!(
                    "WHERE status = 'active' AND kind = '{}'",
                    kind_slug(k)
                )),
                None => select_columns_sql("WHERE status = 'active'"),
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_memory)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(SouvenirError::from)
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }

    /// Sets `importance` and, when `decayed` is true, flips `status` to
    /// decayed (§4.10 step 1).
    pub async fn apply_decay(&self, id: &str, importance: f64, decayed: bool) -> Result<(), SouvenirError> {
        let db_path = self.db_path.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let status = if decayed { status_slug(MemoryStatus::Decayed) } else { status_slug(MemoryStatus::Active) };
            conn.execute(
                "UPDATE memories SET importance = ?1, status = ?2 WHERE id = ?3",
                params![importance, status, id],
            )?;
            Ok::<(), SouvenirError>(())
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }

    /// Full-text candidates: `(id, raw bm25-derived score)`, higher is
    /// better. Normalization into `[0, 1]` happens in recall, over the full
    /// candidate set (§4.11).
    pub async fn fts_candidates(&self, query: &str, limit: usize) -> Result<Vec<RawCandidate>, SouvenirError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let db_path = self.db_path.clone();
        let match_expr = fts_match_expr(query);
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT m.id, bm25(memories_fts) FROM memories_fts f
                 JOIN memories m ON m.pk = f.rowid
                 WHERE memories_fts MATCH ?1 AND m.status = 'active'
                 ORDER BY bm25(memories_fts) LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![match_expr, limit as i64], |row| {
                let id: String = row.get(0)?;
                let bm25: f64 = row.get(1)?;
                // bm25() in FTS5 is a cost (lower is a better match); flip
                // sign so callers treat higher as better, like every other signal.
                Ok(RawCandidate { id, raw_score: -bm25 })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(SouvenirError::from)
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }

    /// Vector candidates: `(id, 1/(1+distance))`, already in a comparable
    /// `(0, 1]` range.
    pub async fn vector_candidates(&self, embedding: &[f32], limit: usize) -> Result<Vec<RawCandidate>, SouvenirError> {
        if embedding.len() != self.dimension {
            return Err(SouvenirError::internal(format!(
                "query embedding dimension {} != store dimension {}",
                embedding.len(),
                self.dimension
            )));
        }
        let db_path = self.db_path.clone();
        let vec_json = vector_to_json(embedding);
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT rowid, distance FROM memories_vec WHERE embedding MATCH ?1 AND k = ?2",
            )?;
            let rows = stmt.query_map(params![vec_json, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })?;
            let hits: Vec<(i64, f64)> = rows.collect::<Result<Vec<_>, _>>()?;
            let mut candidates = Vec::with_capacity(hits.len());
            for (pk, dist) in hits {
                let id_and_status: Option<(String, String)> = conn
                    .query_row(
                        "SELECT id, status FROM memories WHERE pk = ?1",
                        params![pk],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .ok();
                if let Some((id, status)) = id_and_status {
                    if status == "active" {
                        candidates.push(RawCandidate { id, raw_score: 1.0 / (1.0 + dist) });
                    }
                }
            }
            Ok::<Vec<RawCandidate>, SouvenirError>(candidates)
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }

    /// Ids of active memories whose `entities` list contains `entity`
    /// (§4.11's entity-expansion candidate source, 1-hop).
    pub async fn memories_for_entity(&self, entity: &str) -> Result<Vec<String>, SouvenirError> {
        let memories = self.list_active(None).await?;
        Ok(memories
            .into_iter()
            .filter(|m| m.entities.iter().any(|e| e.eq_ignore_ascii_case(entity)))
            .map(|m| m.id)
            .collect())
    }

    /// Batched `access_count`/`last_accessed` bump for surfaced ids (§4.11
    /// step 5).
    pub async fn bump_access_stats(&self, ids: &[String], now: DateTime<Utc>) -> Result<(), SouvenirError> {
        if ids.is_empty() {
            return Ok(());
        }
        let db_path = self.db_path.clone();
        let ids = ids.to_vec();
        let now_str = now.to_rfc3339();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            for id in ids {
                conn.execute(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
                    params![now_str, id],
                )?;
            }
            Ok::<(), SouvenirError>(())
        })
        .await
        .map_err(|e| SouvenirError::internal(format!("join: {e}")))?
    }
}

fn select_columns_sql(filter: &str) -> String {
    format!(
        "SELECT id, content, kind, importance, source_episode_ids, entities, created_at,
                updated_at, last_accessed, access_count, status, embedding, metadata
         FROM memories {filter}"
    )
}

fn kind_slug(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Durable => "durable",
        MemoryKind::Task => "task",
        MemoryKind::Environmental => "environmental",
    }
}

fn parse_kind(s: &str) -> MemoryKind {
    match s {
        "task" => MemoryKind::Task,
        "environmental" => MemoryKind::Environmental,
        _ => MemoryKind::Durable,
    }
}

fn status_slug(status: MemoryStatus) -> &'static str {
    match status {
        MemoryStatus::Active => "active",
        MemoryStatus::Decayed => "decayed",
    }
}

fn parse_status(s: &str) -> MemoryStatus {
    if s == "decayed" { MemoryStatus::Decayed } else { MemoryStatus::Active }
}

fn parse_embedding(json: Option<String>) -> Option<Vec<f32>> {
    json.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMemory> {
    let kind_str: String = row.get(2)?;
    let source_ids_str: String = row.get(4)?;
    let entities_str: String = row.get(5)?;
    let created_at_str: String = row.get(6)?;
    let updated_at_str: String = row.get(7)?;
    let last_accessed_str: Option<String> = row.get(8)?;
    let status_str: String = row.get(10)?;
    let embedding_str: Option<String> = row.get(11)?;
    let metadata_str: String = row.get(12)?;

    let parse_dt = |s: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };

    Ok(StoredMemory {
        id: row.get(0)?,
        content: row.get(1)?,
        kind: parse_kind(&kind_str),
        importance: row.get(3)?,
        source_episode_ids: serde_json::from_str(&source_ids_str).unwrap_or_default(),
        entities: serde_json::from_str(&entities_str).unwrap_or_default(),
        created_at: parse_dt(&created_at_str),
        updated_at: parse_dt(&updated_at_str),
        last_accessed: last_accessed_str.map(|s| parse_dt(&s)),
        access_count: row.get(9)?,
        status: parse_status(&status_str),
        embedding: parse_embedding(embedding_str),
        metadata: serde_json::from_str(&metadata_str).unwrap_or(MemoryMetadata::Durable(
            crate::memory::DurableFact::default(),
        )),
    })
}

fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Reads an [`EnvironmentalCategory`] weight multiplier out of `metadata`, or
/// `1.0` for non-environmental kinds (used by recall's category weighting).
pub fn environmental_category(memory: &StoredMemory) -> Option<EnvironmentalCategory> {
    match &memory.metadata {
        MemoryMetadata::Environmental(item) => Some(item.category),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use crate::memory::{DurableFact, MemoryStatus};

    fn new_memory(id: &str, content: &str, importance: f64) -> StoredMemory {
        let now = Utc::now();
        StoredMemory {
            id: id.to_string(),
            content: content.to_string(),
            kind: MemoryKind::Durable,
            importance,
            source_episode_ids: vec![1, 2],
            entities: vec!["Rabbit".to_string()],
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            status: MemoryStatus::Active,
            embedding: None,
            metadata: MemoryMetadata::Durable(DurableFact { entities: vec!["Rabbit".to_string()] }),
        }
    }

    async fn store() -> SqliteMemoryStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.db");
        std::mem::forget(dir);
        SqliteMemoryStore::new(path, Arc::new(MockEmbedder::new(32))).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = store().await;
        store.upsert(new_memory("m1", "User thinks rabbits are the most adorable creatures", 0.8)).await.unwrap();
        let loaded = store.get("m1").await.unwrap().unwrap();
        assert_eq!(loaded.content, "User thinks rabbits are the most adorable creatures");
        assert!(loaded.embedding.is_some());
    }

    #[tokio::test]
    async fn upsert_is_an_upsert_by_id() {
        let store = store().await;
        store.upsert(new_memory("m1", "first version", 0.5)).await.unwrap();
        store.upsert(new_memory("m1", "second version", 0.9)).await.unwrap();
        let all = store.list_active(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "second version");
    }

    #[tokio::test]
    async fn apply_decay_flips_status_and_excludes_from_list_active() {
        let store = store().await;
        store.upsert(new_memory("m1", "fading fact", 0.1)).await.unwrap();
        store.apply_decay("m1", 0.01, true).await.unwrap();
        let active = store.list_active(None).await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn fts_candidates_finds_matching_content() {
        let store = store().await;
        store.upsert(new_memory("m1", "the user prefers dark mode interfaces", 0.5)).await.unwrap();
        store.upsert(new_memory("m2", "unrelated content about spreadsheets", 0.5)).await.unwrap();
        let hits = store.fts_candidates("dark mode", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");
    }

    #[tokio::test]
    async fn vector_candidates_surfaces_semantically_similar_memory() {
        let store = store().await;
        store.upsert(new_memory("m1", "User thinks rabbits are the most adorable creatures", 0.8)).await.unwrap();
        store.upsert(new_memory("m2", "quantum entanglement research notes", 0.5)).await.unwrap();
        let embedder = MockEmbedder::new(32);
        let query_vec = embedder.embed(&["favourite animal rabbits"]).await.unwrap().remove(0);
        let hits = store.vector_candidates(&query_vec, 10).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "m1");
    }

    #[tokio::test]
    async fn memories_for_entity_filters_by_linked_entity() {
        let store = store().await;
        store.upsert(new_memory("m1", "fact about rabbits", 0.5)).await.unwrap();
        let ids = store.memories_for_entity("Rabbit").await.unwrap();
        assert_eq!(ids, vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn bump_access_stats_updates_all_ids() {
        let store = store().await;
        store.upsert(new_memory("m1", "a", 0.5)).await.unwrap();
        store.upsert(new_memory("m2", "b", 0.5)).await.unwrap();
        store.bump_access_stats(&["m1".to_string(), "m2".to_string()], Utc::now()).await.unwrap();
        let m1 = store.get("m1").await.unwrap().unwrap();
        assert_eq!(m1.access_count, 1);
        assert!(m1.last_accessed.is_some());
    }
}
