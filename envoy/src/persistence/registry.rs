//! Tool registry table: `tools(name unique, description, permission,
//! script_path, input_schema, created_at)` plus an FTS5 shadow table for
//! `search_tools` (§4.9, §9 resolution: native FTS5 + BM25).

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::params;

use crate::error::EnvoyError;
use crate::permission::Permission;

/// One row of the persisted tool registry.
#[derive(Debug, Clone)]
pub struct ToolRow {
    pub name: String,
    pub description: String,
    pub permission: Permission,
    pub script_path: Option<String>,
    pub input_schema: serde_json::Value,
    pub created_at: chrono::DateTime<Utc>,
}

/// A search hit: name, description, permission only (§4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSearchHit {
    pub name: String,
    pub description: String,
    pub permission: Permission,
}

pub struct ToolRegistry {
    db_path: PathBuf,
}

impl ToolRegistry {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, EnvoyError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS tools (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                permission TEXT NOT NULL,
                script_path TEXT,
                input_schema TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS tools_fts USING fts5(name, description, content='tools', content_rowid='rowid')",
            [],
        )?;
        // Keep the FTS shadow table in sync on every mutation; this is the
        // same trigger-driven approach the corpus uses to pair a base table
        // with a derived index rather than rebuilding it per-query.
        conn.execute(
            r#"CREATE TRIGGER IF NOT EXISTS tools_ai AFTER INSERT ON tools BEGIN
                INSERT INTO tools_fts(rowid, name, description) VALUES (new.rowid, new.name, new.description);
            END"#,
            [],
        )?;
        conn.execute(
            r#"CREATE TRIGGER IF NOT EXISTS tools_ad AFTER DELETE ON tools BEGIN
                INSERT INTO tools_fts(tools_fts, rowid, name, description) VALUES ('delete', old.rowid, old.name, old.description);
            END"#,
            [],
        )?;
        conn.execute(
            r#"CREATE TRIGGER IF NOT EXISTS tools_au AFTER UPDATE ON tools BEGIN
                INSERT INTO tools_fts(tools_fts, rowid, name, description) VALUES ('delete', old.rowid, old.name, old.description);
                INSERT INTO tools_fts(rowid, name, description) VALUES (new.rowid, new.name, new.description);
            END"#,
            [],
        )?;
        Ok(Self { db_path })
    }

    /// Upsert by name: replaces description/permission/script_path/input_schema,
    /// preserving `created_at` across updates (§4.9).
    pub async fn save_tool(&self, tool: ToolRow) -> Result<(), EnvoyError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let existing_created_at: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM tools WHERE name = ?1",
                    params![tool.name],
                    |row| row.get(0),
                )
                .ok();
            let created_at = existing_created_at.unwrap_or_else(|| tool.created_at.to_rfc3339());
            let input_schema = serde_json::to_string(&tool.input_schema)?;
            conn.execute(
                "INSERT INTO tools (name, description, permission, script_path, input_schema, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    permission = excluded.permission,
                    script_path = excluded.script_path,
                    input_schema = excluded.input_schema",
                params![
                    tool.name,
                    tool.description,
                    tool.permission.slug(),
                    tool.script_path,
                    input_schema,
                    created_at,
                ],
            )?;
            Ok::<(), EnvoyError>(())
        })
        .await
        .map_err(|e| EnvoyError::internal(format!("join: {e}")))?
    }

    pub async fn load_tools(&self) -> Result<Vec<ToolRow>, EnvoyError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT name, description, permission, script_path, input_schema, created_at FROM tools ORDER BY name",
            )?;
            let rows = stmt.query_map([], row_to_tool)?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(EnvoyError::from)
        })
        .await
        .map_err(|e| EnvoyError::internal(format!("join: {e}")))?
    }

    /// Full-text match against name or description, ranked by FTS5's BM25.
    pub async fn search_tools(&self, query: &str) -> Result<Vec<ToolSearchHit>, EnvoyError> {
        let db_path = self.db_path.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT t.name, t.description, t.permission
                 FROM tools_fts f
                 JOIN tools t ON t.rowid = f.rowid
                 WHERE tools_fts MATCH ?1
                 ORDER BY bm25(tools_fts)",
            )?;
            let match_expr = fts_match_expr(&query);
            let rows = stmt.query_map(params![match_expr], |row| {
                let permission_str: String = row.get(2)?;
                Ok(ToolSearchHit {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    permission: Permission::parse(&permission_str).unwrap_or(Permission::Compute),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(EnvoyError::from)
        })
        .await
        .map_err(|e| EnvoyError::internal(format!("join: {e}")))?
    }
}

fn row_to_tool(row: &rusqlite::Row<'_>) -> rusqlite::Result<ToolRow> {
    let permission_str: String = row.get(2)?;
    let script_path: Option<String> = row.get(3)?;
    let input_schema_str: String = row.get(4)?;
    let created_at_str: String = row.get(5)?;
    Ok(ToolRow {
        name: row.get(0)?,
        description: row.get(1)?,
        permission: Permission::parse(&permission_str).unwrap_or(Permission::Compute),
        script_path,
        input_schema: serde_json::from_str(&input_schema_str).unwrap_or(serde_json::Value::Null),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Wraps each whitespace-separated term in quotes so names/descriptions with
/// FTS5 special characters (`-`, `.`) don't break the MATCH syntax.
fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(name: &str, description: &str) -> ToolRow {
        ToolRow {
            name: name.to_string(),
            description: description.to_string(),
            permission: Permission::Compute,
            script_path: None,
            input_schema: json!({"type": "object"}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(dir.path().join("registry.db")).unwrap();
        registry.save_tool(row("caesar_cipher", "shifts text")).await.unwrap();
        let tools = registry.load_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "caesar_cipher");
    }

    #[tokio::test]
    async fn save_upserts_by_name_preserving_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(dir.path().join("registry.db")).unwrap();
        registry.save_tool(row("t", "first description")).await.unwrap();
        let first_created = registry.load_tools().await.unwrap()[0].created_at;
        registry.save_tool(row("t", "second description")).await.unwrap();
        let tools = registry.load_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "second description");
        assert_eq!(tools[0].created_at, first_created);
    }

    #[tokio::test]
    async fn search_tools_matches_description() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(dir.path().join("registry.db")).unwrap();
        registry.save_tool(row("caesar_cipher", "shifts text by a caesar offset")).await.unwrap();
        registry.save_tool(row("fetch_url", "fetches a url over http")).await.unwrap();
        let hits = registry.search_tools("caesar").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "caesar_cipher");
    }
}
