//! `WriteFile` seed tool (§4.3, writeFile tier).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::permission::Permission;
use crate::tool::{Tool, ToolResult};
use crate::workspace_guard::WorkspaceGuard;

pub struct WriteFile {
    guard: WorkspaceGuard,
}

impl WriteFile {
    pub fn new(guard: WorkspaceGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes (overwriting) a UTF-8 text file at a workspace-relative path, creating parent directories as needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    fn permission(&self) -> Permission {
        Permission::WriteFile
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let Some(path) = input.get("path").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: path");
        };
        let Some(content) = input.get("content").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: content");
        };

        let Some(resolved) = self.guard.resolve(path) else {
            return ToolResult::err("path escapes workspace root");
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(format!("creating parent directories: {e}"));
            }
        }

        match tokio::fs::write(&resolved, content.as_bytes()).await {
            Ok(()) => ToolResult::ok(format!("wrote {} bytes", content.len())),
            Err(e) => ToolResult::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn escaping_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFile::new(WorkspaceGuard::new(dir.path()));
        let result = tool
            .execute(json!({"path": "../outside.txt", "content": "x"}))
            .await;
        match result {
            ToolResult::Err { message } => assert!(message.contains("escapes workspace")),
            other => panic!("expected Err, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFile::new(WorkspaceGuard::new(dir.path()));
        let result = tool
            .execute(json!({"path": "nested/dir/hello.ext", "content": "Phase 2 complete"}))
            .await;
        assert!(!result.is_error());
        let contents = std::fs::read_to_string(dir.path().join("nested/dir/hello.ext")).unwrap();
        assert_eq!(contents, "Phase 2 complete");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();
        let tool = WriteFile::new(WorkspaceGuard::new(dir.path()));
        tool.execute(json!({"path": "a.txt", "content": "new"}))
            .await;
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "new");
    }
}
