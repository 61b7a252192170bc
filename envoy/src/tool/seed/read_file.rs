//! `ReadFile` seed tool (§4.3, readFile tier).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::permission::Permission;
use crate::tool::{Tool, ToolResult};
use crate::workspace_guard::WorkspaceGuard;

pub struct ReadFile {
    guard: WorkspaceGuard,
}

impl ReadFile {
    pub fn new(guard: WorkspaceGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a UTF-8 text file at a workspace-relative path."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        })
    }

    fn permission(&self) -> Permission {
        Permission::ReadFile
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let Some(path) = input.get("path").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: path");
        };

        let Some(resolved) = self.guard.resolve(path) else {
            return ToolResult::err("path escapes workspace root");
        };

        match tokio::fs::read_to_string(&resolved).await {
            Ok(contents) => ToolResult::ok(contents),
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
        let tool = ReadFile::new(WorkspaceGuard::new(dir.path()));
        let result = tool.execute(json!({"path": "../../etc/passwd"})).await;
        match result {
            ToolResult::Err { message } => assert!(message.contains("escapes workspace")),
            other => panic!("expected Err, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reads_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let tool = ReadFile::new(WorkspaceGuard::new(dir.path()));
        let result = tool.execute(json!({"path": "a.txt"})).await;
        assert_eq!(result, ToolResult::ok("hello"));
    }

    #[tokio::test]
    async fn missing_file_returns_os_message() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFile::new(WorkspaceGuard::new(dir.path()));
        let result = tool.execute(json!({"path": "nope.txt"})).await;
        assert!(result.is_error());
    }
}
