//! `DynamicTool` (§4.4): a script-backed tool invoked as a subprocess with a
//! single JSON-encoded positional argument, per the I/O contract in §6.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permission::Permission;
use crate::script::Interpreter;
use crate::tool::{Tool, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Stdout contract a dynamic tool script must emit exactly one of.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptOutcome {
    Success { success: bool, output: String },
    Failure { success: bool, error: String },
}

/// Persisted descriptor for a dynamic tool (§6 "Persistence schema"): name,
/// description, input schema, permission, script path, and timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicToolRecord {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub permission: Permission,
    pub script_path: PathBuf,
    pub timeout_secs: u64,
}

impl DynamicToolRecord {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        permission: Permission,
        script_path: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            permission,
            script_path,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// A [`Tool`] backed by an on-disk script, executed through an [`Interpreter`].
pub struct DynamicTool {
    record: DynamicToolRecord,
    interpreter: Interpreter,
}

impl DynamicTool {
    pub fn new(record: DynamicToolRecord, interpreter: Interpreter) -> Self {
        Self { record, interpreter }
    }

    pub fn record(&self) -> &DynamicToolRecord {
        &self.record
    }
}

#[async_trait]
impl Tool for DynamicTool {
    fn name(&self) -> &str {
        &self.record.name
    }

    fn description(&self) -> &str {
        &self.record.description
    }

    fn input_schema(&self) -> Value {
        self.record.input_schema.clone()
    }

    fn permission(&self) -> Permission {
        self.record.permission
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let arg = match serde_json::to_string(&input) {
            Ok(s) => s,
            Err(e) => return ToolResult::err(format!("encoding input: {e}")),
        };

        let cwd = self
            .record
            .script_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let run = self
            .interpreter
            .run(
                &self.record.script_path,
                &arg,
                &cwd,
                Duration::from_secs(self.record.timeout_secs),
            )
            .await;

        let output = match run {
            Err(e) => return ToolResult::err(e.to_string()),
            Ok(output) => output,
        };

        if !output.success {
            return ToolResult::err(format!(
                "non-zero exit\nstdout:\n{}\nstderr:\n{}",
                output.stdout, output.stderr
            ));
        }

        if output.stdout.trim().is_empty() {
            return ToolResult::err("script produced empty stdout");
        }

        match serde_json::from_str::<ScriptOutcome>(output.stdout.trim()) {
            Ok(ScriptOutcome::Success { success: true, output }) => ToolResult::ok(output),
            Ok(ScriptOutcome::Failure { success: false, error }) => ToolResult::err(error),
            Ok(_) => ToolResult::err("malformed script output: success flag inconsistent with payload"),
            Err(e) => ToolResult::err(format!("malformed JSON from script: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(dir: &std::path::Path, script_name: &str) -> DynamicToolRecord {
        DynamicToolRecord::new(
            "caesar_cipher",
            "shifts text by a given amount",
            json!({"type": "object"}),
            Permission::Compute,
            dir.join(script_name),
        )
    }

    #[tokio::test]
    async fn success_payload_becomes_ok() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("t.sh"),
            r#"#!/bin/sh
echo '{"success": true, "output": "Uryyb Raibl"}'
"#,
        )
        .unwrap();
        let tool = DynamicTool::new(record(dir.path(), "t.sh"), Interpreter::new("/bin/sh", "sh"));
        let result = tool.execute(json!({"text": "Hello Envoy", "shift": 13})).await;
        assert_eq!(result, ToolResult::ok("Uryyb Raibl"));
    }

    #[tokio::test]
    async fn failure_payload_becomes_err() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("t.sh"),
            r#"#!/bin/sh
echo '{"success": false, "error": "bad input"}'
"#,
        )
        .unwrap();
        let tool = DynamicTool::new(record(dir.path(), "t.sh"), Interpreter::new("/bin/sh", "sh"));
        let result = tool.execute(json!({})).await;
        assert_eq!(result, ToolResult::err("bad input"));
    }

    #[tokio::test]
    async fn empty_stdout_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.sh"), "#!/bin/sh\ntrue\n").unwrap();
        let tool = DynamicTool::new(record(dir.path(), "t.sh"), Interpreter::new("/bin/sh", "sh"));
        let result = tool.execute(json!({})).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.sh"), "#!/bin/sh\necho 'not json'\n").unwrap();
        let tool = DynamicTool::new(record(dir.path(), "t.sh"), Interpreter::new("/bin/sh", "sh"));
        let result = tool.execute(json!({})).await;
        match result {
            ToolResult::Err { message } => assert!(message.contains("malformed JSON")),
            other => panic!("expected Err, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_attaches_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("t.sh"),
            "#!/bin/sh\necho out; echo err >&2; exit 1\n",
        )
        .unwrap();
        let tool = DynamicTool::new(record(dir.path(), "t.sh"), Interpreter::new("/bin/sh", "sh"));
        let result = tool.execute(json!({})).await;
        match result {
            ToolResult::Err { message } => {
                assert!(message.contains("out"));
                assert!(message.contains("err"));
            }
            other => panic!("expected Err, got {other:?}"),
        }
    }
}
