//! `RunScript` seed tool (§4.3, process tier): runs a script, inline or from
//! a workspace-relative path, through a configurable [`Interpreter`] rather
//! than one hard-coded interpreter binary.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::permission::Permission;
use crate::script::Interpreter;
use crate::tool::{Tool, ToolResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RunScript {
    interpreter: Interpreter,
    workspace_root: PathBuf,
    timeout: Duration,
}

impl RunScript {
    pub fn new(interpreter: Interpreter, workspace_root: PathBuf) -> Self {
        Self {
            interpreter,
            workspace_root,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for RunScript {
    fn name(&self) -> &str {
        "run_script"
    }

    fn description(&self) -> &str {
        "Runs inline code or a workspace-relative script file with the configured interpreter."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string"},
                "path": {"type": "string"}
            }
        })
    }

    fn permission(&self) -> Permission {
        Permission::Process
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let code = input.get("code").and_then(Value::as_str);
        let path = input.get("path").and_then(Value::as_str);

        let script_path = match (code, path) {
            (Some(_), Some(_)) => {
                return ToolResult::err("provide exactly one of `code` or `path`, not both")
            }
            (None, None) => {
                return ToolResult::err("provide exactly one of `code` or `path`")
            }
            (Some(code), None) => {
                let temp_name = format!("envoy-run-{}.{}", Uuid::new_v4(), self.interpreter.extension);
                let temp_path = std::env::temp_dir().join(temp_name);
                if let Err(e) = tokio::fs::write(&temp_path, code).await {
                    return ToolResult::err(format!("writing temp script: {e}"));
                }
                temp_path
            }
            (None, Some(rel_path)) => {
                let Some(resolved) = crate::workspace_guard::resolve(&self.workspace_root, rel_path)
                else {
                    return ToolResult::err("path escapes workspace root");
                };
                resolved
            }
        };

        let result = self
            .interpreter
            .run(&script_path, "", &self.workspace_root, self.timeout)
            .await;

        if code.is_some() {
            let _ = tokio::fs::remove_file(&script_path).await;
        }

        match result {
            Err(e) => ToolResult::err(e.to_string()),
            Ok(output) if output.success => ToolResult::ok(output.stdout),
            Ok(output) => ToolResult::err(format!(
                "exit code {}\nstdout:\n{}\nstderr:\n{}",
                output.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()),
                output.stdout,
                output.stderr
            )),
        }
    }
}
