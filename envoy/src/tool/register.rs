//! `RegisterToolTool` (§4.5): the tool that lets the agent extend its own
//! capability set at runtime. Write, statically analyze, gate, and register
//! a new dynamic tool; dedup by policy callback rather than an embedded
//! registry, to keep this tool decoupled from persistence.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::permission::Permission;
use crate::runner::{self, DependencyResolver};
use crate::script::Analyzer;
use crate::tool::dynamic::DynamicToolRecord;
use crate::tool::{Tool, ToolResult};

/// Checks whether a tool with this name is already known (e.g. against the
/// in-process registry or the persisted one). When `true`, `RegisterTool`
/// makes no filesystem changes (§8 invariant 4, dedup idempotence).
pub type ToolExistsFn = dyn Fn(&str) -> bool + Send + Sync;

/// Human-in-the-loop review gate. Returning `false` blocks registration
/// (§4.5 step 6) after the script has already passed static analysis.
pub type OnToolRegisterFn =
    dyn Fn(&str, Permission, &str) -> bool + Send + Sync;

/// Called once registration succeeds, handing the caller the constructed
/// [`DynamicToolRecord`] so it can be added to the in-process registry and
/// persisted.
pub type OnRegisterFn = dyn Fn(DynamicToolRecord) + Send + Sync;

pub struct RegisterToolTool {
    workspace_root: PathBuf,
    script_extension: String,
    resolver: Arc<dyn DependencyResolver>,
    analyzer: Arc<dyn Analyzer>,
    tool_exists: Option<Box<ToolExistsFn>>,
    on_tool_register: Option<Box<OnToolRegisterFn>>,
    on_register: Option<Box<OnRegisterFn>>,
}

impl RegisterToolTool {
    pub fn new(
        workspace_root: PathBuf,
        script_extension: impl Into<String>,
        resolver: Arc<dyn DependencyResolver>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            workspace_root,
            script_extension: script_extension.into(),
            resolver,
            analyzer,
            tool_exists: None,
            on_tool_register: None,
            on_register: None,
        }
    }

    pub fn with_tool_exists(mut self, f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.tool_exists = Some(Box::new(f));
        self
    }

    pub fn with_on_tool_register(
        mut self,
        f: impl Fn(&str, Permission, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.on_tool_register = Some(Box::new(f));
        self
    }

    pub fn with_on_register(mut self, f: impl Fn(DynamicToolRecord) + Send + Sync + 'static) -> Self {
        self.on_register = Some(Box::new(f));
        self
    }

    fn valid_permissions_message() -> String {
        format!(
            "unknown permission; valid tiers are: {}",
            Permission::ALL
                .iter()
                .map(|p| p.slug())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

#[async_trait]
impl Tool for RegisterToolTool {
    fn name(&self) -> &str {
        "register_tool"
    }

    fn description(&self) -> &str {
        "Writes, statically analyzes, and registers a new tool backed by a script."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "permission": {"type": "string"},
                "input_schema": {"type": "object"},
                "code": {"type": "string"}
            },
            "required": ["name", "description", "permission", "input_schema", "code"]
        })
    }

    fn permission(&self) -> Permission {
        // Registering a tool is itself a compute-tier operation; the *new*
        // tool's own tier is whatever the caller requests.
        Permission::Compute
    }

    async fn execute(&self, input: Value) -> ToolResult {
        // --- Step 1: validate inputs -------------------------------------
        let Some(name) = input.get("name").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: name");
        };
        let Some(description) = input.get("description").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: description");
        };
        let Some(permission_str) = input.get("permission").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: permission");
        };
        let Some(input_schema) = input.get("input_schema").cloned().filter(Value::is_object) else {
            return ToolResult::err("missing required field: input_schema (must be an object)");
        };
        let Some(code) = input.get("code").and_then(Value::as_str).filter(|c| !c.is_empty()) else {
            return ToolResult::err("missing required field: code (must be non-empty)");
        };

        let Some(permission) = Permission::parse(permission_str) else {
            return ToolResult::err(Self::valid_permissions_message());
        };

        // --- Step 2: dedup -------------------------------------------------
        if let Some(tool_exists) = &self.tool_exists {
            if tool_exists(name) {
                return ToolResult::ok(format!(
                    "a tool named `{name}` already exists; call it directly instead of registering it again"
                ));
            }
        }

        // --- Step 3: ensure the tier's runner ------------------------------
        let runner_paths = match runner::ensure(&self.workspace_root, permission, self.resolver.as_ref())
        {
            Ok(p) => p,
            Err(e) => return ToolResult::err(format!("preparing runner environment: {e}")),
        };

        // --- Step 4: write the script --------------------------------------
        let script_path = runner_paths.script_path(name, &self.script_extension);
        if let Some(parent) = script_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(format!("creating tools directory: {e}"));
            }
        }
        if let Err(e) = tokio::fs::write(&script_path, code).await {
            return ToolResult::err(format!("writing script: {e}"));
        }

        // --- Step 5: static analysis gate -----------------------------------
        match self.analyzer.analyze(&script_path).await {
            Ok(outcome) if outcome.passed => {}
            Ok(outcome) => {
                let _ = tokio::fs::remove_file(&script_path).await;
                return ToolResult::err(format!("static analysis failed:\n{}", outcome.output));
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&script_path).await;
                return ToolResult::err(format!("running static analyzer: {e}"));
            }
        }

        // --- Step 6: human-in-the-loop review gate ---------------------------
        if let Some(on_tool_register) = &self.on_tool_register {
            if !on_tool_register(name, permission, code) {
                let _ = tokio::fs::remove_file(&script_path).await;
                return ToolResult::err("registration blocked by review gate");
            }
        }

        // --- Step 7: construct descriptor and hand off ------------------------
        let record = DynamicToolRecord::new(name, description, input_schema, permission, script_path.clone());
        if let Some(on_register) = &self.on_register {
            on_register(record);
        }

        ToolResult::ok(format!("registered `{name}` at {}", script_path.display()))
    }
}
