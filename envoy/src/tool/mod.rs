//! The [`Tool`] trait and uniform [`ToolResult`] contract (§3, §4.3).
//!
//! Every tool — built-in or [`dynamic::DynamicTool`] — exposes the same
//! surface: a unique name, a human description, an input schema, a
//! permission tier, an optional `validate`, and `execute`. The agent loop
//! (`crate::agent`) routes every tool-use block through this trait and never
//! touches a concrete tool type directly.

pub mod dynamic;
pub mod register;
pub mod seed;

use async_trait::async_trait;
use serde_json::Value;

use crate::permission::Permission;
use crate::schema;

/// Tagged result of a tool execution. Never both `Ok` and `Err` — this is an
/// enum, not a pair of optionals, so that invariant is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Ok { output: String },
    Err { message: String },
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        ToolResult::Ok {
            output: output.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        ToolResult::Err {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Err { .. })
    }

    /// The text to attach to a tool-result content block, regardless of
    /// whether this is the `Ok` or `Err` variant.
    pub fn as_text(&self) -> &str {
        match self {
            ToolResult::Ok { output } => output,
            ToolResult::Err { message } => message,
        }
    }
}

/// Uniform tool contract. Implementors are the unit the agent loop dispatches
/// tool-use blocks to by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name. Invariant: unique within a process and within the
    /// persistent registry (`crate::persistence::registry`).
    fn name(&self) -> &str;

    /// Human description shown to the LLM in the tool catalog.
    fn description(&self) -> &str;

    /// JSON-Schema subset (see `crate::schema`) describing accepted input.
    fn input_schema(&self) -> Value;

    /// Permission tier this tool declares.
    fn permission(&self) -> Permission;

    /// Validates `input` before `execute`. Default implementation runs the
    /// schema validator from `crate::schema` against `input_schema()`;
    /// override only to add tool-specific checks beyond the JSON-Schema
    /// subset (e.g. "exactly one of A or B").
    fn validate(&self, input: &Value) -> Option<String> {
        schema::validate(&self.input_schema(), input).map(|errs| schema::errors_to_message(&errs))
    }

    /// Executes the tool. Implementations must never panic on bad input —
    /// `validate` is expected to have already rejected it, but `execute`
    /// should still degrade to `ToolResult::Err` rather than unwrap.
    async fn execute(&self, input: Value) -> ToolResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_and_err_are_mutually_exclusive_text() {
        assert_eq!(ToolResult::ok("x").as_text(), "x");
        assert_eq!(ToolResult::err("y").as_text(), "y");
        assert!(!ToolResult::ok("x").is_error());
        assert!(ToolResult::err("y").is_error());
    }
}
