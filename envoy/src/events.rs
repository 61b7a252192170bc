//! `AgentEvent` sum type (§3, §6). Discriminator strings are fixed by the
//! spec and match verbatim via `#[serde(tag = "type", rename_all =
//! "snake_case")]`, the same convention the corpus uses for wire protocol
//! events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::agent::Outcome;
use crate::llm::LlmUsage;

/// One event emitted by the agent loop, in append order, over a
/// `tokio::sync::mpsc` channel (SPEC_FULL.md "Streaming").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AgentStarted {
        timestamp: DateTime<Utc>,
        task: String,
    },
    ToolCallStarted {
        timestamp: DateTime<Utc>,
        tool_name: String,
        tool_use_id: String,
    },
    ToolCallCompleted {
        timestamp: DateTime<Utc>,
        tool_name: String,
        tool_use_id: String,
        is_error: bool,
        duration_ms: u64,
    },
    MessageAdded {
        timestamp: DateTime<Utc>,
        role: &'static str,
    },
    AgentCompleted {
        timestamp: DateTime<Utc>,
        outcome: Outcome,
        iterations: u32,
        usage: LlmUsage,
    },
    AgentError {
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl AgentEvent {
    /// The stable discriminator string from §6, independent of serde's
    /// rename so callers (and tests) can assert on it directly.
    pub fn discriminator(&self) -> &'static str {
        match self {
            AgentEvent::AgentStarted { .. } => "agent_started",
            AgentEvent::ToolCallStarted { .. } => "agent_tool_call_started",
            AgentEvent::ToolCallCompleted { .. } => "agent_tool_call_completed",
            AgentEvent::MessageAdded { .. } => "agent_message_added",
            AgentEvent::AgentCompleted { .. } => "agent_completed",
            AgentEvent::AgentError { .. } => "agent_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminators_match_spec_strings() {
        let ev = AgentEvent::AgentStarted {
            timestamp: Utc::now(),
            task: "x".to_string(),
        };
        assert_eq!(ev.discriminator(), "agent_started");
    }

    #[test]
    fn serializes_with_snake_case_type_tag() {
        let ev = AgentEvent::ToolCallStarted {
            timestamp: Utc::now(),
            tool_name: "read_file".to_string(),
            tool_use_id: "1".to_string(),
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["type"], "agent_tool_call_started");
    }
}
