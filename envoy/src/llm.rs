//! LLM client abstraction for the agent loop (§4.8, §6).
//!
//! `LlmClient::invoke` is the tool-calling surface the agent loop drives:
//! given the full message log, a system prompt, and the tool catalog, it
//! returns assistant content blocks (text and/or tool-use) plus usage and an
//! error classification that the loop uses for retry/backoff decisions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::{ContentBlock, Message};

/// Token usage for one LLM call, aggregated across a run into
/// `RunResult::token_usage` (SPEC_FULL.md).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl std::ops::AddAssign for LlmUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// A tool's catalog entry as presented to the LLM: name, description, and
/// input schema — the same three fields `Tool` exposes publicly.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCatalogEntry {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One LLM completion: assistant content blocks plus usage.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: LlmUsage,
}

impl LlmResponse {
    /// True when the response carries no tool-use blocks (§4.8 step 5: the
    /// loop terminates with `outcome=completed` in that case).
    pub fn has_tool_uses(&self) -> bool {
        self.content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Classifies an upstream failure as transient (retry with backoff) or not
/// (terminate the run with `outcome=error`), per §4.8 step 2 / §5 "Retry
/// discipline" / §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmFailure {
    /// Timeout, 5xx, or HTTP 429 rate-limit.
    Transient(String),
    /// Any other 4xx, or a malformed response body.
    NonRetryable(String),
}

impl std::fmt::Display for LlmFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmFailure::Transient(m) => write!(f, "transient: {m}"),
            LlmFailure::NonRetryable(m) => write!(f, "non-retryable: {m}"),
        }
    }
}

impl std::error::Error for LlmFailure {}

/// LLM client: given a system prompt, message log, and tool catalog, returns
/// assistant content. Implementations: `MockLlm` here, real providers
/// external to this crate (§1 "Deliberately out of scope").
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolCatalogEntry],
        max_tokens: u32,
    ) -> Result<LlmResponse, LlmFailure>;
}

/// Fixed-response mock for tests.
pub struct MockLlm {
    responses: std::sync::Mutex<std::collections::VecDeque<LlmResponse>>,
}

impl MockLlm {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
        }
    }

    /// Returns a single fixed text response with no tool calls.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![LlmResponse {
            content: vec![ContentBlock::text(text)],
            usage: LlmUsage::default(),
        }])
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn invoke(
        &self,
        _system_prompt: Option<&str>,
        _messages: &[Message],
        _tools: &[ToolCatalogEntry],
        _max_tokens: u32,
    ) -> Result<LlmResponse, LlmFailure> {
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .ok_or_else(|| LlmFailure::NonRetryable("MockLlm exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_llm_returns_responses_in_order() {
        let llm = MockLlm::new(vec![
            LlmResponse {
                content: vec![ContentBlock::text("first")],
                usage: LlmUsage::default(),
            },
            LlmResponse {
                content: vec![ContentBlock::text("second")],
                usage: LlmUsage::default(),
            },
        ]);
        let r1 = llm.invoke(None, &[], &[], 100).await.unwrap();
        let r2 = llm.invoke(None, &[], &[], 100).await.unwrap();
        assert_eq!(r1.text(), "first");
        assert_eq!(r2.text(), "second");
    }

    #[tokio::test]
    async fn mock_llm_errors_when_exhausted() {
        let llm = MockLlm::with_text("only one");
        let _ = llm.invoke(None, &[], &[], 100).await.unwrap();
        let result = llm.invoke(None, &[], &[], 100).await;
        assert!(result.is_err());
    }

    #[test]
    fn has_tool_uses_detects_tool_use_blocks() {
        let response = LlmResponse {
            content: vec![ContentBlock::tool_use("1", "t", serde_json::json!({}))],
            usage: LlmUsage::default(),
        };
        assert!(response.has_tool_uses());
    }
}
