//! Pure extraction-LLM callback surface (§4.10 step 3, §6): `llm(system,
//! user) -> text`. Distinct from `envoy::llm::LlmClient` — consolidation
//! never needs tool-calling, just a system/user prompt pair and raw text
//! back, which the caller is expected to have asked for as JSON.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::SouvenirError;

#[async_trait]
pub trait ExtractionLlm: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, SouvenirError>;
}

/// Fixed-response mock for tests, mirroring `envoy::llm::MockLlm`.
pub struct MockExtractionLlm {
    responses: Mutex<VecDeque<String>>,
}

impl MockExtractionLlm {
    pub fn new(responses: Vec<impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }
}

#[async_trait]
impl ExtractionLlm for MockExtractionLlm {
    async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, SouvenirError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SouvenirError::extraction("MockExtractionLlm exhausted"))
    }
}

/// Strips a `​```json ... ```​` or bare `​``` ... ```​` wrapper, tolerating
/// both (§4.10 step 3: "parse JSON strictly, tolerating fenced-code
/// wrappers"). Falls through to the trimmed input unchanged if there's no
/// fence.
pub fn strip_json_fence(text: &str) -> &str {
    let trimmed = text.trim();
    for prefix in ["```json", "```JSON", "```"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest.strip_suffix("```").unwrap_or(rest).trim();
        }
    }
    trimmed
}

/// Parses `text` as JSON after stripping a fenced-code wrapper, surfacing
/// parse failures as `SouvenirError::Extraction` (§7: "consolidation LLM
/// failures silently skip extraction for that batch").
pub fn parse_fenced_json<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, SouvenirError> {
    let cleaned = strip_json_fence(text);
    serde_json::from_str(cleaned)
        .map_err(|e| SouvenirError::extraction(format!("parsing extraction JSON: {e} (input: {cleaned})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_json_fence_handles_json_tagged_fence() {
        let wrapped = "```json\n[{\"a\":1}]\n```";
        assert_eq!(strip_json_fence(wrapped), "[{\"a\":1}]");
    }

    #[test]
    fn strip_json_fence_handles_bare_fence() {
        let wrapped = "```\n[]\n```";
        assert_eq!(strip_json_fence(wrapped), "[]");
    }

    #[test]
    fn strip_json_fence_passes_through_unwrapped() {
        assert_eq!(strip_json_fence("[]"), "[]");
    }

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Item {
        a: i32,
    }

    #[test]
    fn parse_fenced_json_decodes_wrapped_array() {
        let items: Vec<Item> = parse_fenced_json("```json\n[{\"a\": 7}]\n```").unwrap();
        assert_eq!(items, vec![Item { a: 7 }]);
    }

    #[test]
    fn parse_fenced_json_reports_malformed_input() {
        let result: Result<Vec<Item>, _> = parse_fenced_json("not json");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_extraction_llm_returns_responses_in_order() {
        let llm = MockExtractionLlm::new(vec!["first", "second"]);
        assert_eq!(llm.complete("sys", "user").await.unwrap(), "first");
        assert_eq!(llm.complete("sys", "user").await.unwrap(), "second");
    }
}
