//! Message and content-block types exchanged between the agent loop and the
//! upstream LLM (§3 "Message").

use serde::{Deserialize, Serialize};

/// Role of a [`Message`] in the conversation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block within a message's content. Assistant turns carry `Text` and/or
/// `ToolUse`; user turns carry `Text` and/or `ToolResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        id: String,
        output: String,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(id: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        ContentBlock::ToolResult {
            id: id.into(),
            output: output.into(),
            is_error,
        }
    }

    /// Approximate character length of this block, used for the context's
    /// token estimate.
    pub fn char_len(&self) -> usize {
        match self {
            ContentBlock::Text { text } => text.len(),
            ContentBlock::ToolUse { name, input, .. } => name.len() + input.to_string().len(),
            ContentBlock::ToolResult { output, .. } => output.len(),
        }
    }
}

/// A single turn in the conversation. Invariant (§3): every assistant
/// `ToolUse` id is followed — possibly interleaved with sibling tool uses —
/// by exactly one matching user `ToolResult` block before the next assistant
/// turn. The context layer (`crate::context`) is responsible for upholding
/// this; `Message` itself is a plain data carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Message {
            role: Role::Assistant,
            content,
        }
    }

    pub fn user_tool_result(id: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        Message {
            role: Role::User,
            content: vec![ContentBlock::tool_result(id, output, is_error)],
        }
    }

    /// Concatenated text of all `Text` blocks, in order.
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

    /// `ToolUse` blocks in content order.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    /// Total character length across all blocks, used for the context's
    /// `estimated_tokens`.
    pub fn char_len(&self) -> usize {
        self.content.iter().map(ContentBlock::char_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_concatenates_text_blocks_only() {
        let msg = Message::assistant(vec![
            ContentBlock::text("a"),
            ContentBlock::tool_use("1", "t", serde_json::json!({})),
            ContentBlock::text("b"),
        ]);
        assert_eq!(msg.text(), "ab");
    }

    #[test]
    fn tool_uses_preserves_order() {
        let msg = Message::assistant(vec![
            ContentBlock::tool_use("1", "a", serde_json::json!({})),
            ContentBlock::tool_use("2", "b", serde_json::json!({})),
        ]);
        let uses = msg.tool_uses();
        assert_eq!(uses.len(), 2);
        assert_eq!(uses[0].1, "a");
        assert_eq!(uses[1].1, "b");
    }

    #[test]
    fn serde_round_trips_through_json() {
        let msg = Message::user_tool_result("1", "out", false);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.char_len(), msg.char_len());
    }
}
