//! `AskUser` seed tool (§4.3, compute tier). Delegates to an injected
//! `ask(question) -> answer` closure — human-in-the-loop input is an
//! external collaborator (e.g. a CLI prompt or UI), not something this
//! crate implements itself.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::permission::Permission;
use crate::tool::{Tool, ToolResult};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type AskFn = dyn Fn(&str) -> BoxFuture<'static, String> + Send + Sync;

pub struct AskUser {
    ask: Box<AskFn>,
}

impl AskUser {
    pub fn new<F, Fut>(ask: F) -> Self
    where
        F: Fn(&str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        Self {
            ask: Box::new(move |q| Box::pin(ask(q))),
        }
    }
}

#[async_trait]
impl Tool for AskUser {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Asks the human operator a question and returns their answer."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"question": {"type": "string"}},
            "required": ["question"]
        })
    }

    fn permission(&self) -> Permission {
        Permission::Compute
    }

    async fn execute(&self, input: Value) -> ToolResult {
        let Some(question) = input.get("question").and_then(Value::as_str) else {
            return ToolResult::err("missing required field: question");
        };

        let answer = (self.ask)(question).await;
        if answer.trim().is_empty() {
            ToolResult::ok("(no response)")
        } else {
            ToolResult::ok(answer)
        }
    }
}
