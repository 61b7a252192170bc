//! The Agent Loop (§4.8): the LLM <-> tool iteration state machine.
//!
//! One `run()` call drives at most `max_iterations` rounds. Each round: ask
//! the LLM for a completion, and if it asked for tools, execute each in
//! order, append a tool-result message per call, and loop; otherwise stop
//! with `Outcome::Completed`. Transient upstream failures
//! (`LlmFailure::Transient`) are retried with exponential backoff before
//! counting against `max_iterations`; non-retryable failures end the run
//! immediately with `Outcome::Error`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::context::Context;
use crate::error::EnvoyError;
use crate::events::AgentEvent;
use crate::llm::{LlmClient, LlmFailure, LlmResponse, LlmUsage, ToolCatalogEntry};
use crate::message::ContentBlock;
use crate::tool::Tool;

/// How the run ended (§4.8 step 5 / §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The LLM produced a completion with no tool-use blocks.
    Completed,
    /// `max_iterations` was reached while the LLM was still requesting tools.
    MaxIterations,
    /// A non-retryable upstream failure, or retries were exhausted.
    Error,
}

/// Per-iteration token accounting, aggregated across the whole run.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl From<LlmUsage> for TokenUsage {
    fn from(u: LlmUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}

/// One tool invocation's record, kept for `RunResult::tool_calls`.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub is_error: bool,
    pub output: String,
    pub duration_ms: u64,
}

/// Final result of `Agent::run`.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub response: String,
    pub outcome: Outcome,
    pub iterations: u32,
    pub duration: Duration,
    pub token_usage: TokenUsage,
    pub tool_calls: Vec<ToolCallRecord>,
    pub error_message: Option<String>,
}

/// Configuration for one `Agent`.
pub struct AgentConfig {
    pub system_prompt: Option<String>,
    pub max_iterations: u32,
    pub max_tokens: u32,
    pub context_max_tokens: usize,
    /// Upper bound on retry attempts for a transient upstream failure within
    /// a single iteration (§5 "Retry discipline").
    pub max_retries: u32,
    /// Base delay for exponential backoff; actual delay is
    /// `base * 2^attempt` plus jitter, per attempt.
    pub retry_base_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 10,
            max_tokens: 4096,
            context_max_tokens: 100_000,
            max_retries: 5,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

/// Callback fired before a tool executes, so a caller can veto or log.
/// Returning `false` skips execution and synthesizes an error tool-result.
pub type OnToolCallFn = dyn Fn(&str, &serde_json::Value) -> bool + Send + Sync;

/// The agent execution loop.
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    config: AgentConfig,
    tools: HashMap<String, Arc<dyn Tool>>,
    context: Context,
    on_tool_call: Option<Box<OnToolCallFn>>,
    events_tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, config: AgentConfig) -> Self {
        let context_max = config.context_max_tokens;
        Self {
            llm,
            config,
            tools: HashMap::new(),
            context: Context::new(context_max),
            on_tool_call: None,
            events_tx: None,
        }
    }

    pub fn with_on_tool_call(mut self, f: impl Fn(&str, &serde_json::Value) -> bool + Send + Sync + 'static) -> Self {
        self.on_tool_call = Some(Box::new(f));
        self
    }

    /// Subscribes to the run's event stream. Must be called before `run`;
    /// only one subscriber is supported per agent (§6 "Streaming").
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events_tx = Some(tx);
        rx
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event);
        }
    }

    fn tool_catalog(&self) -> Vec<ToolCatalogEntry> {
        let mut entries: Vec<_> = self
            .tools
            .values()
            .map(|t| ToolCatalogEntry {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Runs the agent loop to completion for `task`, per §4.8.
    pub async fn run(&mut self, task: impl Into<String>) -> RunResult {
        let task = task.into();
        let started = Instant::now();
        self.emit(AgentEvent::AgentStarted {
            timestamp: Utc::now(),
            task: task.clone(),
        });

        self.context.add_user(task);
        self.emit(AgentEvent::MessageAdded {
            timestamp: Utc::now(),
            role: "user",
        });

        let mut total_usage = TokenUsage::default();
        let mut tool_calls = Vec::new();
        let mut iterations: u32 = 0;

        loop {
            if iterations >= self.config.max_iterations {
                return self.finish(
                    Outcome::MaxIterations,
                    started,
                    iterations,
                    total_usage,
                    tool_calls,
                    None,
                );
            }
            iterations += 1;

            let response = match self.invoke_with_retry().await {
                Ok(r) => r,
                Err(message) => {
                    self.emit(AgentEvent::AgentError {
                        timestamp: Utc::now(),
                        message: message.clone(),
                    });
                    return self.finish(
                        Outcome::Error,
                        started,
                        iterations,
                        total_usage,
                        tool_calls,
                        Some(message),
                    );
                }
            };
            total_usage += response.usage.into();

            if !response.has_tool_uses() {
                self.context.add_assistant(response.content.clone());
                self.emit(AgentEvent::MessageAdded {
                    timestamp: Utc::now(),
                    role: "assistant",
                });
                let text = response.text();
                return self.finish(
                    Outcome::Completed,
                    started,
                    iterations,
                    total_usage,
                    tool_calls,
                    None,
                )
                .with_response(text);
            }

            // Only the reasoning text attached to the *first* tool call of this
            // iteration is kept on the assistant message; later text blocks in
            // the same iteration are dropped from the stored content (§4.8
            // step 3's "reasoning only on first tool call" rule) but tool-use
            // blocks are always preserved in full, in order.
            let assistant_content = Self::first_reasoning_then_tool_uses(&response.content);
            self.context.add_assistant(assistant_content.clone());
            self.emit(AgentEvent::MessageAdded {
                timestamp: Utc::now(),
                role: "assistant",
            });

            for block in &assistant_content {
                let ContentBlock::ToolUse { id, name, input } = block else {
                    continue;
                };
                let record = self.execute_tool_call(id, name, input).await;
                self.context
                    .add_tool_result(record.tool_use_id.clone(), record.output.clone(), record.is_error);
                self.emit(AgentEvent::MessageAdded {
                    timestamp: Utc::now(),
                    role: "user",
                });
                tool_calls.push(record);
            }
        }
    }

    async fn execute_tool_call(
        &self,
        id: &str,
        name: &str,
        input: &serde_json::Value,
    ) -> ToolCallRecord {
        self.emit(AgentEvent::ToolCallStarted {
            timestamp: Utc::now(),
            tool_name: name.to_string(),
            tool_use_id: id.to_string(),
        });
        let start = Instant::now();

        if let Some(gate) = &self.on_tool_call {
            if !gate(name, input) {
                let duration_ms = start.elapsed().as_millis() as u64;
                self.emit(AgentEvent::ToolCallCompleted {
                    timestamp: Utc::now(),
                    tool_name: name.to_string(),
                    tool_use_id: id.to_string(),
                    is_error: true,
                    duration_ms,
                });
                return ToolCallRecord {
                    tool_use_id: id.to_string(),
                    tool_name: name.to_string(),
                    input: input.clone(),
                    is_error: true,
                    output: "tool call vetoed".to_string(),
                    duration_ms,
                };
            }
        }

        let Some(tool) = self.tools.get(name) else {
            let duration_ms = start.elapsed().as_millis() as u64;
            self.emit(AgentEvent::ToolCallCompleted {
                timestamp: Utc::now(),
                tool_name: name.to_string(),
                tool_use_id: id.to_string(),
                is_error: true,
                duration_ms,
            });
            return ToolCallRecord {
                tool_use_id: id.to_string(),
                tool_name: name.to_string(),
                input: input.clone(),
                is_error: true,
                output: format!("unknown tool: {name}"),
                duration_ms,
            };
        };

        let result = if let Some(message) = tool.validate(input) {
            crate::tool::ToolResult::err(message)
        } else {
            tool.execute(input.clone()).await
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        self.emit(AgentEvent::ToolCallCompleted {
            timestamp: Utc::now(),
            tool_name: name.to_string(),
            tool_use_id: id.to_string(),
            is_error: result.is_error(),
            duration_ms,
        });

        ToolCallRecord {
            tool_use_id: id.to_string(),
            tool_name: name.to_string(),
            input: input.clone(),
            is_error: result.is_error(),
            output: result.as_text().to_string(),
            duration_ms,
        }
    }

    /// Keeps all `ToolUse` blocks, but only the first `Text` block in the
    /// response (the reasoning preceding the first tool call).
    fn first_reasoning_then_tool_uses(content: &[ContentBlock]) -> Vec<ContentBlock> {
        let mut out = Vec::new();
        let mut seen_text = false;
        for block in content {
            match block {
                ContentBlock::Text { .. } => {
                    if !seen_text {
                        out.push(block.clone());
                        seen_text = true;
                    }
                }
                ContentBlock::ToolUse { .. } => out.push(block.clone()),
                ContentBlock::ToolResult { .. } => {}
            }
        }
        out
    }

    /// Invokes the LLM, retrying transient failures with exponential backoff
    /// and jitter, bounded by `max_retries`. Non-retryable failures return
    /// immediately.
    async fn invoke_with_retry(&self) -> Result<LlmResponse, String> {
        let tools = self.tool_catalog();
        let mut attempt = 0;
        loop {
            let result = self
                .llm
                .invoke(
                    self.config.system_prompt.as_deref(),
                    self.context.messages(),
                    &tools,
                    self.config.max_tokens,
                )
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(LlmFailure::NonRetryable(message)) => return Err(message),
                Err(LlmFailure::Transient(message)) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(format!(
                            "exhausted {} retries; last error: {message}",
                            self.config.max_retries
                        ));
                    }
                    let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1) + jitter;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn finish(
        &self,
        outcome: Outcome,
        started: Instant,
        iterations: u32,
        token_usage: TokenUsage,
        tool_calls: Vec<ToolCallRecord>,
        error_message: Option<String>,
    ) -> RunResult {
        self.emit(AgentEvent::AgentCompleted {
            timestamp: Utc::now(),
            outcome,
            iterations,
            usage: LlmUsage {
                prompt_tokens: token_usage.prompt_tokens,
                completion_tokens: token_usage.completion_tokens,
                total_tokens: token_usage.total_tokens,
            },
        });
        RunResult {
            response: String::new(),
            outcome,
            iterations,
            duration: started.elapsed(),
            token_usage,
            tool_calls,
            error_message,
        }
    }
}

impl RunResult {
    fn with_response(mut self, text: String) -> Self {
        self.response = text;
        self
    }
}

#[allow(dead_code)]
fn _ensure_error_path_compiles(_: EnvoyError) {}
