//! # Envoy
//!
//! An agent execution loop that interleaves LLM calls with permissioned tool
//! invocations, and lets the agent extend its own capability set at runtime
//! by writing, statically analyzing, and running sandboxed scripts.
//!
//! ## Main modules
//!
//! - [`agent`]: [`Agent`], [`AgentConfig`], [`RunResult`], [`Outcome`] — the
//!   LLM↔tool iteration loop.
//! - [`llm`]: [`llm::LlmClient`] trait, [`llm::MockLlm`], [`llm::LlmResponse`].
//! - [`tool`]: the [`tool::Tool`] trait, [`tool::ToolResult`];
//!   [`tool::seed`] (built-in tools), [`tool::dynamic`] (script-backed
//!   tools), [`tool::register`] ([`tool::register::RegisterToolTool`]).
//! - [`context`]: [`context::Context`], the pruned conversation log.
//! - [`events`]: [`events::AgentEvent`], the streaming observability surface.
//! - [`runner`]: per-permission-tier on-disk dependency environments.
//! - [`script`]: [`script::Interpreter`] and [`script::Analyzer`], the
//!   external process collaborators behind `run_script` and `register_tool`.
//! - [`workspace_guard`]: path containment for every filesystem-touching
//!   tool.
//! - [`permission`], [`schema`], [`message`]: shared vocabulary types.
//! - [`persistence`]: the tool registry, sessions, and messages tables.
//! - [`config`]: optional TOML+env config loader for example/test harnesses.
//! - [`error`]: [`error::EnvoyError`], the error taxonomy.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use envoy::agent::{Agent, AgentConfig};
//! use envoy::llm::MockLlm;
//!
//! # async fn run() {
//! let llm = Arc::new(MockLlm::with_text("hello"));
//! let mut agent = Agent::new(llm, AgentConfig::default());
//! let result = agent.run("say hello").await;
//! assert_eq!(result.response, "hello");
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod llm;
pub mod message;
pub mod permission;
pub mod persistence;
pub mod runner;
pub mod schema;
pub mod script;
pub mod tool;
pub mod workspace_guard;

pub use agent::{Agent, AgentConfig, Outcome, RunResult, TokenUsage, ToolCallRecord};
pub use error::EnvoyError;
pub use events::AgentEvent;
pub use message::{ContentBlock, Message, Role};
pub use permission::Permission;
pub use tool::{Tool, ToolResult};
pub use workspace_guard::WorkspaceGuard;

#[cfg(feature = "tracing-init")]
/// Initializes a `tracing-subscriber` env-filter subscriber for example and
/// test binaries. The core library never calls this itself.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
