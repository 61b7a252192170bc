//! Error taxonomy for the agent loop, tool registry, and persistence.
//!
//! Aligns variants to the five classes the system distinguishes: a bad
//! request to a tool or the registry (`Input`), a permission or workflow
//! rule violation (`Policy`), a failure while actually doing the work
//! (`Runtime`), a non-retryable failure from the upstream LLM
//! (`Upstream`), and a should-not-happen (`Internal`). Tool-level failures
//! are never let out of `Agent::run` as an `Err` — they're folded into
//! `ToolResult::Err` and reflected back to the model; this type is for
//! everything else.

use thiserror::Error;

/// Error taxonomy for envoy.
#[derive(Debug, Error)]
pub enum EnvoyError {
    /// Schema violation, missing required field, or a path that escapes the
    /// workspace root.
    #[error("input error: {0}")]
    Input(String),

    /// Permission tier mismatch, review gate blocked registration, or a
    /// duplicate tool name.
    #[error("policy error: {0}")]
    Policy(String),

    /// Subprocess timeout/non-zero exit, malformed JSON, or I/O failure.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Non-retryable failure from the upstream LLM (bad request, malformed
    /// response) that terminates a run.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Assertion failure / should-not-happen.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EnvoyError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn policy(msg: impl Into<String>) -> Self {
        Self::Policy(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<rusqlite::Error> for EnvoyError {
    fn from(e: rusqlite::Error) -> Self {
        EnvoyError::Runtime(format!("sqlite: {e}"))
    }
}

impl From<serde_json::Error> for EnvoyError {
    fn from(e: serde_json::Error) -> Self {
        EnvoyError::Runtime(format!("json: {e}"))
    }
}

impl From<std::io::Error> for EnvoyError {
    fn from(e: std::io::Error) -> Self {
        EnvoyError::Runtime(format!("io: {e}"))
    }
}
