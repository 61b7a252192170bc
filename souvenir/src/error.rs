//! Error taxonomy for episode storage, consolidation, and recall.
//!
//! Mirrors the five-way split `envoy::EnvoyError` uses, scoped to this
//! crate's own failure surface: bad input to a store or recall call
//! (`Input`), a storage-layer failure (`Storage`), a consolidation-LLM call
//! that returned something unparseable (`Extraction`), and a should-not-happen
//! (`Internal`). Per spec §7, consolidation LLM failures are not fatal to a
//! run — callers that choose to skip extraction on `Extraction` and still
//! apply decay are conforming, not working around a bug.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SouvenirError {
    #[error("input error: {0}")]
    Input(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SouvenirError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<rusqlite::Error> for SouvenirError {
    fn from(e: rusqlite::Error) -> Self {
        SouvenirError::Storage(format!("sqlite: {e}"))
    }
}

impl From<serde_json::Error> for SouvenirError {
    fn from(e: serde_json::Error) -> Self {
        SouvenirError::Storage(format!("json: {e}"))
    }
}

impl From<std::io::Error> for SouvenirError {
    fn from(e: std::io::Error) -> Self {
        SouvenirError::Storage(format!("io: {e}"))
    }
}
