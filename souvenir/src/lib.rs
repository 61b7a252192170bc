//! # Souvenir
//!
//! A multi-tier agent memory engine: raw episodes are consolidated by an LLM
//! into three typed memory stores (durable facts, task items, environmental
//! observations) with merge-vs-insert decisions and importance decay, and
//! recalled through a unified fan-out scorer that fuses full-text, vector,
//! entity-graph, importance, and recency signals.
//!
//! ## Main modules
//!
//! - [`episode`]: [`episode::Episode`], [`episode::EpisodeStore`] — the
//!   append-only raw event log consolidation consumes.
//! - [`memory`]: [`memory::StoredMemory`] and the kind-specialized
//!   [`memory::DurableFact`] / [`memory::TaskItem`] /
//!   [`memory::EnvironmentalItem`] metadata.
//! - [`store`]: [`store::SqliteMemoryStore`], the dual-table (metadata +
//!   `vec0` + FTS5) persistence layer behind every component.
//! - [`embedder`]: [`embedder::Embedder`] trait, [`embedder::MockEmbedder`].
//! - [`entity`]: [`entity::EntityExtractor`] trait,
//!   [`entity::HeuristicEntityExtractor`].
//! - [`extraction`]: [`extraction::ExtractionLlm`] trait, the pure
//!   `(system, user) -> text` consolidation callback.
//! - [`component`]: the shared [`component::MemoryComponent`] contract, plus
//!   the decay-sweep and Jaccard-merge helpers its three implementations in
//!   [`components`] share.
//! - [`recall`]: [`recall::HybridRecall`], the unified multi-signal scorer.
//! - [`engine`]: [`engine::Engine`], the orchestrator tying episodes,
//!   consolidation, the three stores, and recall together.
//! - [`eval`]: scenario-driven recall scoring with an MRR report.
//! - [`error`]: [`error::SouvenirError`], the error taxonomy.

pub mod component;
pub mod components;
pub mod embedder;
pub mod engine;
pub mod entity;
pub mod episode;
pub mod error;
pub mod eval;
pub mod extraction;
pub mod memory;
pub mod recall;
pub mod store;

pub use component::{ConsolidationBudget, ConsolidationReport, DecayConfig, MemoryComponent};
pub use embedder::Embedder;
pub use engine::{Engine, EngineConfig, LoadedContext};
pub use entity::EntityExtractor;
pub use episode::{Episode, EpisodeStore, EpisodeType};
pub use error::SouvenirError;
pub use eval::{run_eval, EvalReport, EvalScenario, ScenarioResult};
pub use extraction::ExtractionLlm;
pub use memory::{MemoryKind, MemoryStatus, StoredMemory};
pub use recall::{HybridRecall, LabeledRecall, RecallBudget, RecallConfig};
pub use store::SqliteMemoryStore;

#[cfg(feature = "tracing-init")]
/// Initializes a `tracing-subscriber` env-filter subscriber for example and
/// test binaries. The core library never calls this itself.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
