//! Engine / Orchestrator (§4.12): ties episodes, consolidation, the three
//! memory stores, and recall together into the surface an agent actually
//! calls.

use std::sync::Arc;

use chrono::Utc;

use crate::component::{random_id, ConsolidationBudget, ConsolidationReport, MemoryComponent};
use crate::components::{DurableComponent, EnvironmentalComponent, TaskComponent};
use crate::episode::{Episode, EpisodeStore, EpisodeType};
use crate::error::SouvenirError;
use crate::extraction::ExtractionLlm;
use crate::memory::{EnvironmentalCategory, EnvironmentalItem, MemoryKind, MemoryMetadata, MemoryStatus, StoredMemory};
use crate::recall::{LabeledRecall, RecallBudget};
use crate::store::SqliteMemoryStore;

/// Static identity/personality/procedure text folded into every
/// `load_context` call, analogous to `AgentConfig::system_prompt`'s "soul" in
/// `envoy` — sourced from external configuration, not derived by the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub identity: Option<String>,
    pub personality: Option<String>,
    pub procedures: Vec<String>,
    pub consolidation_budget: ConsolidationBudget,
}

/// Assembled context for one query, per §4.12 `load_context`.
#[derive(Debug, Clone)]
pub struct LoadedContext {
    pub memories: Vec<LabeledRecall>,
    pub episodes: Vec<Episode>,
    pub identity: Option<String>,
    pub personality: Option<String>,
    pub procedures: Vec<String>,
    pub estimated_tokens: usize,
}

impl LoadedContext {
    fn estimate_tokens(
        memories: &[LabeledRecall],
        episodes: &[Episode],
        identity: &Option<String>,
        personality: &Option<String>,
        procedures: &[String],
    ) -> usize {
        let mut chars = 0usize;
        chars += memories.iter().map(|m| m.memory.content.len()).sum::<usize>();
        chars += episodes.iter().map(|e| e.content.len()).sum::<usize>();
        chars += identity.as_ref().map(|s| s.len()).unwrap_or(0);
        chars += personality.as_ref().map(|s| s.len()).unwrap_or(0);
        chars += procedures.iter().map(|s| s.len()).sum::<usize>();
        chars / 4
    }
}

pub struct Engine {
    episodes: Arc<EpisodeStore>,
    store: Arc<SqliteMemoryStore>,
    durable: DurableComponent,
    task: TaskComponent,
    environmental: EnvironmentalComponent,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        episodes: Arc<EpisodeStore>,
        store: Arc<SqliteMemoryStore>,
        durable: DurableComponent,
        task: TaskComponent,
        environmental: EnvironmentalComponent,
        config: EngineConfig,
    ) -> Self {
        Self { episodes, store, durable, task, environmental, config }
    }

    /// Appends a raw episode (§4.12 `record`). Consolidation is a separate,
    /// explicit step — recording never blocks on an LLM call.
    pub async fn record(
        &self,
        session_id: &str,
        r#type: EpisodeType,
        content: impl Into<String>,
    ) -> Result<i64, SouvenirError> {
        self.episodes.record(session_id, r#type, content).await
    }

    /// No-op batching hook (§4.12): present so callers can flush any
    /// buffered episode writes before consolidation without the engine
    /// actually needing to buffer anything in this implementation.
    pub async fn flush(&self) -> Result<(), SouvenirError> {
        Ok(())
    }

    /// Fans consolidation out to all three components over every
    /// unconsolidated episode, merging their reports (§4.12).
    pub async fn consolidate(&self, llm: &dyn ExtractionLlm) -> Result<ConsolidationReport, SouvenirError> {
        let episodes = self.episodes.load_unconsolidated().await?;
        let budget = self.config.consolidation_budget;

        let mut report = ConsolidationReport::default();
        report += self.durable.consolidate(&episodes, llm, budget).await?;
        report += self.task.consolidate(&episodes, llm, budget).await?;
        report += self.environmental.consolidate(&episodes, llm, budget).await?;
        Ok(report)
    }

    /// Fans recall out to all three components and merges the results,
    /// highest score first (§4.12).
    pub async fn recall(&self, query: &str, budget: Option<&RecallBudget>) -> Result<Vec<LabeledRecall>, SouvenirError> {
        let mut merged = Vec::new();
        merged.extend(self.durable.recall(query, budget).await?);
        merged.extend(self.task.recall(query, budget).await?);
        merged.extend(self.environmental.recall(query, budget).await?);
        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.importance.partial_cmp(&a.memory.importance).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        Ok(merged)
    }

    /// Assembles `{memories, episodes, identity, personality, procedures,
    /// estimated_tokens}` for one query (§4.12). `session_id`, when given,
    /// scopes the episodes included to that session's raw log.
    pub async fn load_context(
        &self,
        query: &str,
        session_id: Option<&str>,
        budget: Option<&RecallBudget>,
    ) -> Result<LoadedContext, SouvenirError> {
        let memories = self.recall(query, budget).await?;
        let episodes = match session_id {
            Some(id) => self.episodes.load_session(id).await?,
            None => Vec::new(),
        };
        let estimated_tokens = LoadedContext::estimate_tokens(
            &memories,
            &episodes,
            &self.config.identity,
            &self.config.personality,
            &self.config.procedures,
        );
        Ok(LoadedContext {
            memories,
            episodes,
            identity: self.config.identity.clone(),
            personality: self.config.personality.clone(),
            procedures: self.config.procedures.clone(),
            estimated_tokens,
        })
    }

    /// Records a task outcome as a `pattern`-category environmental
    /// observation, for future recall to surface ("last three times we did
    /// X it failed because Y") without going through the LLM-driven
    /// consolidation path (§4.12: "for pattern tracking").
    pub async fn record_outcome(
        &self,
        task_type: &str,
        success: bool,
        session_id: &str,
        notes: Option<&str>,
    ) -> Result<(), SouvenirError> {
        let outcome_word = if success { "succeeded" } else { "failed" };
        let mut content = format!("task `{task_type}` in session {session_id} {outcome_word}");
        if let Some(notes) = notes {
            content.push_str(&format!(": {notes}"));
        }
        let now = Utc::now();
        let memory = StoredMemory {
            id: random_id(),
            content,
            kind: MemoryKind::Environmental,
            importance: if success { 0.4 } else { 0.6 },
            source_episode_ids: vec![],
            entities: vec![],
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            status: MemoryStatus::Active,
            embedding: None,
            metadata: MemoryMetadata::Environmental(EnvironmentalItem { category: EnvironmentalCategory::Pattern }),
        };
        self.store.upsert(memory).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::DecayConfig;
    use crate::embedder::MockEmbedder;
    use crate::entity::HeuristicEntityExtractor;
    use crate::extraction::MockExtractionLlm;
    use crate::recall::{HybridRecall, RecallConfig};

    async fn engine() -> Engine {
        let dir = tempfile::tempdir().unwrap();
        let episodes_path = dir.path().join("episodes.db");
        let memories_path = dir.path().join("memories.db");
        std::mem::forget(dir);
        let episodes = Arc::new(EpisodeStore::new(episodes_path).unwrap());
        let embedder = Arc::new(MockEmbedder::new(16));
        let store = Arc::new(SqliteMemoryStore::new(memories_path, embedder.clone()).unwrap());
        let entity_extractor = Arc::new(HeuristicEntityExtractor::new());
        let recall = Arc::new(HybridRecall::new(
            store.clone(),
            embedder,
            entity_extractor.clone(),
            RecallConfig { threshold: 0.01, ..Default::default() },
        ));
        let durable = DurableComponent::new(store.clone(), recall.clone(), entity_extractor, DecayConfig::default());
        let task = TaskComponent::new(store.clone(), recall.clone(), DecayConfig::default());
        let environmental = EnvironmentalComponent::new(store.clone(), recall, DecayConfig::default());
        Engine::new(episodes, store, durable, task, environmental, EngineConfig::default())
    }

    #[tokio::test]
    async fn record_then_consolidate_inserts_a_durable_fact() {
        let engine = engine().await;
        engine.record("s1", EpisodeType::UserDirective, "I love rabbits").await.unwrap();
        let llm = MockExtractionLlm::new(vec![
            r#"[{"content": "User loves rabbits", "importance": 0.7, "action": "insert", "entities": []}]"#.to_string(),
            "[]".to_string(),
            "[]".to_string(),
        ]);
        let report = engine.consolidate(&llm).await.unwrap();
        assert_eq!(report.inserted, 1);
    }

    #[tokio::test]
    async fn record_outcome_is_recallable_as_a_pattern() {
        let engine = engine().await;
        engine.record_outcome("deploy", false, "s1", Some("timed out waiting for health check")).await.unwrap();
        let hits = engine.recall("deploy timed out", None).await.unwrap();
        assert!(hits.iter().any(|h| h.memory.content.contains("deploy")));
    }

    #[tokio::test]
    async fn load_context_includes_configured_identity() {
        let dir = tempfile::tempdir().unwrap();
        let episodes = Arc::new(EpisodeStore::new(dir.path().join("episodes.db")).unwrap());
        let embedder = Arc::new(MockEmbedder::new(16));
        let store = Arc::new(SqliteMemoryStore::new(dir.path().join("memories.db"), embedder.clone()).unwrap());
        let entity_extractor = Arc::new(HeuristicEntityExtractor::new());
        let recall = Arc::new(HybridRecall::new(store.clone(), embedder, entity_extractor.clone(), RecallConfig::default()));
        let durable = DurableComponent::new(store.clone(), recall.clone(), entity_extractor, DecayConfig::default());
        let task = TaskComponent::new(store.clone(), recall.clone(), DecayConfig::default());
        let environmental = EnvironmentalComponent::new(store.clone(), recall, DecayConfig::default());
        let config = EngineConfig { identity: Some("Envoy".to_string()), ..Default::default() };
        let engine = Engine::new(episodes, store, durable, task, environmental, config);

        let context = engine.load_context("anything", None, None).await.unwrap();
        assert_eq!(context.identity.as_deref(), Some("Envoy"));
    }
}
