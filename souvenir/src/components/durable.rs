//! Durable facts (§3, §4.10): cross-session, globally merged, entity-linked.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::component::{
    apply_decay_sweep, enforce_max_items, find_merge_target, random_id, ConsolidationBudget,
    ConsolidationReport, DecayConfig, MemoryComponent,
};
use crate::entity::EntityExtractor;
use crate::episode::{build_transcript, Episode};
use crate::error::SouvenirError;
use crate::extraction::{parse_fenced_json, ExtractionLlm};
use crate::memory::{DurableFact, MemoryKind, MemoryMetadata, MemoryStatus, StoredMemory};
use crate::recall::{HybridRecall, LabeledRecall, RecallBudget};
use crate::store::SqliteMemoryStore;

const SYSTEM_PROMPT: &str = r#"You extract durable, cross-session facts worth remembering long-term about the user, their goals, or their environment. Read the transcript of recent episodes and return a JSON array of objects, each with:
- "content": a single self-contained fact, in plain prose
- "importance": a number in [0, 1]
- "action": "insert" or "merge" — "merge" if this fact refines or restates something already known
- "entities": an array of named entities (people, places, tools, projects) mentioned in the fact

Return ONLY the JSON array, optionally wrapped in a ```json code fence. If nothing durable is worth keeping, return an empty array."#;

#[derive(Debug, Deserialize)]
struct ExtractedFact {
    content: String,
    importance: f64,
    action: String,
    #[serde(default)]
    entities: Vec<String>,
}

pub struct DurableComponent {
    store: Arc<SqliteMemoryStore>,
    recall: Arc<HybridRecall>,
    entity_extractor: Arc<dyn EntityExtractor>,
    decay: DecayConfig,
}

impl DurableComponent {
    pub fn new(
        store: Arc<SqliteMemoryStore>,
        recall: Arc<HybridRecall>,
        entity_extractor: Arc<dyn EntityExtractor>,
        decay: DecayConfig,
    ) -> Self {
        Self { store, recall, entity_extractor, decay }
    }
}

#[async_trait]
impl MemoryComponent for DurableComponent {
    fn kind(&self) -> MemoryKind {
        MemoryKind::Durable
    }

    async fn consolidate(
        &self,
        episodes: &[Episode],
        llm: &dyn ExtractionLlm,
        budget: ConsolidationBudget,
    ) -> Result<ConsolidationReport, SouvenirError> {
        let now = Utc::now();
        let mut report = ConsolidationReport {
            decayed: apply_decay_sweep(&self.store, MemoryKind::Durable, &self.decay, now).await?,
            ..Default::default()
        };

        if episodes.is_empty() {
            return Ok(report);
        }

        let transcript = build_transcript(episodes);
        let facts: Vec<ExtractedFact> = match llm.complete(SYSTEM_PROMPT, &transcript).await {
            Ok(text) => match parse_fenced_json(&text) {
                Ok(facts) => facts,
                Err(_) => {
                    report.extraction_skipped = true;
                    return Ok(report);
                }
            },
            Err(_) => {
                report.extraction_skipped = true;
                return Ok(report);
            }
        };

        let source_episode_ids: Vec<i64> = episodes.iter().map(|e| e.id).collect();

        for fact in facts {
            let mut entities = self.entity_extractor.extract(&fact.content);
            for e in &fact.entities {
                if !entities.iter().any(|existing| existing.eq_ignore_ascii_case(e)) {
                    entities.push(e.clone());
                }
            }

            if fact.action == "merge" {
                let active = self.store.list_active(Some(MemoryKind::Durable)).await?;
                if let Some(target) = find_merge_target(&fact.content, &active) {
                    let mut merged = target.clone();
                    merged.importance = merged.importance.max(fact.importance);
                    let mut merged_ids = merged.source_episode_ids.clone();
                    for id in &source_episode_ids {
                        if !merged_ids.contains(id) {
                            merged_ids.push(*id);
                        }
                    }
                    merged.source_episode_ids = merged_ids;
                    for e in &entities {
                        if !merged.entities.iter().any(|existing| existing.eq_ignore_ascii_case(e)) {
                            merged.entities.push(e.clone());
                        }
                    }
                    merged.metadata = MemoryMetadata::Durable(DurableFact { entities: merged.entities.clone() });
                    merged.updated_at = now;
                    self.store.upsert(merged).await?;
                    report.merged += 1;
                    continue;
                }
            }

            let memory = StoredMemory {
                id: random_id(),
                content: fact.content,
                kind: MemoryKind::Durable,
                importance: fact.importance.clamp(0.0, 1.0),
                source_episode_ids: source_episode_ids.clone(),
                entities: entities.clone(),
                created_at: now,
                updated_at: now,
                last_accessed: None,
                access_count: 0,
                status: MemoryStatus::Active,
                embedding: None,
                metadata: MemoryMetadata::Durable(DurableFact { entities }),
            };
            self.store.upsert(memory).await?;
            report.inserted += 1;
        }

        report.demoted = enforce_max_items(&self.store, MemoryKind::Durable, budget.max_items).await?;
        Ok(report)
    }

    async fn recall(&self, query: &str, budget: Option<&RecallBudget>) -> Result<Vec<LabeledRecall>, SouvenirError> {
        self.recall.recall(query, Some(MemoryKind::Durable), budget).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use crate::entity::HeuristicEntityExtractor;
    use crate::episode::EpisodeType;
    use crate::extraction::MockExtractionLlm;
    use crate::recall::RecallConfig;

    fn episode(id: i64, content: &str) -> Episode {
        Episode {
            id,
            session_id: "s1".to_string(),
            r#type: EpisodeType::Observation,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    async fn component() -> (Arc<SqliteMemoryStore>, DurableComponent) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("durable.db");
        std::mem::forget(dir);
        let embedder = Arc::new(MockEmbedder::new(16));
        let store = Arc::new(SqliteMemoryStore::new(path, embedder.clone()).unwrap());
        let entity_extractor = Arc::new(HeuristicEntityExtractor::new());
        let recall = Arc::new(HybridRecall::new(
            store.clone(),
            embedder,
            entity_extractor.clone(),
            RecallConfig::default(),
        ));
        let component = DurableComponent::new(store.clone(), recall, entity_extractor, DecayConfig::default());
        (store, component)
    }

    #[tokio::test]
    async fn consolidate_inserts_extracted_facts() {
        let (store, component) = component().await;
        let llm = MockExtractionLlm::with_response(
            r#"```json
            [{"content": "User thinks rabbits are the most adorable creatures", "importance": 0.8, "action": "insert", "entities": []}]
            ```"#,
        );
        let report = component
            .consolidate(&[episode(1, "user directive")], &llm, ConsolidationBudget::default())
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        let active = store.list_active(Some(MemoryKind::Durable)).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn consolidate_merges_similar_fact_into_existing() {
        let (store, component) = component().await;
        let now = Utc::now();
        store
            .upsert(StoredMemory {
                id: "existing".into(),
                content: "user prefers dark mode interfaces".into(),
                kind: MemoryKind::Durable,
                importance: 0.4,
                source_episode_ids: vec![1],
                entities: vec![],
                created_at: now,
                updated_at: now,
                last_accessed: None,
                access_count: 0,
                status: MemoryStatus::Active,
                embedding: None,
                metadata: MemoryMetadata::Durable(DurableFact::default()),
            })
            .await
            .unwrap();

        let llm = MockExtractionLlm::with_response(
            r#"[{"content": "user prefers dark mode everywhere", "importance": 0.9, "action": "merge", "entities": []}]"#,
        );
        let report = component
            .consolidate(&[episode(2, "observation")], &llm, ConsolidationBudget::default())
            .await
            .unwrap();
        assert_eq!(report.merged, 1);
        let active = store.list_active(Some(MemoryKind::Durable)).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].importance, 0.9);
        assert!(active[0].source_episode_ids.contains(&2));
    }

    #[tokio::test]
    async fn consolidate_skips_extraction_but_still_decays_on_llm_failure() {
        let (store, component) = component().await;
        let now = Utc::now() - chrono::Duration::days(30);
        store
            .upsert(StoredMemory {
                id: "stale".into(),
                content: "an old fact".into(),
                kind: MemoryKind::Durable,
                importance: 0.1,
                source_episode_ids: vec![],
                entities: vec![],
                created_at: now,
                updated_at: now,
                last_accessed: None,
                access_count: 0,
                status: MemoryStatus::Active,
                embedding: None,
                metadata: MemoryMetadata::Durable(DurableFact::default()),
            })
            .await
            .unwrap();

        let llm = MockExtractionLlm::new(Vec::<String>::new());
        let report = component
            .consolidate(&[episode(1, "x")], &llm, ConsolidationBudget::default())
            .await
            .unwrap();
        assert!(report.extraction_skipped);
        assert_eq!(report.decayed, 1);
    }

    #[tokio::test]
    async fn consolidate_applies_decay_even_with_no_episodes() {
        let (store, component) = component().await;
        let old = Utc::now() - chrono::Duration::days(30);
        store
            .upsert(StoredMemory {
                id: "stale".into(),
                content: "an old fact".into(),
                kind: MemoryKind::Durable,
                importance: 0.01,
                source_episode_ids: vec![],
                entities: vec![],
                created_at: old,
                updated_at: old,
                last_accessed: None,
                access_count: 0,
                status: MemoryStatus::Active,
                embedding: None,
                metadata: MemoryMetadata::Durable(DurableFact::default()),
            })
            .await
            .unwrap();
        let llm = MockExtractionLlm::new(Vec::<String>::new());
        let report = component.consolidate(&[], &llm, ConsolidationBudget::default()).await.unwrap();
        assert_eq!(report.decayed, 1);
        let active = store.list_active(Some(MemoryKind::Durable)).await.unwrap();
        assert!(active.is_empty());
    }
}
