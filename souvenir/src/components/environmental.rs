//! Environmental observations (§3, §4.10): capability/constraint/environment/
//! pattern items, weighted by category at recall time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::component::{
    apply_decay_sweep, enforce_max_items, find_merge_target, random_id, ConsolidationBudget,
    ConsolidationReport, DecayConfig, MemoryComponent,
};
use crate::episode::{build_transcript, Episode};
use crate::error::SouvenirError;
use crate::extraction::{parse_fenced_json, ExtractionLlm};
use crate::memory::{EnvironmentalCategory, EnvironmentalItem, MemoryKind, MemoryMetadata, MemoryStatus, StoredMemory};
use crate::recall::{HybridRecall, LabeledRecall, RecallBudget};
use crate::store::SqliteMemoryStore;

const SYSTEM_PROMPT: &str = r#"You extract observations about the operating environment from a transcript of agent episodes: what the agent can do (capability), what limits it (constraint), facts about its surroundings (environment), or recurring behavioral patterns worth remembering (pattern). Return a JSON array of objects, each with:
- "content": the observation, in plain prose
- "importance": a number in [0, 1]
- "action": "insert" or "merge" — "merge" if this restates something already known in the same category
- "category": one of "capability", "constraint", "environment", "pattern"

Return ONLY the JSON array, optionally wrapped in a ```json code fence. If nothing is worth keeping, return an empty array."#;

#[derive(Debug, Deserialize)]
struct ExtractedObservation {
    content: String,
    importance: f64,
    action: String,
    category: String,
}

pub struct EnvironmentalComponent {
    store: Arc<SqliteMemoryStore>,
    recall: Arc<HybridRecall>,
    decay: DecayConfig,
}

impl EnvironmentalComponent {
    pub fn new(store: Arc<SqliteMemoryStore>, recall: Arc<HybridRecall>, decay: DecayConfig) -> Self {
        Self { store, recall, decay }
    }
}

#[async_trait]
impl MemoryComponent for EnvironmentalComponent {
    fn kind(&self) -> MemoryKind {
        MemoryKind::Environmental
    }

    async fn consolidate(
        &self,
        episodes: &[Episode],
        llm: &dyn ExtractionLlm,
        budget: ConsolidationBudget,
    ) -> Result<ConsolidationReport, SouvenirError> {
        let now = Utc::now();
        let mut report = ConsolidationReport {
            decayed: apply_decay_sweep(&self.store, MemoryKind::Environmental, &self.decay, now).await?,
            ..Default::default()
        };

        if episodes.is_empty() {
            return Ok(report);
        }

        let transcript = build_transcript(episodes);
        let observations: Vec<ExtractedObservation> = match llm.complete(SYSTEM_PROMPT, &transcript).await {
            Ok(text) => match parse_fenced_json(&text) {
                Ok(items) => items,
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

        for observation in observations {
            let Some(category) = EnvironmentalCategory::parse(&observation.category) else {
                continue;
            };

            if observation.action == "merge" {
                let same_category: Vec<StoredMemory> = self
                    .store
                    .list_active(Some(MemoryKind::Environmental))
                    .await?
                    .into_iter()
                    .filter(|m| matches!(&m.metadata, MemoryMetadata::Environmental(e) if e.category == category))
                    .collect();
                if let Some(target) = find_merge_target(&observation.content, &same_category) {
                    let mut merged = target.clone();
                    merged.importance = merged.importance.max(observation.importance);
                    let mut merged_ids = merged.source_episode_ids.clone();
                    for id in &source_episode_ids {
                        if !merged_ids.contains(id) {
                            merged_ids.push(*id);
                        }
                    }
                    merged.source_episode_ids = merged_ids;
                    merged.updated_at = now;
                    self.store.upsert(merged).await?;
                    report.merged += 1;
                    continue;
                }
            }

            let memory = StoredMemory {
                id: random_id(),
                content: observation.content,
                kind: MemoryKind::Environmental,
                importance: observation.importance.clamp(0.0, 1.0),
                source_episode_ids: source_episode_ids.clone(),
                entities: vec![],
                created_at: now,
                updated_at: now,
                last_accessed: None,
                access_count: 0,
                status: MemoryStatus::Active,
                embedding: None,
                metadata: MemoryMetadata::Environmental(EnvironmentalItem { category }),
            };
            self.store.upsert(memory).await?;
            report.inserted += 1;
        }

        report.demoted = enforce_max_items(&self.store, MemoryKind::Environmental, budget.max_items).await?;
        Ok(report)
    }

    async fn recall(&self, query: &str, budget: Option<&RecallBudget>) -> Result<Vec<LabeledRecall>, SouvenirError> {
        self.recall.recall(query, Some(MemoryKind::Environmental), budget).await
    }
}
