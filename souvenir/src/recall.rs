//! Unified Hybrid Recall (§4.11): fuses full-text, vector, and entity-graph
//! signals across the shared memory store into one ranked, threshold-cut,
//! budget-trimmed result list.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::embedder::Embedder;
use crate::entity::EntityExtractor;
use crate::error::SouvenirError;
use crate::memory::{EnvironmentalCategory, MemoryKind, StoredMemory};
use crate::store::{environmental_category, SqliteMemoryStore};

/// Per-signal weights fused into a candidate's raw score (§4.11 step 2).
#[derive(Debug, Clone, Copy)]
pub struct RecallWeights {
    pub fts: f64,
    pub vec: f64,
    pub entity: f64,
}

impl Default for RecallWeights {
    fn default() -> Self {
        Self { fts: 0.3, vec: 0.5, entity: 0.2 }
    }
}

/// Per-kind recency decay rate (`λ` in `exp(-λ·ageDays)`) and result cap.
#[derive(Debug, Clone)]
pub struct RecallConfig {
    pub weights: RecallWeights,
    pub threshold: f64,
    pub top_k_per_kind: HashMap<MemoryKind, usize>,
    pub default_top_k: usize,
    pub recency_lambda: HashMap<MemoryKind, f64>,
    pub default_recency_lambda: f64,
    pub category_weights: HashMap<EnvironmentalCategory, f64>,
    /// How many raw candidates each signal source contributes before fusion.
    pub candidate_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        let mut category_weights = HashMap::new();
        category_weights.insert(EnvironmentalCategory::Capability, 1.0);
        category_weights.insert(EnvironmentalCategory::Constraint, 1.1);
        category_weights.insert(EnvironmentalCategory::Environment, 0.9);
        category_weights.insert(EnvironmentalCategory::Pattern, 1.0);
        Self {
            weights: RecallWeights::default(),
            threshold: 0.15,
            top_k_per_kind: HashMap::new(),
            default_top_k: 10,
            recency_lambda: HashMap::new(),
            default_recency_lambda: 0.05,
            category_weights,
            candidate_limit: 50,
        }
    }
}

impl RecallConfig {
    fn top_k_for(&self, kind: MemoryKind) -> usize {
        self.top_k_per_kind.get(&kind).copied().unwrap_or(self.default_top_k)
    }

    fn lambda_for(&self, kind: MemoryKind) -> f64 {
        self.recency_lambda.get(&kind).copied().unwrap_or(self.default_recency_lambda)
    }

    fn category_weight(&self, category: Option<EnvironmentalCategory>) -> f64 {
        category
            .and_then(|c| self.category_weights.get(&c).copied())
            .unwrap_or(1.0)
    }
}

/// Optional token-budget trim over the ranked result (§4.11 step 4).
pub struct RecallBudget {
    pub max_tokens: usize,
    pub count_tokens: Arc<dyn Fn(&str) -> usize + Send + Sync>,
}

impl RecallBudget {
    pub fn char_estimate(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            count_tokens: Arc::new(|text: &str| text.chars().count() / 4),
        }
    }
}

/// Per-signal breakdown kept alongside the fused score, so callers (and
/// tests) can see which signal actually surfaced a candidate — e.g. a
/// semantic match with fts contribution ≈ 0.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalBreakdown {
    pub fts: f64,
    pub vec: f64,
    pub entity: f64,
}

/// One recalled memory plus its fused score and signal breakdown.
#[derive(Debug, Clone)]
pub struct LabeledRecall {
    pub memory: StoredMemory,
    pub score: f64,
    pub signals: SignalBreakdown,
}

pub struct HybridRecall {
    store: Arc<SqliteMemoryStore>,
    embedder: Arc<dyn Embedder>,
    entity_extractor: Arc<dyn EntityExtractor>,
    config: RecallConfig,
}

impl HybridRecall {
    pub fn new(
        store: Arc<SqliteMemoryStore>,
        embedder: Arc<dyn Embedder>,
        entity_extractor: Arc<dyn EntityExtractor>,
        config: RecallConfig,
    ) -> Self {
        Self { store, embedder, entity_extractor, config }
    }

    /// Runs the full pipeline: candidate generation, fusion, cutoff + rank,
    /// optional budget trim, and access-stat bump (§4.11).
    pub async fn recall(
        &self,
        query: &str,
        kind_filter: Option<MemoryKind>,
        budget: Option<&RecallBudget>,
    ) -> Result<Vec<LabeledRecall>, SouvenirError> {
        let fts_raw = self.store.fts_candidates(query, self.config.candidate_limit).await?;
        let query_vector = self.embedder.embed(&[query]).await?.into_iter().next().unwrap_or_default();
        let vec_raw = self.store.vector_candidates(&query_vector, self.config.candidate_limit).await?;

        let query_entities = self.entity_extractor.extract(query);
        let mut entity_hit_counts: HashMap<String, usize> = HashMap::new();
        for entity in &query_entities {
            for id in self.store.memories_for_entity(entity).await? {
                *entity_hit_counts.entry(id).or_insert(0) += 1;
            }
        }

        // `fts_raw` is an unbounded BM25-derived score (`-bm25`), so min-max
        // normalizing it into [0, 1] is the only way to compare it across
        // queries. `vec_raw` is `1/(1+distance)`, already in `(0, 1]` — it
        // must be consumed as-is. Min-max normalizing it would force the best
        // candidate in *any* non-empty store to 1.0 regardless of how
        // dissimilar it actually is to the query, making the recall
        // threshold unable to reject an unrelated store (§8 S6).
        let fts_norm = normalize_min_max(&fts_raw);
        let vec_norm: HashMap<String, f64> =
            vec_raw.iter().map(|c| (c.id.clone(), c.raw_score)).collect();
        let max_entity_hits = entity_hit_counts.values().copied().max().unwrap_or(0).max(1) as f64;

        let mut candidate_ids: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for id in fts_norm.keys().chain(vec_norm.keys()).chain(entity_hit_counts.keys()) {
            if seen.insert(id.clone()) {
                candidate_ids.push(id.clone());
            }
        }

        let now = Utc::now();
        let mut scored: Vec<LabeledRecall> = Vec::new();
        for id in candidate_ids {
            let Some(memory) = self.store.get(&id).await? else { continue };
            if !memory.is_active() {
                continue;
            }
            if let Some(kind) = kind_filter {
                if memory.kind != kind {
                    continue;
                }
            }

            let signals = SignalBreakdown {
                fts: fts_norm.get(&id).copied().unwrap_or(0.0),
                vec: vec_norm.get(&id).copied().unwrap_or(0.0),
                entity: entity_hit_counts.get(&id).map(|n| *n as f64 / max_entity_hits).unwrap_or(0.0),
            };

            let weights = self.config.weights;
            let mut score = signals.fts * weights.fts + signals.vec * weights.vec + signals.entity * weights.entity;

            let age_days = (now - memory.updated_at).num_seconds() as f64 / 86_400.0;
            let recency = (-self.config.lambda_for(memory.kind) * age_days.max(0.0)).exp();
            score *= memory.importance * recency;
            score *= self.config.category_weight(environmental_category(&memory));

            scored.push(LabeledRecall { memory, score, signals });
        }

        scored.retain(|r| r.score >= self.config.threshold);
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.importance.partial_cmp(&a.memory.importance).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.memory.updated_at.cmp(&a.memory.updated_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });

        let mut per_kind_count: HashMap<MemoryKind, usize> = HashMap::new();
        scored.retain(|r| {
            let count = per_kind_count.entry(r.memory.kind).or_insert(0);
            let keep = *count < self.config.top_k_for(r.memory.kind);
            *count += 1;
            keep
        });

        if let Some(budget) = budget {
            let mut used = 0usize;
            let mut trimmed = Vec::new();
            for r in scored {
                let cost = (budget.count_tokens)(&r.memory.content);
                if used + cost > budget.max_tokens && !trimmed.is_empty() {
                    break;
                }
                used += cost;
                trimmed.push(r);
            }
            scored = trimmed;
        }

        let ids: Vec<String> = scored.iter().map(|r| r.memory.id.clone()).collect();
        self.store.bump_access_stats(&ids, now).await?;

        Ok(scored)
    }
}

/// Min-max normalizes raw signal scores into `[0, 1]`. When every candidate
/// has the same raw score (including the single-candidate case), all map to
/// `1.0` rather than dividing by zero.
fn normalize_min_max(raw: &[crate::store::RawCandidate]) -> HashMap<String, f64> {
    if raw.is_empty() {
        return HashMap::new();
    }
    let min = raw.iter().map(|c| c.raw_score).fold(f64::INFINITY, f64::min);
    let max = raw.iter().map(|c| c.raw_score).fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    raw.iter()
        .map(|c| {
            let normalized = if span <= f64::EPSILON { 1.0 } else { (c.raw_score - min) / span };
            (c.id.clone(), normalized)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::MockEmbedder;
    use crate::entity::HeuristicEntityExtractor;
    use crate::memory::{DurableFact, MemoryMetadata, MemoryStatus};

    fn new_memory(id: &str, content: &str, importance: f64, entities: Vec<String>) -> StoredMemory {
        let now = Utc::now();
        StoredMemory {
            id: id.to_string(),
            content: content.to_string(),
            kind: MemoryKind::Durable,
            importance,
            source_episode_ids: vec![],
            entities: entities.clone(),
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            status: MemoryStatus::Active,
            embedding: None,
            metadata: MemoryMetadata::Durable(DurableFact { entities }),
        }
    }

    async fn recall_with(config: RecallConfig) -> (Arc<SqliteMemoryStore>, HybridRecall) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recall.db");
        std::mem::forget(dir);
        let embedder = Arc::new(MockEmbedder::new(32));
        let store = Arc::new(SqliteMemoryStore::new(path, embedder.clone()).unwrap());
        let recall = HybridRecall::new(store.clone(), embedder, Arc::new(HeuristicEntityExtractor::new()), config);
        (store, recall)
    }

    #[tokio::test]
    async fn results_satisfy_threshold_and_are_sorted_descending() {
        let (store, recall) = recall_with(RecallConfig { threshold: 0.01, ..Default::default() }).await;
        store.upsert(new_memory("m1", "the user prefers dark mode interfaces", 0.9, vec![])).await.unwrap();
        store.upsert(new_memory("m2", "unrelated spreadsheet content about finance", 0.3, vec![])).await.unwrap();

        let hits = recall.recall("dark mode interfaces", None, None).await.unwrap();
        assert!(hits.iter().all(|h| h.score >= 0.01));
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn quantum_entanglement_against_unrelated_store_returns_empty() {
        let (store, recall) = recall_with(RecallConfig::default()).await;
        store.upsert(new_memory("m1", "the project uses a postgres database", 0.5, vec![])).await.unwrap();
        store.upsert(new_memory("m2", "deployment runs on kubernetes", 0.5, vec![])).await.unwrap();

        let hits = recall.recall("quantum entanglement", None, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn entity_expansion_surfaces_linked_memory() {
        let (store, recall) = recall_with(RecallConfig { threshold: 0.01, ..Default::default() }).await;
        store
            .upsert(new_memory("m1", "Envoy retries transient upstream failures", 0.6, vec!["Envoy".to_string()]))
            .await
            .unwrap();

        let hits = recall.recall("tell me about Envoy", None, None).await.unwrap();
        assert!(hits.iter().any(|h| h.memory.id == "m1"));
    }

    #[tokio::test]
    async fn kind_filter_excludes_other_kinds() {
        let (store, recall) = recall_with(RecallConfig { threshold: 0.01, ..Default::default() }).await;
        let mut task_memory = new_memory("m1", "finish the onboarding checklist", 0.7, vec![]);
        task_memory.kind = MemoryKind::Task;
        task_memory.metadata = MemoryMetadata::Task(crate::memory::TaskItem {
            session_id: "s1".to_string(),
            completed: false,
        });
        store.upsert(task_memory).await.unwrap();
        store.upsert(new_memory("m2", "durable fact about finishing onboarding", 0.7, vec![])).await.unwrap();

        let hits = recall.recall("finish onboarding", Some(MemoryKind::Durable), None).await.unwrap();
        assert!(hits.iter().all(|h| h.memory.kind == MemoryKind::Durable));
    }

    #[tokio::test]
    async fn access_stats_bumped_for_all_surfaced_ids() {
        let (store, recall) = recall_with(RecallConfig { threshold: 0.01, ..Default::default() }).await;
        store.upsert(new_memory("m1", "the user prefers dark mode interfaces", 0.9, vec![])).await.unwrap();

        let hits = recall.recall("dark mode interfaces", None, None).await.unwrap();
        assert!(!hits.is_empty());
        let reloaded = store.get("m1").await.unwrap().unwrap();
        assert_eq!(reloaded.access_count, 1);
    }

    #[test]
    fn normalize_min_max_maps_equal_scores_to_one() {
        let raw = vec![
            crate::store::RawCandidate { id: "a".into(), raw_score: 2.0 },
            crate::store::RawCandidate { id: "b".into(), raw_score: 2.0 },
        ];
        let normalized = normalize_min_max(&raw);
        assert_eq!(normalized["a"], 1.0);
        assert_eq!(normalized["b"], 1.0);
    }
}
