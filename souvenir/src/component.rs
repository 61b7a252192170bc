//! `MemoryComponent` (§4.10): the shared contract all three kind-specialized
//! stores implement, plus the decay-sweep and Jaccard-merge helpers their
//! `consolidate` methods share.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::SouvenirError;
use crate::memory::{MemoryKind, StoredMemory};
use crate::recall::{LabeledRecall, RecallBudget};
use crate::store::SqliteMemoryStore;

/// Importance decay schedule (§4.10 step 1). `decay_rate` multiplies
/// importance once an item has gone `decay_inactive_period` without access;
/// crossing below `decay_floor_threshold` flips it to `decayed`.
#[derive(Debug, Clone)]
pub struct DecayConfig {
    pub decay_inactive_period: Duration,
    pub decay_rate: f64,
    pub decay_floor_threshold: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            decay_inactive_period: Duration::days(14),
            decay_rate: 0.9,
            decay_floor_threshold: 0.05,
        }
    }
}

/// Caps enforced on insert (§4.10 step 5: "Enforce `max_items` on insert by
/// demoting the lowest-importance active item to `decayed`").
#[derive(Debug, Clone, Copy)]
pub struct ConsolidationBudget {
    pub max_items: usize,
}

impl Default for ConsolidationBudget {
    fn default() -> Self {
        Self { max_items: 500 }
    }
}

/// Tally of what one `consolidate` call did, mergeable across components for
/// `Engine::consolidate`'s fan-out (§4.12).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidationReport {
    pub inserted: usize,
    pub merged: usize,
    pub decayed: usize,
    pub demoted: usize,
    /// Set when the extraction LLM call failed and only decay was applied
    /// (§7: consolidation LLM failures are not fatal; they skip extraction).
    pub extraction_skipped: bool,
}

impl std::ops::AddAssign for ConsolidationReport {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.merged += rhs.merged;
        self.decayed += rhs.decayed;
        self.demoted += rhs.demoted;
        self.extraction_skipped = self.extraction_skipped || rhs.extraction_skipped;
    }
}

/// Shared contract for the three typed memory stores (§4.10).
#[async_trait]
pub trait MemoryComponent: Send + Sync {
    fn kind(&self) -> MemoryKind;

    async fn initialize(&self) -> Result<(), SouvenirError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), SouvenirError> {
        Ok(())
    }

    async fn consolidate(
        &self,
        episodes: &[crate::episode::Episode],
        llm: &dyn crate::extraction::ExtractionLlm,
        budget: ConsolidationBudget,
    ) -> Result<ConsolidationReport, SouvenirError>;

    async fn recall(
        &self,
        query: &str,
        budget: Option<&RecallBudget>,
    ) -> Result<Vec<LabeledRecall>, SouvenirError>;
}

/// Applies decay to every active item of `kind` (§4.10 step 1), run
/// unconditionally at the top of `consolidate` even with an empty episode
/// batch. Returns the count of items that crossed the decay floor.
pub(crate) async fn apply_decay_sweep(
    store: &SqliteMemoryStore,
    kind: MemoryKind,
    config: &DecayConfig,
    now: DateTime<Utc>,
) -> Result<usize, SouvenirError> {
    let items = store.list_active(Some(kind)).await?;
    let mut crossed = 0;
    for item in items {
        let age = now - item.decay_reference_time();
        if age < config.decay_inactive_period {
            continue;
        }
        let new_importance = item.importance * config.decay_rate;
        let decayed = new_importance < config.decay_floor_threshold;
        if decayed {
            crossed += 1;
        }
        store.apply_decay(&item.id, new_importance, decayed).await?;
    }
    Ok(crossed)
}

/// Enforces `max_items` after an insert: while the active count for `kind`
/// exceeds the budget, demote the single lowest-importance active item
/// (§4.10 step 5). Returns the number of demotions performed.
pub(crate) async fn enforce_max_items(
    store: &SqliteMemoryStore,
    kind: MemoryKind,
    max_items: usize,
) -> Result<usize, SouvenirError> {
    let mut demoted = 0;
    loop {
        let mut active = store.list_active(Some(kind)).await?;
        if active.len() <= max_items {
            break;
        }
        active.sort_by(|a, b| {
            a.importance
                .partial_cmp(&b.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let Some(lowest) = active.first() else { break };
        store.apply_decay(&lowest.id, lowest.importance, true).await?;
        demoted += 1;
    }
    Ok(demoted)
}

/// Generates an id without pulling in a UUID crate: enough entropy for
/// within-process uniqueness, matching the session-id style used by
/// `envoy::persistence::session` (random hex).
pub(crate) fn random_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|tok| tok.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Jaccard similarity over tokenized content, used to decide `action="merge"`
/// targets (§4.10 step 4: "find the most similar active item (Jaccard over
/// tokenized content, same category where applicable)").
pub(crate) fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Minimum Jaccard similarity to treat an `action="merge"` item as matching
/// an existing one rather than falling back to an insert. Chosen generously
/// since merge targets are usually near-duplicate phrasings of the same
/// fact.
pub(crate) const MERGE_SIMILARITY_THRESHOLD: f64 = 0.35;

/// Finds the most similar active candidate (by Jaccard over `content`)
/// among `candidates`, above [`MERGE_SIMILARITY_THRESHOLD`].
pub(crate) fn find_merge_target<'a>(
    content: &str,
    candidates: &'a [StoredMemory],
) -> Option<&'a StoredMemory> {
    candidates
        .iter()
        .map(|m| (m, jaccard_similarity(content, &m.content)))
        .filter(|(_, score)| *score >= MERGE_SIMILARITY_THRESHOLD)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(m, _)| m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_identical_strings_is_one() {
        assert_eq!(jaccard_similarity("hello world", "hello world"), 1.0);
    }

    #[test]
    fn jaccard_disjoint_strings_is_zero() {
        assert_eq!(jaccard_similarity("cats and dogs", "quantum entanglement"), 0.0);
    }

    #[test]
    fn jaccard_partial_overlap_between_zero_and_one() {
        let score = jaccard_similarity("the user prefers dark mode", "the user prefers light mode");
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn find_merge_target_picks_highest_similarity_above_threshold() {
        let now = Utc::now();
        let make = |id: &str, content: &str| StoredMemory {
            id: id.to_string(),
            content: content.to_string(),
            kind: MemoryKind::Durable,
            importance: 0.5,
            source_episode_ids: vec![],
            entities: vec![],
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            status: crate::memory::MemoryStatus::Active,
            embedding: None,
            metadata: crate::memory::MemoryMetadata::Durable(crate::memory::DurableFact::default()),
        };
        let candidates = vec![
            make("m1", "user prefers dark mode interfaces"),
            make("m2", "completely unrelated spreadsheet content"),
        ];
        let target = find_merge_target("user prefers dark mode everywhere", &candidates).unwrap();
        assert_eq!(target.id, "m1");
    }

    #[test]
    fn find_merge_target_none_below_threshold() {
        let now = Utc::now();
        let candidate = StoredMemory {
            id: "m1".to_string(),
            content: "completely different topic".to_string(),
            kind: MemoryKind::Durable,
            importance: 0.5,
            source_episode_ids: vec![],
            entities: vec![],
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            status: crate::memory::MemoryStatus::Active,
            embedding: None,
            metadata: crate::memory::MemoryMetadata::Durable(crate::memory::DurableFact::default()),
        };
        assert!(find_merge_target("new unrelated fact about rabbits", &[candidate]).is_none());
    }
}
