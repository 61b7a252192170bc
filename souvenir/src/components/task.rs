//! Task items (§3, §4.10): session-scoped to-dos with completion state;
//! merge candidates are restricted to the same session.

use std::collections::HashMap;
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
use crate::memory::{MemoryKind, MemoryMetadata, MemoryStatus, StoredMemory, TaskItem};
use crate::recall::{HybridRecall, LabeledRecall, RecallBudget};
use crate::store::SqliteMemoryStore;

const SYSTEM_PROMPT: &str = r#"You extract actionable task items from a transcript of agent episodes for a single session. Return a JSON array of objects, each with:
- "content": a short description of the task
- "importance": a number in [0, 1]
- "action": "insert" or "merge" — "merge" if this restates or updates a task already tracked this session
- "completed": true if the transcript shows this task was finished

Return ONLY the JSON array, optionally wrapped in a ```json code fence. If there are no tasks worth tracking, return an empty array."#;

#[derive(Debug, Deserialize)]
struct ExtractedTask {
    content: String,
    importance: f64,
    action: String,
    #[serde(default)]
    completed: bool,
}

pub struct TaskComponent {
    store: Arc<SqliteMemoryStore>,
    recall: Arc<HybridRecall>,
    decay: DecayConfig,
}

impl TaskComponent {
    pub fn new(store: Arc<SqliteMemoryStore>, recall: Arc<HybridRecall>, decay: DecayConfig) -> Self {
        Self { store, recall, decay }
    }

    async fn consolidate_session(
        &self,
        session_id: &str,
        episodes: &[Episode],
        llm: &dyn ExtractionLlm,
    ) -> Result<ConsolidationReport, SouvenirError> {
        let mut report = ConsolidationReport::default();
        let transcript = build_transcript(episodes);
        let tasks: Vec<ExtractedTask> = match llm.complete(SYSTEM_PROMPT, &transcript).await {
            Ok(text) => match parse_fenced_json(&text) {
                Ok(tasks) => tasks,
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

        let now = Utc::now();
        let source_episode_ids: Vec<i64> = episodes.iter().map(|e| e.id).collect();
        let active_in_session: Vec<StoredMemory> = self
            .store
            .list_active(Some(MemoryKind::Task))
            .await?
            .into_iter()
            .filter(|m| matches!(&m.metadata, MemoryMetadata::Task(t) if t.session_id == session_id))
            .collect();

        for task in tasks {
            if task.action == "merge" {
                if let Some(target) = find_merge_target(&task.content, &active_in_session) {
                    let mut merged = target.clone();
                    merged.importance = merged.importance.max(task.importance);
                    let mut merged_ids = merged.source_episode_ids.clone();
                    for id in &source_episode_ids {
                        if !merged_ids.contains(id) {
                            merged_ids.push(*id);
                        }
                    }
                    merged.source_episode_ids = merged_ids;
                    merged.metadata = MemoryMetadata::Task(TaskItem {
                        session_id: session_id.to_string(),
                        completed: task.completed,
                    });
                    merged.updated_at = now;
                    self.store.upsert(merged).await?;
                    report.merged += 1;
                    continue;
                }
            }

            let memory = StoredMemory {
                id: random_id(),
                content: task.content,
                kind: MemoryKind::Task,
                importance: task.importance.clamp(0.0, 1.0),
                source_episode_ids: source_episode_ids.clone(),
                entities: vec![],
                created_at: now,
                updated_at: now,
                last_accessed: None,
                access_count: 0,
                status: MemoryStatus::Active,
                embedding: None,
                metadata: MemoryMetadata::Task(TaskItem {
                    session_id: session_id.to_string(),
                    completed: task.completed,
                }),
            };
            self.store.upsert(memory).await?;
            report.inserted += 1;
        }

        Ok(report)
    }
}

#[async_trait]
impl MemoryComponent for TaskComponent {
    fn kind(&self) -> MemoryKind {
        MemoryKind::Task
    }

    async fn consolidate(
        &self,
        episodes: &[Episode],
        llm: &dyn ExtractionLlm,
        budget: ConsolidationBudget,
    ) -> Result<ConsolidationReport, SouvenirError> {
        let now = Utc::now();
        let mut report = ConsolidationReport {
            decayed: apply_decay_sweep(&self.store, MemoryKind::Task, &self.decay, now).await?,
            ..Default::default()
        };

        if episodes.is_empty() {
            return Ok(report);
        }

        let mut by_session: HashMap<String, Vec<Episode>> = HashMap::new();
        for episode in episodes {
            by_session.entry(episode.session_id.clone()).or_default().push(episode.clone());
        }

        for (session_id, session_episodes) in &by_session {
            report += self.consolidate_session(session_id, session_episodes, llm).await?;
        }

        report.demoted = enforce_max_items(&self.store, MemoryKind::Task, budget.max_items).await?;
        Ok(report)
    }

    async fn recall(&self, query: &str, budget: Option<&RecallBudget>) -> Result<Vec<LabeledRecall>, SouvenirError> {
        self.recall.recall(query, Some(MemoryKind::Task), budget).await
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

    fn episode(id: i64, session_id: &str, content: &str) -> Episode {
        Episode {
            id,
            session_id: session_id.to_string(),
            r#type: EpisodeType::UserDirective,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    async fn component() -> (Arc<SqliteMemoryStore>, TaskComponent) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.db");
        std::mem::forget(dir);
        let embedder = Arc::new(MockEmbedder::new(16));
        let store = Arc::new(SqliteMemoryStore::new(path, embedder.clone()).unwrap());
        let recall = Arc::new(HybridRecall::new(
            store.clone(),
            embedder,
            Arc::new(HeuristicEntityExtractor::new()),
            RecallConfig::default(),
        ));
        (store.clone(), TaskComponent::new(store, recall, DecayConfig::default()))
    }

    #[tokio::test]
    async fn consolidate_inserts_task_scoped_to_session() {
        let (store, component) = component().await;
        let llm = MockExtractionLlm::with_response(
            r#"[{"content": "write the onboarding doc", "importance": 0.6, "action": "insert", "completed": false}]"#,
        );
        let report = component
            .consolidate(&[episode(1, "s1", "please write onboarding docs")], &llm, ConsolidationBudget::default())
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        let active = store.list_active(Some(MemoryKind::Task)).await.unwrap();
        match &active[0].metadata {
            MemoryMetadata::Task(t) => {
                assert_eq!(t.session_id, "s1");
                assert!(!t.completed);
            }
            _ => panic!("expected task metadata"),
        }
    }

    #[tokio::test]
    async fn merge_only_matches_within_same_session() {
        let (store, component) = component().await;
        let now = Utc::now();
        store
            .upsert(StoredMemory {
                id: "other-session".into(),
                content: "write the onboarding doc".into(),
                kind: MemoryKind::Task,
                importance: 0.5,
                source_episode_ids: vec![],
                entities: vec![],
                created_at: now,
                updated_at: now,
                last_accessed: None,
                access_count: 0,
                status: MemoryStatus::Active,
                embedding: None,
                metadata: MemoryMetadata::Task(TaskItem { session_id: "other".into(), completed: false }),
            })
            .await
            .unwrap();

        let llm = MockExtractionLlm::with_response(
            r#"[{"content": "write the onboarding doc", "importance": 0.7, "action": "merge", "completed": true}]"#,
        );
        let report = component
            .consolidate(&[episode(2, "s1", "finished the onboarding doc")], &llm, ConsolidationBudget::default())
            .await
            .unwrap();
        // No same-session candidate exists, so this is an insert despite action="merge".
        assert_eq!(report.inserted, 1);
        assert_eq!(report.merged, 0);
    }
}
