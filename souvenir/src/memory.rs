//! `StoredMemory` and the kind-specialized metadata that rides alongside it
//! (§3 "StoredMemory" / "TaskItem / EnvironmentalItem / DurableFact").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which typed store a memory belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Durable,
    Task,
    Environmental,
}

/// Active memories are recall-eligible; decayed ones are excluded (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    Active,
    Decayed,
}

/// Environmental items are tagged with one of these categories (§4.10);
/// recall applies a per-category weight multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentalCategory {
    Capability,
    Constraint,
    Environment,
    Pattern,
}

impl EnvironmentalCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "capability" => Some(Self::Capability),
            "constraint" => Some(Self::Constraint),
            "environment" => Some(Self::Environment),
            "pattern" => Some(Self::Pattern),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Capability => "capability",
            Self::Constraint => "constraint",
            Self::Environment => "environment",
            Self::Pattern => "pattern",
        }
    }
}

/// Kind-specific metadata carried alongside a [`StoredMemory`]. Exactly one
/// variant is populated depending on `StoredMemory::kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MemoryMetadata {
    Durable(DurableFact),
    Task(TaskItem),
    Environmental(EnvironmentalItem),
}

/// Cross-session fact; merge is global, entities feed recall's expansion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurableFact {
    pub entities: Vec<String>,
}

/// Session-scoped item with completion state; merge is within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskItem {
    pub session_id: String,
    pub completed: bool,
}

/// Observation about the operating environment, weighted by category at
/// recall time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalItem {
    pub category: EnvironmentalCategory,
}

/// Unified record across all three kinds (§3). `embedding` is populated at
/// write time by whichever [`crate::embedder::Embedder`] the store is
/// configured with; it is `None` until the first successful embed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMemory {
    pub id: String,
    pub content: String,
    pub kind: MemoryKind,
    pub importance: f64,
    pub source_episode_ids: Vec<i64>,
    pub entities: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub access_count: u32,
    pub status: MemoryStatus,
    pub embedding: Option<Vec<f32>>,
    pub metadata: MemoryMetadata,
}

impl StoredMemory {
    /// Whichever timestamp decay should measure age from (§4.10 step 1:
    /// `last_accessed ?? updated_at`).
    pub fn decay_reference_time(&self) -> DateTime<Utc> {
        self.last_accessed.unwrap_or(self.updated_at)
    }

    pub fn is_active(&self) -> bool {
        self.status == MemoryStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_reference_prefers_last_accessed() {
        let updated = Utc::now() - chrono::Duration::days(10);
        let accessed = Utc::now() - chrono::Duration::days(1);
        let mut memory = sample_memory(updated);
        memory.last_accessed = Some(accessed);
        assert_eq!(memory.decay_reference_time(), accessed);
    }

    #[test]
    fn decay_reference_falls_back_to_updated_at() {
        let updated = Utc::now() - chrono::Duration::days(3);
        let memory = sample_memory(updated);
        assert_eq!(memory.decay_reference_time(), updated);
    }

    fn sample_memory(updated_at: DateTime<Utc>) -> StoredMemory {
        StoredMemory {
            id: "m1".into(),
            content: "content".into(),
            kind: MemoryKind::Durable,
            importance: 0.5,
            source_episode_ids: vec![],
            entities: vec![],
            created_at: updated_at,
            updated_at,
            last_accessed: None,
            access_count: 0,
            status: MemoryStatus::Active,
            embedding: None,
            metadata: MemoryMetadata::Durable(DurableFact::default()),
        }
    }
}
