use crate::character::CharacterDefinition;
use crate::emotion::EmotionSample;
use crate::fact::UserFact;
use crate::memory::{MemoryHit, MemoryId, MemoryKind, MemoryRecord, MemoryVectors, NamedVector};
use crate::metrics::MetricPoint;
use crate::relationship::RelationshipScores;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Payload filter applied inside a single character's collection.
///
/// Collections are partitioned per character at the query boundary, so the
/// character never appears here; filtering by it would paper over a wrong
/// collection name.
#[derive(Debug, Clone, Default)]
pub struct PointFilter {
    /// Restrict to one user's points
    pub user_id: Option<String>,

    /// Restrict to one point kind
    pub kind: Option<MemoryKind>,

    /// Full-text style match on the stored user-message content
    pub content_match: Option<String>,
}

impl PointFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            kind: Some(MemoryKind::Conversation),
            content_match: None,
        }
    }
}

/// Vector store holding one collection per character, each point carrying
/// the three named vectors plus the memory payload.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection with the frozen named-vector schema if absent
    async fn ensure_collection(&self, collection: &str) -> crate::Result<()>;

    /// Atomic insert: either all three vectors are stored or the call fails
    async fn upsert_point(
        &self,
        collection: &str,
        record: &MemoryRecord,
        vectors: &MemoryVectors,
    ) -> crate::Result<()>;

    /// Similarity search over one named vector; scores normalized to [0, 1]
    async fn search(
        &self,
        collection: &str,
        vector: NamedVector,
        query: &[f32],
        k: usize,
        filter: &PointFilter,
    ) -> crate::Result<Vec<MemoryHit>>;

    /// Newest-first chronological scan ("what did we just discuss")
    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        k: usize,
    ) -> crate::Result<Vec<MemoryRecord>>;

    /// Points similar to a reference but unlike the negative filter set;
    /// used for contradiction surfacing
    async fn recommend(
        &self,
        collection: &str,
        positive_id: MemoryId,
        negative_filter: &PointFilter,
        k: usize,
    ) -> crate::Result<Vec<MemoryHit>>;

    /// Fetch one point's payload by id
    async fn get_point(
        &self,
        collection: &str,
        id: MemoryId,
    ) -> crate::Result<Option<MemoryRecord>>;
}

/// Relational store for facts, relationship scores, and character
/// definitions
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Deterministic upsert on (user, character, entity, relationship);
    /// confidence and last_mentioned take the maximum
    async fn upsert_fact(&self, fact: &UserFact) -> crate::Result<()>;

    /// Confidence-filtered facts for a pair, effective-weight descending
    async fn facts_for_user(
        &self,
        user_id: &str,
        character_id: &str,
        min_confidence: f32,
        min_temporal_weight: f32,
        limit: usize,
    ) -> crate::Result<Vec<UserFact>>;

    /// Full-text search over entity names
    async fn search_entities(
        &self,
        user_id: &str,
        character_id: &str,
        query: &str,
        limit: usize,
    ) -> crate::Result<Vec<UserFact>>;

    /// Two-hop traversal: facts reachable through shared entities
    async fn related_entities(
        &self,
        user_id: &str,
        character_id: &str,
        entity_name: &str,
        limit: usize,
    ) -> crate::Result<Vec<UserFact>>;

    async fn get_relationship(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> crate::Result<Option<RelationshipScores>>;

    /// Transactional write of the single relationship row for a pair
    async fn put_relationship(
        &self,
        user_id: &str,
        character_id: &str,
        scores: &RelationshipScores,
    ) -> crate::Result<()>;

    async fn get_character(&self, character_id: &str)
        -> crate::Result<Option<CharacterDefinition>>;

    async fn put_character(&self, definition: &CharacterDefinition) -> crate::Result<()>;
}

/// Append-only numeric metrics tagged by character and user.
///
/// Writes are fire-and-forget on the hot path; the single read serves the
/// trajectory analyzer.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn write(&self, point: MetricPoint) -> crate::Result<()>;

    /// Bot-emotion samples for a pair since the given instant, oldest first
    async fn bot_emotion_series(
        &self,
        character_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> crate::Result<Vec<EmotionSample>>;
}
