//! Semaphore-bounded wrappers applying per-store concurrency limits.
//!
//! Pool exhaustion makes callers wait, never fail; that waiting is the
//! backpressure mechanism between the pipeline and the stores.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use sylph_core::{
    ChatModel, ChatRequest, CharacterDefinition, Completion, CoreError, EmotionSample, FactStore,
    MemoryHit, MemoryId, MemoryRecord, MemoryVectors, MetricPoint, MetricsStore, NamedVector,
    PointFilter, RelationshipScores, UserFact, VectorStore,
};
use tokio::sync::{Semaphore, SemaphorePermit};

/// Default concurrent-request limits per backing service
pub mod defaults {
    pub const VECTOR_STORE: usize = 50;
    pub const FACT_STORE: usize = 20;
    pub const METRICS_STORE: usize = 20;
    pub const CHAT_MODEL: usize = 10;
}

async fn acquire(semaphore: &Semaphore) -> sylph_core::Result<SemaphorePermit<'_>> {
    semaphore
        .acquire()
        .await
        .map_err(|_| CoreError::Fatal("connection limiter closed".into()))
}

/// Bounded vector store
pub struct BoundedVectorStore {
    inner: Arc<dyn VectorStore>,
    semaphore: Semaphore,
}

impl BoundedVectorStore {
    pub fn new(inner: Arc<dyn VectorStore>, limit: usize) -> Self {
        Self {
            inner,
            semaphore: Semaphore::new(limit),
        }
    }
}

#[async_trait]
impl VectorStore for BoundedVectorStore {
    async fn ensure_collection(&self, collection: &str) -> sylph_core::Result<()> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.ensure_collection(collection).await
    }

    async fn upsert_point(
        &self,
        collection: &str,
        record: &MemoryRecord,
        vectors: &MemoryVectors,
    ) -> sylph_core::Result<()> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.upsert_point(collection, record, vectors).await
    }

    async fn search(
        &self,
        collection: &str,
        vector: NamedVector,
        query: &[f32],
        k: usize,
        filter: &PointFilter,
    ) -> sylph_core::Result<Vec<MemoryHit>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.search(collection, vector, query, k, filter).await
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        k: usize,
    ) -> sylph_core::Result<Vec<MemoryRecord>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.scroll(collection, filter, k).await
    }

    async fn recommend(
        &self,
        collection: &str,
        positive_id: MemoryId,
        negative_filter: &PointFilter,
        k: usize,
    ) -> sylph_core::Result<Vec<MemoryHit>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner
            .recommend(collection, positive_id, negative_filter, k)
            .await
    }

    async fn get_point(
        &self,
        collection: &str,
        id: MemoryId,
    ) -> sylph_core::Result<Option<MemoryRecord>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.get_point(collection, id).await
    }
}

/// Bounded relational store
pub struct BoundedFactStore {
    inner: Arc<dyn FactStore>,
    semaphore: Semaphore,
}

impl BoundedFactStore {
    pub fn new(inner: Arc<dyn FactStore>, limit: usize) -> Self {
        Self {
            inner,
            semaphore: Semaphore::new(limit),
        }
    }
}

#[async_trait]
impl FactStore for BoundedFactStore {
    async fn upsert_fact(&self, fact: &UserFact) -> sylph_core::Result<()> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.upsert_fact(fact).await
    }

    async fn facts_for_user(
        &self,
        user_id: &str,
        character_id: &str,
        min_confidence: f32,
        min_temporal_weight: f32,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner
            .facts_for_user(user_id, character_id, min_confidence, min_temporal_weight, limit)
            .await
    }

    async fn search_entities(
        &self,
        user_id: &str,
        character_id: &str,
        query: &str,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner
            .search_entities(user_id, character_id, query, limit)
            .await
    }

    async fn related_entities(
        &self,
        user_id: &str,
        character_id: &str,
        entity_name: &str,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner
            .related_entities(user_id, character_id, entity_name, limit)
            .await
    }

    async fn get_relationship(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> sylph_core::Result<Option<RelationshipScores>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.get_relationship(user_id, character_id).await
    }

    async fn put_relationship(
        &self,
        user_id: &str,
        character_id: &str,
        scores: &RelationshipScores,
    ) -> sylph_core::Result<()> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.put_relationship(user_id, character_id, scores).await
    }

    async fn get_character(
        &self,
        character_id: &str,
    ) -> sylph_core::Result<Option<CharacterDefinition>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.get_character(character_id).await
    }

    async fn put_character(&self, definition: &CharacterDefinition) -> sylph_core::Result<()> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.put_character(definition).await
    }
}

/// Bounded metrics store
pub struct BoundedMetricsStore {
    inner: Arc<dyn MetricsStore>,
    semaphore: Semaphore,
}

impl BoundedMetricsStore {
    pub fn new(inner: Arc<dyn MetricsStore>, limit: usize) -> Self {
        Self {
            inner,
            semaphore: Semaphore::new(limit),
        }
    }
}

#[async_trait]
impl MetricsStore for BoundedMetricsStore {
    async fn write(&self, point: MetricPoint) -> sylph_core::Result<()> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.write(point).await
    }

    async fn bot_emotion_series(
        &self,
        character_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> sylph_core::Result<Vec<EmotionSample>> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.bot_emotion_series(character_id, user_id, since).await
    }
}

/// Bounded chat model
pub struct BoundedChatModel {
    inner: Arc<dyn ChatModel>,
    semaphore: Semaphore,
}

impl BoundedChatModel {
    pub fn new(inner: Arc<dyn ChatModel>, limit: usize) -> Self {
        Self {
            inner,
            semaphore: Semaphore::new(limit),
        }
    }
}

#[async_trait]
impl ChatModel for BoundedChatModel {
    async fn complete(&self, request: ChatRequest) -> sylph_core::Result<Completion> {
        let _permit = acquire(&self.semaphore).await?;
        self.inner.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sylph_pod_memory::InMemoryMetricsStore;

    struct SlowModel {
        concurrent: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for SlowModel {
        async fn complete(&self, _request: ChatRequest) -> sylph_core::Result<Completion> {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            Ok(Completion {
                text: "ok".into(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn test_bound_limits_concurrency() {
        let model = Arc::new(SlowModel {
            concurrent: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let bounded = Arc::new(BoundedChatModel::new(model.clone(), 2));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let bounded = bounded.clone();
            handles.push(tokio::spawn(async move {
                bounded
                    .complete(ChatRequest {
                        messages: vec![],
                        model: "m".into(),
                        temperature: 0.7,
                        max_tokens: 16,
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(model.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_bounded_store_passes_through() {
        let store = Arc::new(InMemoryMetricsStore::new());
        let bounded = BoundedMetricsStore::new(store.clone(), 1);
        bounded
            .write(MetricPoint {
                measurement: "quality",
                tags: vec![],
                fields: vec![("engagement_score", 0.5)],
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.count_for("quality").await, 1);
    }
}
