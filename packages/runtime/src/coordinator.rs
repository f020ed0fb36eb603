//! Parallel persistence fan-out across the three stores.
//!
//! One memory write is critical (the conversation itself); the structured
//! extraction and the analytic points are best-effort with their own
//! budgets. Per-store failures are isolated: losing one store loses that
//! store's record of the turn, nothing more.

use crate::extraction;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use sylph_core::{
    ChatModel, Embedder, FactStore, IntelligenceBundle, MemoryId, MemoryKind, MemoryRecord,
    MemoryVectors, MetricPoint, MetricsStore, NamedVector, QualityFields, Turn, UserFact,
    VectorStore,
};
use sylph_pod_memory::MemoryRetriever;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Budget for the structured-extraction model call
const EXTRACTION_BUDGET: Duration = Duration::from_secs(5);

/// How long commit waits for the non-critical writes before returning
const DRAIN_BUDGET: Duration = Duration::from_secs(2);

type PairKey = (String, String);

/// Coordinates the phase-9 fan-out and the episodic learning write
pub struct PersistenceCoordinator {
    vectors: Arc<dyn VectorStore>,
    facts: Arc<dyn FactStore>,
    metrics: Arc<dyn MetricsStore>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    retriever: Arc<MemoryRetriever>,
    extraction_model: String,
    /// Serializes same-pair commits so later turns observe earlier writes
    pair_locks: Mutex<HashMap<PairKey, Arc<Mutex<()>>>>,
}

impl PersistenceCoordinator {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        facts: Arc<dyn FactStore>,
        metrics: Arc<dyn MetricsStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        retriever: Arc<MemoryRetriever>,
        extraction_model: impl Into<String>,
    ) -> Self {
        Self {
            vectors,
            facts,
            metrics,
            embedder,
            chat,
            retriever,
            extraction_model: extraction_model.into(),
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn pair_lock(&self, turn: &Turn) -> Arc<Mutex<()>> {
        let key = (turn.user_id.clone(), turn.character_id.clone());
        self.pair_locks
            .lock()
            .await
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist one completed turn.
    ///
    /// Returns once the conversation memory is confirmed in the vector
    /// store; the extraction and metric writes get a short drain window and
    /// their failures are recorded, not surfaced.
    pub async fn commit(
        &self,
        collection: &str,
        turn: &Turn,
        bundle: &IntelligenceBundle,
        response_text: &str,
    ) -> sylph_core::Result<MemoryId> {
        let lock = self.pair_lock(turn).await;
        let _serialized = lock.lock().await;

        let record = self.build_record(turn, bundle, response_text);
        let memory_id = record.id;

        // Non-critical writes start immediately and run concurrently with
        // the critical one
        let extraction_handle = tokio::spawn({
            let facts = self.facts.clone();
            let chat = self.chat.clone();
            let retriever = self.retriever.clone();
            let vectors_degraded = bundle.memories.degraded;
            let extraction_model = self.extraction_model.clone();
            let turn = turn.clone();
            let response_text = response_text.to_string();
            let collection = collection.to_string();
            async move {
                Self::extract_and_store(
                    facts,
                    chat,
                    retriever,
                    &extraction_model,
                    &collection,
                    &turn,
                    &response_text,
                    memory_id,
                    vectors_degraded,
                )
                .await
            }
        });

        let metrics_handle = tokio::spawn({
            let metrics = self.metrics.clone();
            let turn = turn.clone();
            let bundle = bundle.clone();
            let response_text = response_text.to_string();
            async move { Self::write_metrics(metrics, &turn, &bundle, &response_text).await }
        });

        // The critical write: the conversation must land in the vector store
        let vectors = self.embed_record(&record).await?;
        self.vectors
            .upsert_point(collection, &record, &vectors)
            .await?;
        debug!("Conversation memory {} confirmed in {}", memory_id, collection);

        // Drain the side writes briefly; they may legitimately outlive us
        if timeout(DRAIN_BUDGET, extraction_handle).await.is_err() {
            warn!("Fact extraction still in flight after drain budget");
        }
        if timeout(DRAIN_BUDGET, metrics_handle).await.is_err() {
            warn!("Metric writes still in flight after drain budget");
        }

        Ok(memory_id)
    }

    /// Phase-10 learning pass: a content-addressed episode record for
    /// emotionally significant turns. Failure is isolated.
    pub async fn record_episode(
        &self,
        collection: &str,
        turn: &Turn,
        bundle: &IntelligenceBundle,
        response_text: &str,
    ) {
        let user_emotion = bundle.user_emotion_or_neutral();
        if user_emotion.emotional_intensity < 0.8 {
            return;
        }

        let mut record = self.build_record(turn, bundle, response_text);
        record.kind = MemoryKind::Episode;
        record.id = Self::content_address(turn, response_text);

        match self.embed_record(&record).await {
            Ok(vectors) => {
                if let Err(e) = self.vectors.upsert_point(collection, &record, &vectors).await {
                    warn!("Episode write failed: {}", e);
                } else {
                    info!("Recorded significant episode {}", record.id);
                }
            }
            Err(e) => warn!("Episode embedding failed: {}", e),
        }
    }

    fn content_address(turn: &Turn, response_text: &str) -> Uuid {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(turn.user_id.as_bytes());
        hasher.update(turn.character_id.as_bytes());
        hasher.update(turn.content.as_bytes());
        hasher.update(response_text.as_bytes());
        let digest = hasher.finalize();
        Uuid::from_slice(&digest[..16]).unwrap_or_else(|_| Uuid::new_v4())
    }

    /// Identity of the turn itself, independent of the generated response
    fn turn_address(turn: &Turn) -> Uuid {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(turn.user_id.as_bytes());
        hasher.update(turn.character_id.as_bytes());
        hasher.update(turn.content.as_bytes());
        hasher.update(turn.received_at.timestamp_micros().to_le_bytes());
        let digest = hasher.finalize();
        Uuid::from_slice(&digest[..16]).unwrap_or_else(|_| Uuid::new_v4())
    }

    fn build_record(
        &self,
        turn: &Turn,
        bundle: &IntelligenceBundle,
        response_text: &str,
    ) -> MemoryRecord {
        let semantic_key = bundle
            .detected_entities
            .first()
            .or_else(|| bundle.detected_topics.first())
            .cloned()
            .unwrap_or_else(|| "general".to_string());

        // Deterministic id: replaying the same turn upserts the same point
        // instead of duplicating it
        let id = Self::turn_address(turn);

        MemoryRecord {
            id,
            user_id: turn.user_id.clone(),
            character_id: turn.character_id.clone(),
            kind: MemoryKind::Conversation,
            content: turn.content.clone(),
            bot_response: response_text.to_string(),
            semantic_key,
            timestamp: turn.received_at,
            user_emotion: bundle.user_emotion_or_neutral(),
            bot_emotion: bundle.bot_emotion.clone(),
        }
    }

    /// The three named embeddings for a record, with the frozen prefixes
    async fn embed_record(&self, record: &MemoryRecord) -> sylph_core::Result<MemoryVectors> {
        let primary = record.user_emotion.primary_emotion.as_str();
        let content_text =
            NamedVector::Content.embedding_text(&record.content, primary, &record.semantic_key);
        let emotion_text =
            NamedVector::Emotion.embedding_text(&record.content, primary, &record.semantic_key);
        let semantic_text =
            NamedVector::Semantic.embedding_text(&record.content, primary, &record.semantic_key);

        let (content, emotion, semantic) = tokio::try_join!(
            self.embedder.embed(&content_text),
            self.embedder.embed(&emotion_text),
            self.embedder.embed(&semantic_text),
        )?;

        let vectors = MemoryVectors {
            content,
            emotion,
            semantic,
        };
        vectors.validate()?;
        Ok(vectors)
    }

    #[allow(clippy::too_many_arguments)]
    async fn extract_and_store(
        facts: Arc<dyn FactStore>,
        chat: Arc<dyn ChatModel>,
        retriever: Arc<MemoryRetriever>,
        extraction_model: &str,
        collection: &str,
        turn: &Turn,
        response_text: &str,
        memory_id: MemoryId,
        skip_contradictions: bool,
    ) {
        let extracted: Vec<UserFact> = match timeout(
            EXTRACTION_BUDGET,
            extraction::extract_facts(chat.as_ref(), extraction_model, turn, response_text),
        )
        .await
        {
            Ok(extracted) => extracted,
            Err(_) => {
                warn!("Fact extraction exceeded its budget, skipping");
                return;
            }
        };

        for fact in &extracted {
            if let Err(e) = facts.upsert_fact(fact).await {
                warn!("Fact upsert failed for '{}': {}", fact.entity_name, e);
                continue;
            }

            // Surface (never block on) prior memories that conflict with
            // the fresh assertion
            if !skip_contradictions {
                let conflicts = retriever
                    .find_contradictions(collection, &turn.user_id, memory_id, &fact.entity_name)
                    .await;
                for conflict in conflicts {
                    info!(
                        "Prior memory {} may contradict new assertion about '{}'",
                        conflict.id, fact.entity_name
                    );
                }
            }
        }
    }

    async fn write_metrics(
        metrics: Arc<dyn MetricsStore>,
        turn: &Turn,
        bundle: &IntelligenceBundle,
        response_text: &str,
    ) {
        let character = turn.character_id.as_str();
        let user = turn.user_id.as_str();

        let mut points = Vec::new();
        if let Some(user_emotion) = &bundle.user_emotion {
            points.push(MetricPoint::user_emotion(character, user, user_emotion));
        }
        if let Some(bot_emotion) = &bundle.bot_emotion {
            points.push(MetricPoint::bot_emotion(character, user, bot_emotion));
        }
        if let Some(confidence) = &bundle.confidence {
            points.push(MetricPoint::confidence(
                character,
                user,
                confidence.context as f64,
                bundle
                    .relationship_state
                    .as_ref()
                    .map(|r| ((r.trust + r.affection + r.attunement) / 3.0) as f64)
                    .unwrap_or(0.5),
                confidence.emotional as f64,
                confidence.overall as f64,
            ));
        }
        points.push(MetricPoint::quality(
            character,
            user,
            &Self::quality_fields(bundle, response_text),
        ));

        for point in points {
            if let Err(e) = metrics.write(point).await {
                warn!("Metric write dropped: {}", e);
            }
        }
    }

    /// Per-turn quality scalars for the analytics stream
    fn quality_fields(bundle: &IntelligenceBundle, response_text: &str) -> QualityFields {
        let user_emotion = bundle.user_emotion_or_neutral();
        let bot_sentiment = bundle
            .bot_emotion
            .as_ref()
            .map(|record| record.sentiment_score)
            .unwrap_or(0.0);

        let words = response_text.split_whitespace().count() as f64;
        let engagement = (words / 40.0).min(1.0);
        let resonance = 1.0 - ((user_emotion.sentiment_score - bot_sentiment).abs() as f64) / 2.0;
        let relevance = if bundle.memories.memories.is_empty() {
            0.5
        } else {
            bundle
                .memories
                .memories
                .iter()
                .map(|memory| memory.similarity as f64)
                .sum::<f64>()
                / bundle.memories.memories.len() as f64
        };
        let flow = if response_text.chars().count() < 4_000 { 0.8 } else { 0.4 };

        QualityFields {
            engagement_score: engagement,
            satisfaction_score: (engagement + resonance) / 2.0,
            natural_flow_score: flow,
            emotional_resonance: resonance,
            topic_relevance: relevance,
        }
    }
}
