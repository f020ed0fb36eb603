//! Memory retrieval over the vector store: named-vector selection, quality
//! scoring, and content-hash deduplication.

use crate::router::QueryIntent;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use sylph_core::{
    Embedder, EmotionRecord, MemoryHit, MemoryId, MemoryRetrieval, NamedVector, PointFilter,
    ScoredMemory, VectorStore,
};
use tracing::{debug, info, warn};

/// How many raw hits to pull before scoring and deduplication
const SEARCH_K: usize = 20;

/// How many memories survive into the prompt
const KEEP_K: usize = 10;

/// Below this many survivors the turn is treated as having no usable history
const MIN_HISTORY: usize = 3;

/// Tunable knobs for quality scoring and deduplication
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Recency decay half-life in days
    pub recency_halflife_days: f32,

    /// Prefix length of the content hash used for deduplication
    pub dedup_prefix_chars: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            recency_halflife_days: 30.0,
            dedup_prefix_chars: 200,
        }
    }
}

/// Retriever over one character's collection
pub struct MemoryRetriever {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrieverConfig,
}

impl MemoryRetriever {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            vectors,
            embedder,
            config,
        }
    }

    /// Deterministic named-vector selection from the classified intent and
    /// the user's emotional intensity
    pub fn select_vector(
        intent: QueryIntent,
        user_emotion: &EmotionRecord,
        has_entity_keywords: bool,
    ) -> NamedVector {
        if intent == QueryIntent::ConversationStyle || user_emotion.emotional_intensity >= 0.7 {
            NamedVector::Emotion
        } else if intent == QueryIntent::FactualRecall && has_entity_keywords {
            NamedVector::Semantic
        } else {
            NamedVector::Content
        }
    }

    /// Quality: similarity dominates, emotion metadata and recency refine
    fn quality_score(&self, hit: &MemoryHit) -> f32 {
        let emotion = &hit.record.user_emotion;
        let emotion_weight = emotion.confidence * emotion.emotional_intensity;

        let age_days = (Utc::now() - hit.record.timestamp).num_seconds().max(0) as f32 / 86_400.0;
        let recency = (-age_days / self.config.recency_halflife_days).exp();

        0.55 * hit.score + 0.25 * emotion_weight + 0.20 * recency
    }

    fn dedup_key(&self, content: &str) -> [u8; 32] {
        let prefix: String = content.chars().take(self.config.dedup_prefix_chars).collect();
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.finalize().into()
    }

    /// Retrieve the best prior memories for a user message.
    ///
    /// Store failures degrade to an empty result; the caller decides what an
    /// empty history means for the prompt.
    pub async fn retrieve(
        &self,
        collection: &str,
        user_id: &str,
        message: &str,
        intent: QueryIntent,
        user_emotion: &EmotionRecord,
        semantic_key: &str,
        has_entity_keywords: bool,
    ) -> MemoryRetrieval {
        let vector = Self::select_vector(intent, user_emotion, has_entity_keywords);
        let query_text = vector.embedding_text(
            message,
            user_emotion.primary_emotion.as_str(),
            semantic_key,
        );

        let query = match self.embedder.embed(&query_text).await {
            Ok(query) => query,
            Err(e) => {
                warn!("Query embedding failed, degrading retrieval: {}", e);
                return MemoryRetrieval::empty_degraded();
            }
        };

        let hits = match self
            .vectors
            .search(
                collection,
                vector,
                &query,
                SEARCH_K,
                &PointFilter::for_user(user_id),
            )
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Memory search failed, degrading retrieval: {}", e);
                return MemoryRetrieval::empty_degraded();
            }
        };

        let mut scored: Vec<ScoredMemory> = hits
            .into_iter()
            .map(|hit| ScoredMemory {
                similarity: hit.score,
                quality: self.quality_score(&hit),
                record: hit.record,
            })
            .collect();
        scored.sort_by(|a, b| b.quality.total_cmp(&a.quality));

        // Near-duplicate turns collapse to the best-scored copy
        let mut seen = Vec::new();
        scored.retain(|memory| {
            let key = self.dedup_key(&memory.record.content);
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        scored.truncate(KEEP_K);

        let no_history = scored.len() < MIN_HISTORY;
        debug!(
            "Retrieved {} memories via {} vector (no_history={})",
            scored.len(),
            vector.name(),
            no_history
        );

        MemoryRetrieval {
            memories: scored,
            degraded: false,
            no_history,
        }
    }

    /// Surface prior memories that contradict a freshly stored assertion.
    ///
    /// Best-effort: failures and empty results are equivalent, and nothing
    /// here blocks the write that already happened.
    pub async fn find_contradictions(
        &self,
        collection: &str,
        user_id: &str,
        new_memory_id: MemoryId,
        entity_name: &str,
    ) -> Vec<MemoryHit> {
        let filter = PointFilter {
            user_id: Some(user_id.to_string()),
            kind: None,
            content_match: Some(entity_name.to_string()),
        };

        match self
            .vectors
            .recommend(collection, new_memory_id, &filter, 5)
            .await
        {
            Ok(hits) => {
                if !hits.is_empty() {
                    info!(
                        "Found {} prior memories overlapping entity '{}'",
                        hits.len(),
                        entity_name
                    );
                }
                hits
            }
            Err(e) => {
                warn!("Contradiction query failed: {}", e);
                Vec::new()
            }
        }
    }
}
