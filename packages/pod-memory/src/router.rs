//! Semantic knowledge routing: classify what a message is asking for and
//! dispatch to the store(s) that can answer it, fusing results when no
//! single store is clearly right.

use crate::retriever::MemoryRetriever;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use sylph_core::{
    EmotionRecord, EmotionSample, FactStore, MemoryRetrieval, MetricsStore, UserFact,
};
use tracing::{debug, warn};

/// What kind of knowledge a message is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    /// "what foods do I like"
    FactualRecall,
    /// "how did we talk about this"
    ConversationStyle,
    /// "how have I been feeling lately"
    TemporalAnalysis,
    /// "tell me about the reef trip"
    EntitySearch,
    /// No dominant signal; fuse all stores
    MultiModal,
}

static TEMPORAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(over time|lately|used to|these days|recently|has (?:my|it) .* changed|trend)\b")
        .expect("temporal pattern")
});

static QUESTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(what|which|who|where|when|do|did|does|am|is|are)\b").expect("question pattern"));

static ENTITY_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(like|love|hate|enjoy|favorite|favourite|prefer|food|foods|hobby|hobbies|job|work|live|family|friend|pet|music|movie|book)s?\b")
        .expect("entity keyword pattern")
});

static CONVERSATION_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(we talked about|we discussed|how did we|last time we|our conversation|what did we)\b")
        .expect("conversation-style pattern")
});

static ENTITY_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(?:about|regarding)\s+(\w[\w\- ]*)|"([^"]+)""#).expect("entity reference pattern"));

static QUANTIFIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(how much|how often|score|level|intensity|count|number of)\b")
        .expect("quantifiable pattern")
});

/// Classify a message. Rules apply in priority order; the first match wins
/// and anything unmatched fuses all stores.
pub fn classify_intent(message: &str) -> QueryIntent {
    if TEMPORAL.is_match(message) {
        QueryIntent::TemporalAnalysis
    } else if QUESTION.is_match(message) && ENTITY_KEYWORDS.is_match(message) {
        QueryIntent::FactualRecall
    } else if CONVERSATION_STYLE.is_match(message) {
        QueryIntent::ConversationStyle
    } else if ENTITY_REFERENCE.is_match(message) {
        QueryIntent::EntitySearch
    } else {
        QueryIntent::MultiModal
    }
}

/// Whether the message carries entity-type keywords, used for named-vector
/// selection
pub fn has_entity_keywords(message: &str) -> bool {
    ENTITY_KEYWORDS.is_match(message)
}

/// The distinct entity-type keywords a message mentions, lowercased in
/// match order
pub fn detect_topics(message: &str) -> Vec<String> {
    let mut topics = Vec::new();
    for found in ENTITY_KEYWORDS.find_iter(message) {
        let topic = found.as_str().to_lowercase();
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    topics
}

/// The explicit entity a message references, if any
pub fn referenced_entity(message: &str) -> Option<String> {
    ENTITY_REFERENCE.captures(message).and_then(|captures| {
        captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().trim().to_string())
    })
}

/// Where a fused item came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeSource {
    /// Relational fact row
    Facts,
    /// Vector conversation memory
    Memories,
}

/// One line of fused knowledge for prompt construction
#[derive(Debug, Clone)]
pub struct FusedItem {
    pub source: KnowledgeSource,
    pub text: String,
}

/// Everything the router gathered for one message
#[derive(Debug, Clone)]
pub struct KnowledgeContext {
    pub intent: QueryIntent,
    pub facts: Vec<UserFact>,
    pub memories: MemoryRetrieval,
    pub trend: Vec<EmotionSample>,
    pub fused: Vec<FusedItem>,
}

impl KnowledgeContext {
    fn new(intent: QueryIntent) -> Self {
        Self {
            intent,
            facts: Vec::new(),
            memories: MemoryRetrieval::default(),
            trend: Vec::new(),
            fused: Vec::new(),
        }
    }
}

/// Intent-directed dispatch across the three stores
pub struct KnowledgeRouter {
    facts: Arc<dyn FactStore>,
    metrics: Arc<dyn MetricsStore>,
    retriever: Arc<MemoryRetriever>,
}

impl KnowledgeRouter {
    pub fn new(
        facts: Arc<dyn FactStore>,
        metrics: Arc<dyn MetricsStore>,
        retriever: Arc<MemoryRetriever>,
    ) -> Self {
        Self {
            facts,
            metrics,
            retriever,
        }
    }

    /// Classify and gather. Individual store failures empty their slot and
    /// never fail the route.
    pub async fn route(
        &self,
        collection: &str,
        user_id: &str,
        character_id: &str,
        message: &str,
        user_emotion: &EmotionRecord,
    ) -> KnowledgeContext {
        let intent = classify_intent(message);
        let entity_keywords = has_entity_keywords(message);
        let semantic_key = referenced_entity(message).unwrap_or_else(|| "general".to_string());
        debug!("Classified message intent as {:?}", intent);

        let mut context = KnowledgeContext::new(intent);

        match intent {
            QueryIntent::FactualRecall => {
                context.facts = self.top_facts(user_id, character_id).await;
                // Facts answer the question; memories supply tone
                context.memories = self
                    .retriever
                    .retrieve(
                        collection,
                        user_id,
                        message,
                        intent,
                        user_emotion,
                        &semantic_key,
                        entity_keywords,
                    )
                    .await;
            }
            QueryIntent::EntitySearch => {
                context.facts = self
                    .entity_facts(user_id, character_id, &semantic_key)
                    .await;
                context.memories = self
                    .retriever
                    .retrieve(
                        collection,
                        user_id,
                        message,
                        intent,
                        user_emotion,
                        &semantic_key,
                        entity_keywords,
                    )
                    .await;
            }
            QueryIntent::ConversationStyle => {
                context.memories = self
                    .retriever
                    .retrieve(
                        collection,
                        user_id,
                        message,
                        intent,
                        user_emotion,
                        &semantic_key,
                        entity_keywords,
                    )
                    .await;
            }
            QueryIntent::TemporalAnalysis => {
                context.trend = self.week_trend(character_id, user_id).await;
                context.memories = self
                    .retriever
                    .retrieve(
                        collection,
                        user_id,
                        message,
                        intent,
                        user_emotion,
                        &semantic_key,
                        entity_keywords,
                    )
                    .await;
            }
            QueryIntent::MultiModal => {
                context.facts = self.top_facts(user_id, character_id).await;
                context.memories = self
                    .retriever
                    .retrieve(
                        collection,
                        user_id,
                        message,
                        intent,
                        user_emotion,
                        &semantic_key,
                        entity_keywords,
                    )
                    .await;
                if QUANTIFIABLE.is_match(message) {
                    context.trend = self.week_trend(character_id, user_id).await;
                }
                context.fused = Self::fuse(&context.facts, &context.memories);
            }
        }

        context
    }

    /// Entity lookup: full-text matches on the referenced entity, widened
    /// with facts reachable within two hops of it
    async fn entity_facts(
        &self,
        user_id: &str,
        character_id: &str,
        entity_name: &str,
    ) -> Vec<UserFact> {
        let mut facts = match self
            .facts
            .search_entities(user_id, character_id, entity_name, 10)
            .await
        {
            Ok(facts) => facts,
            Err(e) => {
                warn!("Entity search failed: {}", e);
                Vec::new()
            }
        };

        match self
            .facts
            .related_entities(user_id, character_id, entity_name, 10)
            .await
        {
            Ok(related) => {
                for fact in related {
                    let duplicate = facts.iter().any(|existing| {
                        existing.entity_name == fact.entity_name
                            && existing.relationship_type == fact.relationship_type
                    });
                    if !duplicate {
                        facts.push(fact);
                    }
                }
            }
            Err(e) => warn!("Related-entity traversal failed: {}", e),
        }

        facts
    }

    async fn top_facts(&self, user_id: &str, character_id: &str) -> Vec<UserFact> {
        match self
            .facts
            .facts_for_user(user_id, character_id, 0.3, 0.1, 10)
            .await
        {
            Ok(facts) => facts,
            Err(e) => {
                warn!("Fact lookup failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn week_trend(&self, character_id: &str, user_id: &str) -> Vec<EmotionSample> {
        match self
            .metrics
            .bot_emotion_series(character_id, user_id, Utc::now() - Duration::days(7))
            .await
        {
            Ok(samples) => samples,
            Err(e) => {
                warn!("Trend query failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Merge facts and memories: facts lead as atemporal ground truth, then
    /// memories in quality order, dropping any memory that restates a fact's
    /// entity verbatim.
    fn fuse(facts: &[UserFact], memories: &MemoryRetrieval) -> Vec<FusedItem> {
        let mut fused: Vec<FusedItem> = facts
            .iter()
            .map(|fact| FusedItem {
                source: KnowledgeSource::Facts,
                text: format!(
                    "{} ({} {})",
                    fact.entity_name, fact.relationship_type, fact.entity_type
                ),
            })
            .collect();

        for memory in &memories.memories {
            let overlaps = facts.iter().any(|fact| {
                memory
                    .record
                    .content
                    .to_lowercase()
                    .contains(&fact.entity_name.to_lowercase())
            });
            if !overlaps {
                fused.push(FusedItem {
                    source: KnowledgeSource::Memories,
                    text: memory.record.content.clone(),
                });
            }
        }

        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::{InMemoryFactStore, InMemoryMetricsStore, InMemoryVectorStore};
    use crate::retriever::RetrieverConfig;
    use async_trait::async_trait;
    use rstest::rstest;
    use sylph_core::{Embedder, FactStore, EMBEDDING_DIM};

    #[rstest]
    #[case("How have I been feeling lately?", QueryIntent::TemporalAnalysis)]
    #[case("What foods do I like?", QueryIntent::FactualRecall)]
    #[case(
        "We talked about something important yesterday",
        QueryIntent::ConversationStyle
    )]
    #[case("Tell me about the reef trip", QueryIntent::EntitySearch)]
    #[case("Good morning!", QueryIntent::MultiModal)]
    // A question word plus a temporal phrase: temporal wins
    #[case("What did I use to like over time?", QueryIntent::TemporalAnalysis)]
    fn test_intent_priority_order(#[case] message: &str, #[case] expected: QueryIntent) {
        assert_eq!(classify_intent(message), expected);
    }

    #[test]
    fn test_referenced_entity_extraction() {
        assert_eq!(
            referenced_entity("tell me about deep-sea diving").as_deref(),
            Some("deep-sea diving")
        );
        assert_eq!(
            referenced_entity("remember \"the reef trip\"?").as_deref(),
            Some("the reef trip")
        );
        assert_eq!(referenced_entity("hello there"), None);
    }

    #[test]
    fn test_fusion_dedups_against_fact_entities() {
        use sylph_core::{EmotionRecord, MemoryKind, MemoryRecord, ScoredMemory};

        let facts = vec![UserFact {
            user_id: "mark".into(),
            character_id: "elena".into(),
            entity_name: "diving".into(),
            entity_type: "hobby".into(),
            relationship_type: "loves".into(),
            confidence: 0.85,
            last_mentioned: Utc::now(),
            temporal_weight: 1.0,
        }];

        let memory = |content: &str| ScoredMemory {
            record: MemoryRecord {
                id: uuid::Uuid::new_v4(),
                user_id: "mark".into(),
                character_id: "elena".into(),
                kind: MemoryKind::Conversation,
                content: content.into(),
                bot_response: String::new(),
                semantic_key: "general".into(),
                timestamp: Utc::now(),
                user_emotion: EmotionRecord::neutral(),
                bot_emotion: None,
            },
            similarity: 0.9,
            quality: 0.8,
        };

        let memories = MemoryRetrieval {
            memories: vec![memory("I told you about diving"), memory("work was rough")],
            degraded: false,
            no_history: false,
        };

        let fused = KnowledgeRouter::fuse(&facts, &memories);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].source, KnowledgeSource::Facts);
        assert!(fused[1].text.contains("work was rough"));
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> sylph_core::Result<Vec<f32>> {
            let mut vector = vec![0.0f32; EMBEDDING_DIM];
            for word in text.split_whitespace() {
                let mut hash: usize = 5381;
                for byte in word.bytes() {
                    hash = hash.wrapping_mul(33).wrapping_add(byte as usize);
                }
                vector[hash % EMBEDDING_DIM] += 1.0;
            }
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt().max(1e-6);
            Ok(vector.into_iter().map(|v| v / norm).collect())
        }
    }

    async fn router_with_facts() -> KnowledgeRouter {
        let facts = Arc::new(InMemoryFactStore::new());
        for (entity, entity_type) in [
            ("diving", "hobby"),
            ("surfing", "hobby"),
            ("tacos", "food"),
        ] {
            facts
                .upsert_fact(&UserFact {
                    user_id: "mark".into(),
                    character_id: "elena".into(),
                    entity_name: entity.into(),
                    entity_type: entity_type.into(),
                    relationship_type: "likes".into(),
                    confidence: 0.8,
                    last_mentioned: Utc::now(),
                    temporal_weight: 1.0,
                })
                .await
                .unwrap();
        }

        let retriever = Arc::new(MemoryRetriever::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(StubEmbedder),
            RetrieverConfig::default(),
        ));
        KnowledgeRouter::new(facts, Arc::new(InMemoryMetricsStore::new()), retriever)
    }

    #[tokio::test]
    async fn test_route_entity_search_widens_over_shared_types() {
        let router = router_with_facts().await;
        let context = router
            .route(
                "elena",
                "mark",
                "elena",
                "tell me about diving",
                &sylph_core::EmotionRecord::neutral(),
            )
            .await;

        assert_eq!(context.intent, QueryIntent::EntitySearch);
        let names: Vec<&str> = context
            .facts
            .iter()
            .map(|fact| fact.entity_name.as_str())
            .collect();
        assert!(names.contains(&"diving"));
        assert!(names.contains(&"surfing"));
        assert!(!names.contains(&"tacos"));
    }

    #[tokio::test]
    async fn test_route_multi_modal_fuses_facts_first() {
        let router = router_with_facts().await;
        let context = router
            .route(
                "elena",
                "mark",
                "elena",
                "good morning",
                &sylph_core::EmotionRecord::neutral(),
            )
            .await;

        assert_eq!(context.intent, QueryIntent::MultiModal);
        assert_eq!(context.facts.len(), 3);
        assert!(context
            .fused
            .iter()
            .all(|item| item.source == KnowledgeSource::Facts));
    }

    #[tokio::test]
    async fn test_route_conversation_style_skips_fact_store() {
        let router = router_with_facts().await;
        let context = router
            .route(
                "elena",
                "mark",
                "elena",
                "how did we talk about this last time?",
                &sylph_core::EmotionRecord::neutral(),
            )
            .await;

        assert_eq!(context.intent, QueryIntent::ConversationStyle);
        assert!(context.facts.is_empty());
    }
}
