use crate::emotion::EmotionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Memory identifier
pub type MemoryId = Uuid;

/// Dimensionality of the external embedding model; the named-vector schema
/// is frozen against stored data
pub const EMBEDDING_DIM: usize = 384;

/// Kinds of vector-store points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// One conversation turn (user message + bot response)
    Conversation,
    /// Content-addressed significant-turn record written by the learning pass
    Episode,
}

impl MemoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation",
            MemoryKind::Episode => "episode",
        }
    }
}

/// The three named vectors stored per memory point.
///
/// Names and text prefixes are frozen: changing either invalidates every
/// previously stored point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedVector {
    Content,
    Emotion,
    Semantic,
}

impl NamedVector {
    /// Collection-schema vector name
    pub fn name(self) -> &'static str {
        match self {
            NamedVector::Content => "content",
            NamedVector::Emotion => "emotion",
            NamedVector::Semantic => "semantic",
        }
    }

    /// The exact text handed to the embedder for this vector
    pub fn embedding_text(self, content: &str, primary_emotion: &str, semantic_key: &str) -> String {
        match self {
            NamedVector::Content => content.to_string(),
            NamedVector::Emotion => format!("emotion {}: {}", primary_emotion, content),
            NamedVector::Semantic => format!("concept {}: {}", semantic_key, content),
        }
    }
}

/// The three embeddings for one point; inserts require all three
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryVectors {
    pub content: Vec<f32>,
    pub emotion: Vec<f32>,
    pub semantic: Vec<f32>,
}

impl MemoryVectors {
    /// Reject partial or wrongly sized vector sets before they reach a store
    pub fn validate(&self) -> crate::Result<()> {
        for (name, vector) in [
            ("content", &self.content),
            ("emotion", &self.emotion),
            ("semantic", &self.semantic),
        ] {
            if vector.len() != EMBEDDING_DIM {
                return Err(crate::CoreError::Invalid(format!(
                    "named vector '{}' has {} dimensions, expected {}",
                    name,
                    vector.len(),
                    EMBEDDING_DIM
                )));
            }
        }
        Ok(())
    }
}

/// A persisted conversation memory: the payload stored alongside the three
/// named vectors. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub user_id: String,
    pub character_id: String,
    pub kind: MemoryKind,

    /// User message text
    pub content: String,

    /// Bot response text
    pub bot_response: String,

    /// Concept key used in the semantic embedding prefix
    pub semantic_key: String,

    pub timestamp: DateTime<Utc>,

    /// Full emotion record for the user message
    pub user_emotion: EmotionRecord,

    /// Full emotion record for the bot response; required for points written
    /// after the model reply, absent only when the classifier failed
    pub bot_emotion: Option<EmotionRecord>,
}

/// A similarity-search hit from the vector store
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub id: MemoryId,
    /// Cosine similarity normalized to [0, 1]
    pub score: f32,
    pub record: MemoryRecord,
}

/// A retrieved memory after quality scoring
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    /// Raw similarity from the store
    pub similarity: f32,
    /// Weighted combination of similarity, emotion metadata, and recency
    pub quality: f32,
}

/// Retriever output: ranked memories plus degradation markers
#[derive(Debug, Clone, Default)]
pub struct MemoryRetrieval {
    /// Best memories, quality-descending
    pub memories: Vec<ScoredMemory>,

    /// Set when a store failure forced an empty or partial result
    pub degraded: bool,

    /// Set when too little history survived to ground recollections
    pub no_history: bool,
}

impl MemoryRetrieval {
    pub fn empty_degraded() -> Self {
        Self {
            memories: Vec::new(),
            degraded: true,
            no_history: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_prefixes() {
        assert_eq!(
            NamedVector::Content.embedding_text("hello", "joy", "greetings"),
            "hello"
        );
        assert_eq!(
            NamedVector::Emotion.embedding_text("hello", "joy", "greetings"),
            "emotion joy: hello"
        );
        assert_eq!(
            NamedVector::Semantic.embedding_text("hello", "joy", "greetings"),
            "concept greetings: hello"
        );
    }

    #[test]
    fn test_partial_vectors_rejected() {
        let vectors = MemoryVectors {
            content: vec![0.0; EMBEDDING_DIM],
            emotion: vec![0.0; EMBEDDING_DIM],
            semantic: vec![0.0; 12],
        };
        assert!(vectors.validate().is_err());

        let vectors = MemoryVectors {
            content: vec![0.0; EMBEDDING_DIM],
            emotion: vec![0.0; EMBEDDING_DIM],
            semantic: vec![0.0; EMBEDDING_DIM],
        };
        assert!(vectors.validate().is_ok());
    }
}
