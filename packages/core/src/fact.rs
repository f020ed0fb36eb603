use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured entity-relationship assertion extracted from conversation.
///
/// Upserts are deterministic on (user_id, character_id, entity_name,
/// relationship_type): confidence and last_mentioned both take the maximum
/// of existing and incoming values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFact {
    pub user_id: String,
    pub character_id: String,

    /// The thing the fact is about ("deep-sea diving")
    pub entity_name: String,

    /// Category of entity ("hobby", "food", "person")
    pub entity_type: String,

    /// How the user relates to it ("loves", "hates", "owns")
    pub relationship_type: String,

    /// Extraction confidence (0.0 to 1.0)
    pub confidence: f32,

    pub last_mentioned: DateTime<Utc>,

    /// Recency weighting applied at retrieval (0.0 to 1.0)
    pub temporal_weight: f32,
}

impl UserFact {
    /// Ordering key for retrieval: stale low-confidence facts sink
    pub fn effective_weight(&self) -> f32 {
        self.confidence * self.temporal_weight
    }

    /// Merge an incoming assertion into this row per the upsert contract
    pub fn absorb(&mut self, incoming: &UserFact) {
        self.confidence = self.confidence.max(incoming.confidence);
        self.last_mentioned = self.last_mentioned.max(incoming.last_mentioned);
        self.temporal_weight = self.temporal_weight.max(incoming.temporal_weight);
    }
}
