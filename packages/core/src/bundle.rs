use crate::emotion::{EmotionRecord, EmotionalTrajectory};
use crate::fact::UserFact;
use crate::memory::MemoryRetrieval;
use crate::relationship::RelationshipScores;
use serde::{Deserialize, Serialize};

/// Confidence signals derived from retrieval and emotion clarity
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceReport {
    /// Blended confidence used for prompt adaptation
    pub overall: f32,

    /// How well the retrieved context covers the query
    pub context: f32,

    /// How clearly the user's emotional state reads
    pub emotional: f32,
}

impl Default for ConfidenceReport {
    fn default() -> Self {
        Self {
            overall: 0.5,
            context: 0.5,
            emotional: 0.5,
        }
    }
}

/// Outcome of the phase-1 security gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityVerdict {
    Allowed,
    Rejected { reason: String },
}

impl SecurityVerdict {
    pub fn is_rejected(&self) -> bool {
        matches!(self, SecurityVerdict::Rejected { .. })
    }
}

/// Per-turn working state accumulated across pipeline phases.
///
/// Created at phase 0, filled slot by slot as phases complete, and dropped
/// after the response is emitted. Never persisted as a unit; only its
/// derivatives reach the stores. Slot absence means the producing phase was
/// skipped or degraded, and downstream consumers treat it as such.
#[derive(Debug, Clone, Default)]
pub struct IntelligenceBundle {
    /// Emotion analysis of the user message (phase 2)
    pub user_emotion: Option<EmotionRecord>,

    /// Emotion analysis of the bot response (phase 7.5)
    pub bot_emotion: Option<EmotionRecord>,

    /// Structured facts about the user, effective-weight descending (phase 2)
    pub user_facts: Vec<UserFact>,

    /// Current relationship scores for the pair (phase 6.7)
    pub relationship_state: Option<RelationshipScores>,

    /// Derived confidence signals (phase 6.7)
    pub confidence: Option<ConfidenceReport>,

    /// The bot's recent emotional trajectory (phase 6.5)
    pub bot_trajectory: Option<EmotionalTrajectory>,

    /// Retrieved conversation memories plus degradation markers (phase 3)
    pub memories: MemoryRetrieval,

    /// Topics detected in the user message
    pub detected_topics: Vec<String>,

    /// Entity mentions detected in the user message
    pub detected_entities: Vec<String>,

    /// Phase-1 gate outcome
    pub security_verdict: Option<SecurityVerdict>,

    /// Attachment descriptions injected as pseudo-memories (phase 6)
    pub attachment_notes: Vec<String>,
}

impl IntelligenceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user emotion slot with a neutral fallback for skipped analysis
    pub fn user_emotion_or_neutral(&self) -> EmotionRecord {
        self.user_emotion.clone().unwrap_or_else(EmotionRecord::neutral)
    }
}
