use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Learned relationship state for one (user, character) pair.
///
/// At most one row exists per pair; scores live in [0, 1] and drift through
/// small post-response deltas rather than jumps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipScores {
    /// Confidence the user can rely on the character
    pub trust: f32,

    /// Warmth accumulated across interactions
    pub affection: f32,

    /// How well the character tracks the user's emotional state
    pub attunement: f32,

    /// Total completed turns for the pair
    pub interaction_count: u64,

    pub updated_at: DateTime<Utc>,
}

impl Default for RelationshipScores {
    fn default() -> Self {
        Self {
            trust: 0.5,
            affection: 0.5,
            attunement: 0.5,
            interaction_count: 0,
            updated_at: Utc::now(),
        }
    }
}

impl RelationshipScores {
    /// Human-readable depth bucket used in prompt context
    pub fn depth_label(&self) -> &'static str {
        let mean = (self.trust + self.affection + self.attunement) / 3.0;
        if self.interaction_count < 5 {
            "new acquaintance"
        } else if mean > 0.8 {
            "deep bond"
        } else if mean > 0.65 {
            "close friend"
        } else if mean > 0.45 {
            "familiar"
        } else {
            "distant"
        }
    }

    /// Apply the one-time read-side decay: after 30 idle days each score
    /// moves 10% toward the neutral midpoint. The corrected values are only
    /// written back at the next update.
    pub fn decayed(&self, now: DateTime<Utc>) -> Self {
        if (now - self.updated_at) <= chrono::Duration::days(30) {
            return self.clone();
        }
        let pull = |score: f32| score + (0.5 - score) * 0.1;
        Self {
            trust: pull(self.trust),
            affection: pull(self.affection),
            attunement: pull(self.attunement),
            interaction_count: self.interaction_count,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_labels() {
        let mut scores = RelationshipScores::default();
        assert_eq!(scores.depth_label(), "new acquaintance");

        scores.interaction_count = 50;
        scores.trust = 0.9;
        scores.affection = 0.85;
        scores.attunement = 0.9;
        assert_eq!(scores.depth_label(), "deep bond");
    }

    #[test]
    fn test_decay_only_after_thirty_days() {
        let mut scores = RelationshipScores {
            trust: 0.9,
            affection: 0.1,
            attunement: 0.5,
            interaction_count: 10,
            updated_at: Utc::now(),
        };

        let fresh = scores.decayed(Utc::now());
        assert!((fresh.trust - 0.9).abs() < 1e-6);

        scores.updated_at = Utc::now() - chrono::Duration::days(45);
        let stale = scores.decayed(Utc::now());
        assert!((stale.trust - 0.86).abs() < 1e-6);
        assert!((stale.affection - 0.14).abs() < 1e-6);
        assert!((stale.attunement - 0.5).abs() < 1e-6);
    }
}
