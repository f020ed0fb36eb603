//! Relationship scoring: reads with read-time decay, post-response updates
//! driven by a per-turn quality signal.

use chrono::Utc;
use std::sync::Arc;
use sylph_core::{
    FactStore, IntelligenceBundle, MetricPoint, MetricsStore, RelationshipScores,
};
use tracing::{debug, warn};

/// Response length band that reads as well-fitted to a chat turn
const IDEAL_MIN_CHARS: usize = 80;
const IDEAL_MAX_CHARS: usize = 1200;

/// Relationship engine for one character instance
pub struct RelationshipEngine {
    facts: Arc<dyn FactStore>,
    metrics: Arc<dyn MetricsStore>,
}

impl RelationshipEngine {
    pub fn new(facts: Arc<dyn FactStore>, metrics: Arc<dyn MetricsStore>) -> Self {
        Self { facts, metrics }
    }

    /// Current scores with defaults for a first meeting and the 30-day
    /// read-side decay applied. The decayed values are not written here;
    /// they persist at the next update.
    pub async fn scores(&self, user_id: &str, character_id: &str) -> RelationshipScores {
        match self.facts.get_relationship(user_id, character_id).await {
            Ok(Some(scores)) => scores.decayed(Utc::now()),
            Ok(None) => RelationshipScores::default(),
            Err(e) => {
                warn!("Relationship read failed for {}/{}: {}", user_id, character_id, e);
                RelationshipScores::default()
            }
        }
    }

    /// Post-response update: small deltas from the turn's quality signal,
    /// written transactionally, then mirrored to the metrics store.
    pub async fn update(
        &self,
        user_id: &str,
        character_id: &str,
        bundle: &IntelligenceBundle,
        response_text: &str,
    ) -> sylph_core::Result<RelationshipScores> {
        let current = self.scores(user_id, character_id).await;
        let quality = Self::quality_signal(bundle, response_text);

        let user_emotion = bundle.user_emotion_or_neutral();
        let positive_bonus = if user_emotion.is_positive() { 0.005 } else { 0.0 };

        let updated = RelationshipScores {
            trust: (current.trust + 0.01 * (quality - 0.5)).clamp(0.0, 1.0),
            affection: (current.affection + 0.015 * (quality - 0.5) + positive_bonus)
                .clamp(0.0, 1.0),
            attunement: (current.attunement + 0.02 * (quality - 0.5)).clamp(0.0, 1.0),
            interaction_count: current.interaction_count + 1,
            updated_at: Utc::now(),
        };

        self.facts
            .put_relationship(user_id, character_id, &updated)
            .await?;

        if let Err(e) = self
            .metrics
            .write(MetricPoint::relationship(character_id, user_id, &updated))
            .await
        {
            warn!("Relationship metric write dropped: {}", e);
        }

        debug!(
            "Relationship for {}/{} now trust={:.3} affection={:.3} attunement={:.3} ({} turns)",
            user_id,
            character_id,
            updated.trust,
            updated.affection,
            updated.attunement,
            updated.interaction_count
        );
        Ok(updated)
    }

    /// Blend of context confidence, emotional alignment, response length
    /// fit, and engagement
    pub fn quality_signal(bundle: &IntelligenceBundle, response_text: &str) -> f32 {
        let overall_confidence = bundle.confidence.map(|c| c.overall).unwrap_or(0.5);

        let user_sentiment = bundle
            .user_emotion
            .as_ref()
            .map(|record| record.sentiment_score)
            .unwrap_or(0.0);
        let bot_sentiment = bundle
            .bot_emotion
            .as_ref()
            .map(|record| record.sentiment_score)
            .unwrap_or(0.0);
        let emotion_alignment = 1.0 - (user_sentiment - bot_sentiment).abs() / 2.0;

        let length = response_text.chars().count();
        let length_fit = if (IDEAL_MIN_CHARS..=IDEAL_MAX_CHARS).contains(&length) {
            1.0
        } else if length < IDEAL_MIN_CHARS {
            length as f32 / IDEAL_MIN_CHARS as f32
        } else {
            (IDEAL_MAX_CHARS as f32 / length as f32).max(0.3)
        };

        let engagement = Self::engagement_heuristic(response_text);

        0.3 * overall_confidence + 0.3 * emotion_alignment + 0.2 * length_fit + 0.2 * engagement
    }

    /// A response that asks something back or picks up specifics reads as
    /// engaged
    fn engagement_heuristic(response_text: &str) -> f32 {
        let mut score: f32 = 0.4;
        if response_text.contains('?') {
            score += 0.3;
        }
        if response_text.split_whitespace().count() >= 20 {
            score += 0.3;
        }
        score.min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylph_core::{ConfidenceReport, EmotionRecord};
    use sylph_pod_memory::{InMemoryFactStore, InMemoryMetricsStore};

    fn engine() -> (RelationshipEngine, Arc<InMemoryFactStore>, Arc<InMemoryMetricsStore>) {
        let facts = Arc::new(InMemoryFactStore::new());
        let metrics = Arc::new(InMemoryMetricsStore::new());
        (
            RelationshipEngine::new(facts.clone(), metrics.clone()),
            facts,
            metrics,
        )
    }

    fn bundle_with(confidence: f32, user_sentiment: f32, bot_sentiment: f32) -> IntelligenceBundle {
        let mut bundle = IntelligenceBundle::new();
        bundle.confidence = Some(ConfidenceReport {
            overall: confidence,
            context: confidence,
            emotional: confidence,
        });
        let mut user = EmotionRecord::neutral();
        user.sentiment_score = user_sentiment;
        bundle.user_emotion = Some(user);
        let mut bot = EmotionRecord::neutral();
        bot.sentiment_score = bot_sentiment;
        bundle.bot_emotion = Some(bot);
        bundle
    }

    #[tokio::test]
    async fn test_defaults_for_unknown_pair() {
        let (engine, _, _) = engine();
        let scores = engine.scores("mark", "elena").await;
        assert!((scores.trust - 0.5).abs() < 1e-6);
        assert_eq!(scores.interaction_count, 0);
    }

    #[tokio::test]
    async fn test_good_turn_nudges_scores_up() {
        let (engine, _, metrics) = engine();
        let bundle = bundle_with(0.9, 0.8, 0.7);
        let response = "That sounds wonderful! What drew you to the reef in the first place? \
                        I'd love to hear how it started.";

        let updated = engine.update("mark", "elena", &bundle, response).await.unwrap();
        assert!(updated.trust > 0.5);
        assert!(updated.affection > 0.5);
        assert!(updated.attunement > 0.5);
        assert_eq!(updated.interaction_count, 1);
        assert_eq!(metrics.count_for("relationship").await, 1);
    }

    #[tokio::test]
    async fn test_poor_turn_nudges_scores_down() {
        let (engine, _, _) = engine();
        let bundle = bundle_with(0.1, 0.9, -0.9);
        let updated = engine.update("mark", "elena", &bundle, "no.").await.unwrap();
        assert!(updated.trust < 0.5);
        assert!(updated.attunement < 0.5);
    }

    #[tokio::test]
    async fn test_interaction_count_tracks_turns() {
        let (engine, _, _) = engine();
        let bundle = bundle_with(0.7, 0.2, 0.2);
        for _ in 0..5 {
            engine.update("mark", "elena", &bundle, "Sounds lovely! Tell me more?").await.unwrap();
        }
        let scores = engine.scores("mark", "elena").await;
        assert_eq!(scores.interaction_count, 5);
    }
}
