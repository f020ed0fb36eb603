use crate::emotion::EmotionRecord;
use crate::relationship::RelationshipScores;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One append-only analytic point.
///
/// Measurement names, tag keys, and field keys are frozen; dashboards and
/// the trajectory analyzer both parse them.
#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    pub measurement: &'static str,
    pub tags: Vec<(&'static str, String)>,
    pub fields: Vec<(&'static str, f64)>,
    pub timestamp: DateTime<Utc>,
}

/// Per-turn response quality scalars
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityFields {
    pub engagement_score: f64,
    pub satisfaction_score: f64,
    pub natural_flow_score: f64,
    pub emotional_resonance: f64,
    pub topic_relevance: f64,
}

impl MetricPoint {
    pub fn user_emotion(character: &str, user_id: &str, record: &EmotionRecord) -> Self {
        Self {
            measurement: "user_emotion",
            tags: vec![
                ("character", character.to_string()),
                ("user_id", user_id.to_string()),
                ("emotion", record.primary_emotion.as_str().to_string()),
            ],
            fields: vec![
                ("intensity", record.emotional_intensity as f64),
                ("confidence", record.confidence as f64),
            ],
            timestamp: Utc::now(),
        }
    }

    pub fn bot_emotion(character: &str, user_id: &str, record: &EmotionRecord) -> Self {
        Self {
            measurement: "bot_emotion",
            tags: vec![
                ("character", character.to_string()),
                ("user_id", user_id.to_string()),
                ("emotion", record.primary_emotion.as_str().to_string()),
            ],
            fields: vec![
                ("intensity", record.emotional_intensity as f64),
                ("confidence", record.confidence as f64),
            ],
            timestamp: Utc::now(),
        }
    }

    pub fn confidence(
        character: &str,
        user_id: &str,
        user_fact: f64,
        relationship: f64,
        emotional: f64,
        overall: f64,
    ) -> Self {
        Self {
            measurement: "confidence",
            tags: vec![
                ("character", character.to_string()),
                ("user_id", user_id.to_string()),
            ],
            fields: vec![
                ("user_fact_confidence", user_fact),
                ("relationship_confidence", relationship),
                ("emotional_confidence", emotional),
                ("overall_confidence", overall),
            ],
            timestamp: Utc::now(),
        }
    }

    pub fn quality(character: &str, user_id: &str, fields: &QualityFields) -> Self {
        Self {
            measurement: "quality",
            tags: vec![
                ("character", character.to_string()),
                ("user_id", user_id.to_string()),
            ],
            fields: vec![
                ("engagement_score", fields.engagement_score),
                ("satisfaction_score", fields.satisfaction_score),
                ("natural_flow_score", fields.natural_flow_score),
                ("emotional_resonance", fields.emotional_resonance),
                ("topic_relevance", fields.topic_relevance),
            ],
            timestamp: Utc::now(),
        }
    }

    pub fn relationship(character: &str, user_id: &str, scores: &RelationshipScores) -> Self {
        Self {
            measurement: "relationship",
            tags: vec![
                ("character", character.to_string()),
                ("user_id", user_id.to_string()),
            ],
            fields: vec![
                ("trust", scores.trust as f64),
                ("affection", scores.affection as f64),
                ("attunement", scores.attunement as f64),
                ("interaction_count", scores.interaction_count as f64),
            ],
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_shapes() {
        let record = EmotionRecord::neutral();
        let point = MetricPoint::user_emotion("elena", "mark", &record);
        assert_eq!(point.measurement, "user_emotion");
        assert_eq!(point.tags.len(), 3);
        assert_eq!(point.tags[2].0, "emotion");
        assert_eq!(point.fields.len(), 2);

        let point = MetricPoint::relationship("elena", "mark", &RelationshipScores::default());
        let keys: Vec<&str> = point.fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["trust", "affection", "attunement", "interaction_count"]
        );
    }
}
