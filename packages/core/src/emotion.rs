use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The fixed emotion label set returned by the external classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Trust,
    Anticipation,
    Neutral,
    Love,
    Excitement,
}

impl EmotionLabel {
    /// Lowercase wire name, also used in embedding prefixes and metric tags
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Trust => "trust",
            EmotionLabel::Anticipation => "anticipation",
            EmotionLabel::Neutral => "neutral",
            EmotionLabel::Love => "love",
            EmotionLabel::Excitement => "excitement",
        }
    }

    /// Parse a wire name; unknown labels collapse to neutral
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "joy" => EmotionLabel::Joy,
            "sadness" => EmotionLabel::Sadness,
            "anger" => EmotionLabel::Anger,
            "fear" => EmotionLabel::Fear,
            "surprise" => EmotionLabel::Surprise,
            "disgust" => EmotionLabel::Disgust,
            "trust" => EmotionLabel::Trust,
            "anticipation" => EmotionLabel::Anticipation,
            "love" => EmotionLabel::Love,
            "excitement" => EmotionLabel::Excitement,
            _ => EmotionLabel::Neutral,
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full emotion record produced by the external classifier.
///
/// Computed at most twice per turn (once for the user message, once for the
/// bot response) and threaded through every consumer via the bundle; the
/// schema is frozen against the classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionRecord {
    /// Dominant emotion
    pub primary_emotion: EmotionLabel,

    /// Classifier confidence (0.0 to 1.0)
    pub confidence: f32,

    /// Strength of the expressed emotion (0.0 to 1.0)
    pub emotional_intensity: f32,

    /// Whether more than one emotion was detected
    pub is_multi_emotion: bool,

    /// Up to three secondary emotions
    pub secondary_emotions: Vec<EmotionLabel>,

    /// Spread of the emotion distribution
    pub emotion_variance: f32,

    /// How unambiguous the dominant emotion is (0.0 to 1.0)
    pub emotion_clarity: f32,

    /// Overall sentiment (-1.0 to 1.0)
    pub sentiment_score: f32,

    /// Number of emotions above the detection threshold
    pub mixed_emotion_count: u32,

    /// Stability across the analyzed text (0.0 to 1.0)
    pub emotional_stability: f32,

    /// Probability per emotion label
    pub emotion_distribution: HashMap<EmotionLabel, f32>,
}

impl EmotionRecord {
    /// A flat neutral record, used when the classifier is unavailable
    pub fn neutral() -> Self {
        Self {
            primary_emotion: EmotionLabel::Neutral,
            confidence: 0.0,
            emotional_intensity: 0.0,
            is_multi_emotion: false,
            secondary_emotions: Vec::new(),
            emotion_variance: 0.0,
            emotion_clarity: 0.0,
            sentiment_score: 0.0,
            mixed_emotion_count: 0,
            emotional_stability: 1.0,
            emotion_distribution: HashMap::new(),
        }
    }

    /// Positive-sentiment check used by the relationship update
    pub fn is_positive(&self) -> bool {
        self.sentiment_score > 0.0
    }

    /// A low-confidence neutral read carries no usable signal and must not
    /// trigger empathy adaptations
    pub fn has_strong_signal(&self) -> bool {
        !(self.primary_emotion == EmotionLabel::Neutral && self.confidence < 0.3)
    }
}

/// Direction of the bot's recent intensity trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrajectoryDirection {
    Intensifying,
    Calming,
    Stable,
}

impl TrajectoryDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TrajectoryDirection::Intensifying => "intensifying",
            TrajectoryDirection::Calming => "calming",
            TrajectoryDirection::Stable => "stable",
        }
    }
}

/// The bot's recent emotional trajectory over its response history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalTrajectory {
    /// Most recent primary emotion
    pub current_emotion: EmotionLabel,

    /// Most recent intensity
    pub intensity: f32,

    /// Slope-based trend label
    pub direction: TrajectoryDirection,

    /// Recent primary emotions, newest last (at most 10)
    pub recent_emotions: Vec<EmotionLabel>,

    /// Distinct emotions observed in the window
    pub distinct_emotions: usize,
}

/// One bot-emotion observation in the time-series window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionSample {
    pub emotion: EmotionLabel,
    pub intensity: f32,
    pub timestamp: DateTime<Utc>,
}
