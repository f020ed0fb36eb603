//! Leaf response enrichers.
//!
//! The pipeline holds an ordered list of enrichers and folds the response
//! through them; an enricher that fails leaves the response untouched.

use async_trait::async_trait;
use sylph_core::{CharacterDefinition, EmotionLabel, IntelligenceBundle, ResponseEnricher};

/// Appends a mood-matched emoji per the character's emoji policy.
///
/// A pure string transform: no I/O, no model calls.
pub struct EmojiDecorator;

impl EmojiDecorator {
    pub fn new() -> Self {
        Self
    }

    fn emoji_for(emotion: EmotionLabel) -> Option<&'static str> {
        match emotion {
            EmotionLabel::Joy => Some("😊"),
            EmotionLabel::Sadness => Some("💙"),
            EmotionLabel::Love => Some("❤️"),
            EmotionLabel::Excitement => Some("🎉"),
            EmotionLabel::Surprise => Some("😮"),
            EmotionLabel::Trust => Some("🤝"),
            EmotionLabel::Anticipation => Some("✨"),
            EmotionLabel::Anger | EmotionLabel::Fear | EmotionLabel::Disgust => None,
            EmotionLabel::Neutral => None,
        }
    }

    fn already_decorated(response: &str, max_per_message: u8) -> bool {
        let emoji_count = response
            .chars()
            .filter(|c| (*c as u32) >= 0x1F300 || matches!(*c, '❤' | '✨' | '💙'))
            .count();
        emoji_count >= max_per_message as usize
    }
}

impl Default for EmojiDecorator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseEnricher for EmojiDecorator {
    fn name(&self) -> &str {
        "emoji_decorator"
    }

    async fn enrich(
        &self,
        character: &CharacterDefinition,
        bundle: &IntelligenceBundle,
        response: String,
    ) -> sylph_core::Result<String> {
        let policy = &character.emoji_policy;
        if !policy.enabled || policy.max_per_message == 0 {
            return Ok(response);
        }
        if Self::already_decorated(&response, policy.max_per_message) {
            return Ok(response);
        }

        // Prefer the character's own emoji, fall back to a mood match
        let emoji = policy
            .preferred
            .first()
            .map(String::as_str)
            .or_else(|| {
                let emotion = bundle
                    .bot_emotion
                    .as_ref()
                    .map(|record| record.primary_emotion)
                    .unwrap_or(EmotionLabel::Neutral);
                Self::emoji_for(emotion)
            });

        match emoji {
            Some(emoji) => Ok(format!("{} {}", response.trim_end(), emoji)),
            None => Ok(response),
        }
    }
}
