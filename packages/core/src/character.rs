use serde::{Deserialize, Serialize};

/// Character archetype; governs AI-identity disclosure behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    /// Presents as a plausible human; must disclose AI identity when asked
    RealWorld,
    /// Openly fictional being
    Fantasy,
    /// In-universe artificial intelligence
    NarrativeAi,
}

/// How the character speaks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceStyle {
    /// Free-text tone description ("warm, wry, plainspoken")
    pub tone: String,

    /// Formality level (0.0 = casual, 1.0 = formal)
    pub formality: f32,

    /// Verbosity (0.0 = terse, 1.0 = expansive)
    pub verbosity: f32,

    /// Use of humor (0.0 to 1.0)
    pub humor: f32,
}

impl Default for VoiceStyle {
    fn default() -> Self {
        Self {
            tone: "warm and direct".to_string(),
            formality: 0.3,
            verbosity: 0.5,
            humor: 0.4,
        }
    }
}

/// Emoji usage policy for responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmojiPolicy {
    pub enabled: bool,

    /// Cap per response
    pub max_per_message: u8,

    /// Emoji the character favors, in preference order
    pub preferred: Vec<String>,
}

impl Default for EmojiPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_per_message: 2,
            preferred: Vec::new(),
        }
    }
}

/// A character definition: read-mostly input to prompt construction.
///
/// Authoring lives outside the core; the pipeline only reads these rows
/// (cached in memory with a 1-hour TTL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterDefinition {
    /// Opaque identifier, also the vector-collection partition key
    pub id: String,

    pub name: String,

    pub archetype: Archetype,

    /// Personality trait phrases ("curious", "fiercely loyal")
    pub traits: Vec<String>,

    pub voice: VoiceStyle,

    /// Backstory paragraph(s) folded into the identity prompt
    pub backstory: String,

    pub emoji_policy: EmojiPolicy,
}

impl CharacterDefinition {
    /// Fallback identity used when the definition cannot be fetched; keeps
    /// the turn alive with a minimal persona
    pub fn minimal(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            archetype: Archetype::NarrativeAi,
            traits: Vec::new(),
            voice: VoiceStyle::default(),
            backstory: String::new(),
            emoji_policy: EmojiPolicy::default(),
        }
    }
}
