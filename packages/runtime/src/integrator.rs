//! Character integration: turning a character definition plus the turn's
//! intelligence signals into prompt components.

use crate::assembler::{ComponentKind, PromptComponent};
use once_cell::sync::Lazy;
use regex::Regex;
use sylph_core::{Archetype, CharacterDefinition, IntelligenceBundle};

/// Questions that require honest disclosure from real-world characters
static AI_IDENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)are you (an? )?(AI|bot|real)").expect("identity pattern"));

/// Whether a user message is asking if the character is artificial
pub fn asks_about_ai_identity(message: &str) -> bool {
    AI_IDENTITY.is_match(message)
}

/// Builds character-derived prompt components
pub struct CharacterIntegrator {
    disclosure_enabled: bool,
}

impl CharacterIntegrator {
    pub fn new(disclosure_enabled: bool) -> Self {
        Self { disclosure_enabled }
    }

    /// Identity, voice, and disclosure components for a turn
    pub fn components(
        &self,
        character: &CharacterDefinition,
        user_message: &str,
    ) -> Vec<PromptComponent> {
        let mut components = Vec::new();

        components.push(
            PromptComponent::new(
                ComponentKind::CharacterIdentity,
                10,
                self.identity_text(character),
            )
            .required(),
        );

        components.push(PromptComponent::new(
            ComponentKind::CharacterVoice,
            20,
            self.voice_text(character),
        ));

        if character.archetype == Archetype::RealWorld
            && self.disclosure_enabled
            && asks_about_ai_identity(user_message)
        {
            components.push(
                PromptComponent::new(
                    ComponentKind::AiIdentityDisclosure,
                    5,
                    "The user is asking whether you are artificial. Acknowledge honestly that \
                     you are an AI, in your own voice, without breaking warmth.",
                )
                .required(),
            );
        }

        components
    }

    /// Signal-driven style guidance, emitted once relationship scores and
    /// confidence are known
    pub fn adaptation_component(&self, bundle: &IntelligenceBundle) -> Option<PromptComponent> {
        let guidance = self.adaptation_text(bundle);
        if guidance.is_empty() {
            None
        } else {
            Some(PromptComponent::new(
                ComponentKind::StyleGuidance,
                40,
                guidance.join("\n"),
            ))
        }
    }

    /// The emotional-state component from the bot's computed trajectory
    pub fn emotional_state_component(
        &self,
        bundle: &IntelligenceBundle,
    ) -> Option<PromptComponent> {
        let trajectory = bundle.bot_trajectory.as_ref()?;
        let recent: Vec<&str> = trajectory
            .recent_emotions
            .iter()
            .map(|emotion| emotion.as_str())
            .collect();
        let text = format!(
            "Your recent mood has been {} (intensity {:.2}) and is {}. Recent emotions: {}.",
            trajectory.current_emotion,
            trajectory.intensity,
            trajectory.direction.as_str(),
            recent.join(", ")
        );
        Some(PromptComponent::new(
            ComponentKind::CharacterEmotionalState,
            30,
            text,
        ))
    }

    fn identity_text(&self, character: &CharacterDefinition) -> String {
        let mut text = format!("You are {}.", character.name);
        match character.archetype {
            Archetype::RealWorld => {
                text.push_str(" You present as an ordinary person with a real life.")
            }
            Archetype::Fantasy => text.push_str(" You are an openly fictional being."),
            Archetype::NarrativeAi => {
                text.push_str(" You are an artificial intelligence within your own story.")
            }
        }
        if !character.traits.is_empty() {
            text.push_str(&format!(" You are {}.", character.traits.join(", ")));
        }
        if !character.backstory.trim().is_empty() {
            text.push_str("\n\n");
            text.push_str(character.backstory.trim());
        }
        text
    }

    fn voice_text(&self, character: &CharacterDefinition) -> String {
        let voice = &character.voice;
        let mut text = format!("Speak in a {} tone.", voice.tone);
        if voice.formality < 0.3 {
            text.push_str(" Keep it casual.");
        } else if voice.formality > 0.7 {
            text.push_str(" Stay formal.");
        }
        if voice.verbosity < 0.3 {
            text.push_str(" Keep replies short.");
        } else if voice.verbosity > 0.7 {
            text.push_str(" It is fine to be expansive.");
        }
        if voice.humor > 0.6 {
            text.push_str(" Humor is welcome.");
        }
        if character.emoji_policy.enabled {
            text.push_str(&format!(
                " Use at most {} emoji per message.",
                character.emoji_policy.max_per_message
            ));
        } else {
            text.push_str(" Do not use emoji.");
        }
        text
    }

    /// Signal-driven guidance lines; absent signals contribute nothing
    fn adaptation_text(&self, bundle: &IntelligenceBundle) -> Vec<String> {
        let mut guidance = Vec::new();

        if let Some(relationship) = &bundle.relationship_state {
            if relationship.trust > 0.8 {
                guidance.push(
                    "You and this user know each other well; personal and intimate topics are \
                     welcome."
                        .to_string(),
                );
            }
        }

        if let Some(confidence) = &bundle.confidence {
            if confidence.overall < 0.6 {
                guidance.push(
                    "Your context on this user is thin; express uncertainty rather than \
                     guessing at their life."
                        .to_string(),
                );
            }
        }

        if let Some(emotion) = &bundle.user_emotion {
            if emotion.emotional_intensity > 0.7 && emotion.has_strong_signal() {
                guidance.push(format!(
                    "The user is feeling strong {}; lead with empathy before anything else.",
                    emotion.primary_emotion
                ));
            }
        }

        guidance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use sylph_core::{ConfidenceReport, EmotionLabel, EmotionRecord, RelationshipScores};

    fn character(archetype: Archetype) -> CharacterDefinition {
        let mut definition = CharacterDefinition::minimal("elena");
        definition.name = "Elena".to_string();
        definition.archetype = archetype;
        definition
    }

    #[test]
    fn test_disclosure_requires_real_world_and_pattern() {
        let integrator = CharacterIntegrator::new(true);

        let components =
            integrator.components(&character(Archetype::RealWorld), "Are you an AI?");
        let disclosure = components
            .iter()
            .find(|c| c.kind == ComponentKind::AiIdentityDisclosure)
            .expect("disclosure present");
        assert_eq!(disclosure.priority, 5);
        assert!(disclosure.required);

        let components =
            integrator.components(&character(Archetype::Fantasy), "Are you an AI?");
        assert!(!components
            .iter()
            .any(|c| c.kind == ComponentKind::AiIdentityDisclosure));

        let components = integrator.components(&character(Archetype::RealWorld), "What should we cook?");
        assert!(!components
            .iter()
            .any(|c| c.kind == ComponentKind::AiIdentityDisclosure));
    }

    #[rstest]
    #[case("are you a bot?", true)]
    #[case("Are you real?", true)]
    #[case("wait, are you an AI", true)]
    #[case("do you like AI research?", false)]
    #[case("were you ever a diver?", false)]
    fn test_identity_pattern_variants(#[case] message: &str, #[case] matches: bool) {
        assert_eq!(asks_about_ai_identity(message), matches);
    }

    #[test]
    fn test_high_trust_unlocks_intimacy_guidance() {
        let integrator = CharacterIntegrator::new(true);
        let mut bundle = IntelligenceBundle::new();
        bundle.relationship_state = Some(RelationshipScores {
            trust: 0.9,
            ..Default::default()
        });

        let style = integrator
            .adaptation_component(&bundle)
            .expect("style guidance");
        assert!(style.content.contains("know each other well"));
    }

    #[test]
    fn test_low_confidence_adds_uncertainty_guidance() {
        let integrator = CharacterIntegrator::new(true);
        let mut bundle = IntelligenceBundle::new();
        bundle.confidence = Some(ConfidenceReport {
            overall: 0.4,
            context: 0.3,
            emotional: 0.5,
        });

        let style = integrator
            .adaptation_component(&bundle)
            .expect("style guidance");
        assert!(style.content.contains("uncertainty"));
    }

    #[test]
    fn test_weak_neutral_emotion_never_triggers_empathy() {
        let integrator = CharacterIntegrator::new(true);
        let mut bundle = IntelligenceBundle::new();
        let mut record = EmotionRecord::neutral();
        record.emotional_intensity = 0.9;
        record.confidence = 0.2;
        bundle.user_emotion = Some(record);

        assert!(integrator.adaptation_component(&bundle).is_none());

        let mut record = EmotionRecord::neutral();
        record.primary_emotion = EmotionLabel::Sadness;
        record.emotional_intensity = 0.9;
        record.confidence = 0.8;
        bundle.user_emotion = Some(record);
        let style = integrator
            .adaptation_component(&bundle)
            .expect("style guidance");
        assert!(style.content.contains("empathy"));
    }
}
