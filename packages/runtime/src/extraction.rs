//! Structured fact extraction from a completed turn.
//!
//! Runs inside the persistence fan-out under its own time budget; a missed
//! extraction delays the structured record, never the conversation.

use chrono::Utc;
use serde::Deserialize;
use sylph_core::{ChatMessage, ChatModel, ChatRequest, Turn, UserFact};
use tracing::{debug, warn};

const EXTRACTION_SYSTEM: &str = "You extract durable personal facts from one chat exchange. \
Return a JSON array, nothing else. Each element: {\"entity_name\": string, \"entity_type\": \
string, \"relationship_type\": string, \"confidence\": number 0..1}. entity_type is a short \
category like hobby, food, person, place, job. relationship_type is a verb like loves, hates, \
owns, works_at. Only include facts the user stated about themselves; ignore questions, \
hypotheticals, and the assistant's own statements. Return [] when there is nothing durable.";

#[derive(Debug, Deserialize)]
struct ExtractedFact {
    entity_name: String,
    entity_type: String,
    relationship_type: String,
    confidence: f32,
}

/// Ask the extraction model for durable facts in this exchange
pub async fn extract_facts(
    model: &dyn ChatModel,
    extraction_model: &str,
    turn: &Turn,
    response_text: &str,
) -> Vec<UserFact> {
    let exchange = format!("User: {}\nAssistant: {}", turn.content, response_text);
    let request = ChatRequest {
        messages: vec![
            ChatMessage::system(EXTRACTION_SYSTEM),
            ChatMessage::user(exchange),
        ],
        model: extraction_model.to_string(),
        temperature: 0.0,
        max_tokens: 512,
    };

    let completion = match model.complete(request).await {
        Ok(completion) => completion,
        Err(e) => {
            warn!("Fact extraction call failed: {}", e);
            return Vec::new();
        }
    };

    parse_extracted(&completion.text)
        .into_iter()
        .map(|extracted| UserFact {
            user_id: turn.user_id.clone(),
            character_id: turn.character_id.clone(),
            entity_name: extracted.entity_name,
            entity_type: extracted.entity_type,
            relationship_type: extracted.relationship_type,
            confidence: extracted.confidence.clamp(0.0, 1.0),
            last_mentioned: Utc::now(),
            temporal_weight: 1.0,
        })
        .collect()
}

/// Tolerant JSON parse: models love to wrap arrays in code fences
fn parse_extracted(text: &str) -> Vec<ExtractedFact> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    // Fall back to the outermost bracket span when extra prose sneaks in
    let candidate = match (inner.find('['), inner.rfind(']')) {
        (Some(start), Some(end)) if start < end => &inner[start..=end],
        _ => inner,
    };

    match serde_json::from_str::<Vec<ExtractedFact>>(candidate) {
        Ok(facts) => {
            debug!("Extracted {} facts", facts.len());
            facts
                .into_iter()
                .filter(|fact| !fact.entity_name.trim().is_empty())
                .collect()
        }
        Err(e) => {
            warn!("Discarding unparseable extraction output: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let facts = parse_extracted(
            r#"[{"entity_name": "deep-sea diving", "entity_type": "hobby",
                "relationship_type": "loves", "confidence": 0.85}]"#,
        );
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].entity_name, "deep-sea diving");
    }

    #[test]
    fn test_parse_fenced_array() {
        let facts = parse_extracted(
            "```json\n[{\"entity_name\": \"tacos\", \"entity_type\": \"food\", \
             \"relationship_type\": \"likes\", \"confidence\": 0.7}]\n```",
        );
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].entity_type, "food");
    }

    #[test]
    fn test_parse_garbage_is_empty() {
        assert!(parse_extracted("I couldn't find any facts.").is_empty());
        assert!(parse_extracted("").is_empty());
    }

    #[test]
    fn test_parse_array_with_prose() {
        let facts = parse_extracted(
            "Here you go: [{\"entity_name\": \"Oslo\", \"entity_type\": \"place\", \
             \"relationship_type\": \"lives_in\", \"confidence\": 0.9}] hope that helps",
        );
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].entity_name, "Oslo");
    }
}
