//! Outbound response validation: length caps, banned tokens, and
//! runaway-repetition detection.

use tracing::warn;

/// Longest response delivered to a platform
const MAX_RESPONSE_CHARS: usize = 4_000;

/// Model-internal markers that must never reach a user
const BANNED_TOKENS: &[&str] = &["<|", "|>", "[INST]", "[/INST]", "<system>", "</system>"];

/// A sentence repeated this many times in a row reads as a generation loop
const REPEAT_LIMIT: usize = 3;

/// What to do with a candidate response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Deliver as-is (possibly truncated or de-looped)
    Deliver(String),
    /// A banned token survived; regenerate once before giving up
    Regenerate,
}

/// Validate and repair a response
pub fn validate_response(response: &str) -> Validation {
    let trimmed = response.trim();

    for token in BANNED_TOKENS {
        if trimmed.contains(token) {
            warn!("Response contains banned token {:?}", token);
            return Validation::Regenerate;
        }
    }

    let deduped = collapse_repeats(trimmed);
    if deduped.len() != trimmed.len() {
        warn!("Collapsed repeated sentences in response");
    }

    let mut result = deduped;
    if result.chars().count() > MAX_RESPONSE_CHARS {
        warn!("Truncating over-long response ({} chars)", result.chars().count());
        result = result.chars().take(MAX_RESPONSE_CHARS).collect();
        // Cut back to the last sentence boundary where one exists
        if let Some(idx) = result.rfind(['.', '!', '?']) {
            if idx > MAX_RESPONSE_CHARS / 2 {
                result.truncate(idx + 1);
            }
        }
    }

    Validation::Deliver(result)
}

/// Collapse runs of an identical sentence beyond the repeat limit
fn collapse_repeats(text: &str) -> String {
    let sentences: Vec<&str> = text
        .split_inclusive(['.', '!', '?'])
        .map(str::trim_start)
        .filter(|sentence| !sentence.is_empty())
        .collect();
    if sentences.len() < REPEAT_LIMIT {
        return text.to_string();
    }

    let mut kept: Vec<&str> = Vec::with_capacity(sentences.len());
    let mut run = 0;
    for sentence in sentences {
        if kept.last().map(|last| *last == sentence).unwrap_or(false) {
            run += 1;
            if run >= REPEAT_LIMIT {
                continue;
            }
        } else {
            run = 1;
        }
        kept.push(sentence);
    }
    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_response_passes_through() {
        let response = "The reef was beautiful today. You should have seen the rays!";
        assert_eq!(
            validate_response(response),
            Validation::Deliver(response.to_string())
        );
    }

    #[test]
    fn test_banned_tokens_force_regeneration() {
        assert_eq!(
            validate_response("sure thing <|endoftext|> friend"),
            Validation::Regenerate
        );
    }

    #[test]
    fn test_repeat_loops_collapse() {
        let looped = "I hear you. I hear you. I hear you. I hear you. I hear you.";
        match validate_response(looped) {
            Validation::Deliver(text) => {
                assert_eq!(text.matches("I hear you.").count(), 2);
            }
            Validation::Regenerate => panic!("should deliver"),
        }
    }

    #[test]
    fn test_long_responses_truncate_at_sentence() {
        let long: String = (0..400)
            .map(|i| format!("Sentence number {} has some length to it. ", i))
            .collect();
        match validate_response(&long) {
            Validation::Deliver(text) => {
                assert!(text.chars().count() <= MAX_RESPONSE_CHARS);
                assert!(text.ends_with('.'));
            }
            Validation::Regenerate => panic!("should deliver"),
        }
    }
}
