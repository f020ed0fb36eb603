//! Environment-backed runtime configuration.
//!
//! Only the options listed here influence pipeline behavior; store and
//! provider endpoints are wiring concerns handled by the binary.

use crate::error::{Result, RuntimeError};
use serde::Deserialize;

/// Pipeline tuning options, loaded from the environment over defaults
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Prompt assembly token budget
    pub token_budget: usize,

    /// Overall per-turn deadline in milliseconds
    pub turn_deadline_ms: u64,

    /// Model identifier for conversational completions
    pub llm_model_chat: String,

    /// Model identifier for structured fact extraction
    pub llm_model_extraction: String,

    /// Prefix applied to per-character vector collection names
    pub vector_collection_prefix: String,

    /// Feature toggle: emoji decoration pass
    pub enable_emoji_decoration: bool,

    /// Feature toggle: AI-identity disclosure for real-world characters
    pub enable_ai_identity_disclosure: bool,

    /// Prefix length of the assembler's content-hash dedup key
    pub dedup_hash_prefix_chars: usize,

    /// Memory quality recency half-life in days
    pub memory_recency_halflife_days: f32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            token_budget: 16_000,
            turn_deadline_ms: 30_000,
            llm_model_chat: "gpt-4o-mini".to_string(),
            llm_model_extraction: "gpt-4o-mini".to_string(),
            vector_collection_prefix: String::new(),
            enable_emoji_decoration: false,
            enable_ai_identity_disclosure: true,
            dedup_hash_prefix_chars: 100,
            memory_recency_halflife_days: 30.0,
        }
    }
}

impl RuntimeConfig {
    /// Layer recognized environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let loaded = config::Config::builder()
            .set_default("token_budget", defaults.token_budget as i64)
            .and_then(|b| b.set_default("turn_deadline_ms", defaults.turn_deadline_ms as i64))
            .and_then(|b| b.set_default("llm_model_chat", defaults.llm_model_chat.clone()))
            .and_then(|b| {
                b.set_default("llm_model_extraction", defaults.llm_model_extraction.clone())
            })
            .and_then(|b| {
                b.set_default(
                    "vector_collection_prefix",
                    defaults.vector_collection_prefix.clone(),
                )
            })
            .and_then(|b| b.set_default("enable_emoji_decoration", defaults.enable_emoji_decoration))
            .and_then(|b| {
                b.set_default(
                    "enable_ai_identity_disclosure",
                    defaults.enable_ai_identity_disclosure,
                )
            })
            .and_then(|b| {
                b.set_default(
                    "dedup_hash_prefix_chars",
                    defaults.dedup_hash_prefix_chars as i64,
                )
            })
            .and_then(|b| {
                b.set_default(
                    "memory_recency_halflife_days",
                    defaults.memory_recency_halflife_days as f64,
                )
            })
            .map_err(|e| RuntimeError::Config(e.to_string()))?
            .add_source(config::Environment::default())
            .build()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;

        let config: Self = loaded
            .try_deserialize()
            .map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.token_budget == 0 {
            return Err(RuntimeError::Config("token budget must be positive".into()));
        }
        if self.turn_deadline_ms == 0 {
            return Err(RuntimeError::Config("turn deadline must be positive".into()));
        }
        if self.llm_model_chat.is_empty() {
            return Err(RuntimeError::Config("chat model cannot be empty".into()));
        }
        if self.dedup_hash_prefix_chars == 0 {
            return Err(RuntimeError::Config(
                "dedup hash prefix must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Vector collection name for a character
    pub fn collection_for(&self, character_id: &str) -> String {
        format!("{}{}", self.vector_collection_prefix, character_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_budget, 16_000);
        assert_eq!(config.turn_deadline_ms, 30_000);
    }

    #[test]
    fn test_collection_prefix() {
        let config = RuntimeConfig {
            vector_collection_prefix: "sylph_".to_string(),
            ..Default::default()
        };
        assert_eq!(config.collection_for("elena"), "sylph_elena");
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = RuntimeConfig {
            token_budget: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
