use crate::bundle::IntelligenceBundle;
use crate::character::CharacterDefinition;
use crate::emotion::EmotionRecord;
use crate::turn::Attachment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message roles in model conversations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry in the message list sent to the language model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request to the language model
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Token accounting from the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A model completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// External language model (chat and structured extraction calls).
///
/// Implementations surface rate limits as transient errors so the
/// orchestrator's single-retry policy applies.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> crate::Result<Completion>;
}

/// External embedding model: text to a unit-norm 384-dim vector,
/// deterministic for a given model version
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> crate::Result<Vec<f32>>;
}

/// External emotion classifier returning the frozen record schema.
///
/// Invocation is serialized per character instance; implementations must not
/// be called concurrently for the same instance and the pipeline calls it at
/// most twice per turn.
#[async_trait]
pub trait EmotionAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> crate::Result<EmotionRecord>;
}

/// Optional response transform applied after the model reply (emoji
/// decoration and similar leaf enrichers).
///
/// The orchestrator holds a possibly-empty ordered list of these; an absent
/// enricher is simply not in the list, and a failing one leaves the response
/// unchanged.
#[async_trait]
pub trait ResponseEnricher: Send + Sync {
    fn name(&self) -> &str;

    async fn enrich(
        &self,
        character: &CharacterDefinition,
        bundle: &IntelligenceBundle,
        response: String,
    ) -> crate::Result<String>;
}

/// External vision/description service for attachments; failures drop the
/// attachment rather than the turn
#[async_trait]
pub trait AttachmentDescriber: Send + Sync {
    async fn describe(&self, attachment: &Attachment) -> crate::Result<String>;
}
