//! # Sylph Core
//!
//! Shared types and interfaces for the sylph conversational runtime.
//! This crate defines the turn and bundle records that flow through the
//! pipeline, the store traits the data layer implements, and the provider
//! traits that wrap external models, so that every higher crate depends on
//! interfaces rather than concrete backends.

pub mod bundle;
pub mod character;
pub mod emotion;
pub mod error;
pub mod fact;
pub mod memory;
pub mod metrics;
pub mod provider;
pub mod relationship;
pub mod store;
pub mod turn;

// Re-export core types
pub use bundle::{ConfidenceReport, IntelligenceBundle, SecurityVerdict};
pub use character::{Archetype, CharacterDefinition, EmojiPolicy, VoiceStyle};
pub use emotion::{
    EmotionLabel, EmotionRecord, EmotionSample, EmotionalTrajectory, TrajectoryDirection,
};
pub use error::{CoreError, Result};
pub use fact::UserFact;
pub use memory::{
    MemoryHit, MemoryId, MemoryKind, MemoryRecord, MemoryRetrieval, MemoryVectors, NamedVector,
    ScoredMemory, EMBEDDING_DIM,
};
pub use metrics::{MetricPoint, QualityFields};
pub use provider::{
    AttachmentDescriber, ChatMessage, ChatModel, ChatRequest, ChatRole, Completion, Embedder,
    EmotionAnalyzer, ResponseEnricher, TokenUsage,
};
pub use relationship::RelationshipScores;
pub use store::{FactStore, MetricsStore, PointFilter, VectorStore};
pub use turn::{Attachment, ChannelType, ProcessingResult, Turn};
