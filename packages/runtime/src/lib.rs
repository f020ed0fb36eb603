//! # Sylph Runtime
//!
//! The message-processing runtime: prompt assembly, character integration,
//! relationship learning, response validation, persistence coordination,
//! and the phased orchestrator that ties them to the data layer.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod enricher;
pub mod error;
pub mod extraction;
pub mod http;
pub mod integrator;
pub mod limits;
pub mod llm;
pub mod pipeline;
pub mod relationship;
pub mod retry;
pub mod security;
pub mod validator;

pub use assembler::{
    estimate_tokens, AssembledPrompt, ComponentKind, PromptAssembler, PromptComponent,
    ANTI_HALLUCINATION_TEXT,
};
pub use cache::CharacterCache;
pub use config::RuntimeConfig;
pub use coordinator::PersistenceCoordinator;
pub use enricher::EmojiDecorator;
pub use error::{Result, RuntimeError};
pub use integrator::{asks_about_ai_identity, CharacterIntegrator};
pub use limits::{BoundedChatModel, BoundedFactStore, BoundedMetricsStore, BoundedVectorStore};
pub use llm::OpenAiChatClient;
pub use pipeline::PipelineOrchestrator;
pub use relationship::RelationshipEngine;
pub use retry::{retry_with_config, RetryConfig, RetryableError};
pub use security::{validate_message, INTERNAL_ERROR, SECURITY_REJECTION, UPSTREAM_TIMEOUT};
pub use validator::{validate_response, Validation};
