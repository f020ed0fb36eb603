//! # Sylph Memory Pod
//!
//! The data-coordination layer: clients for the three heterogeneous stores
//! (vector, relational, time-series), in-memory equivalents for tests and
//! local runs, the quality-scoring memory retriever, and the semantic
//! knowledge router that picks stores by query intent.

mod embedding;
mod error;
mod influx;
mod memstore;
mod postgres;
mod qdrant;
mod retriever;
mod router;

pub use embedding::HttpEmbedder;
pub use error::{MemoryError, MemoryResult};
pub use influx::InfluxMetricsStore;
pub use memstore::{InMemoryFactStore, InMemoryMetricsStore, InMemoryStores, InMemoryVectorStore};
pub use postgres::PostgresFactStore;
pub use qdrant::QdrantVectorStore;
pub use retriever::{MemoryRetriever, RetrieverConfig};
pub use router::{
    classify_intent, detect_topics, has_entity_keywords, referenced_entity, FusedItem,
    KnowledgeContext, KnowledgeRouter, KnowledgeSource, QueryIntent,
};
