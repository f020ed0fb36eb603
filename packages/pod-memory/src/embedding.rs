//! HTTP client for the external embedding model.

use crate::error::MemoryError;
use async_trait::async_trait;
use nalgebra::DVector;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sylph_core::{CoreError, Embedder, EMBEDDING_DIM};

/// Client for an embedding service exposing `POST /embed`
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// The model promises unit-norm 384-dim output; verify rather than poison
/// the collection with malformed vectors
fn validate_embedding(vector: Vec<f32>) -> sylph_core::Result<Vec<f32>> {
    if vector.len() != EMBEDDING_DIM {
        return Err(CoreError::Invalid(format!(
            "embedder returned {} dimensions, expected {}",
            vector.len(),
            EMBEDDING_DIM
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::Invalid("embedder returned non-finite values".into()));
    }
    let norm = DVector::from_row_slice(&vector).norm();
    if norm == 0.0 {
        return Err(CoreError::Invalid("embedder returned a zero vector".into()));
    }

    Ok(vector)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> sylph_core::Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(MemoryError::Http)?;

        if !response.status().is_success() {
            return Err(CoreError::Transient(format!(
                "embedding request failed with status {}",
                response.status()
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(MemoryError::Http)?;
        validate_embedding(body.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_vector() -> Vec<f32> {
        let mut vector = vec![0.0; EMBEDDING_DIM];
        vector[7] = 1.0;
        vector
    }

    #[test]
    fn test_well_formed_vector_passes() {
        let vector = unit_vector();
        assert_eq!(validate_embedding(vector.clone()).unwrap(), vector);
    }

    #[test]
    fn test_wrong_dimension_rejected() {
        let result = validate_embedding(vec![1.0; 12]);
        assert!(matches!(result, Err(CoreError::Invalid(_))));

        let result = validate_embedding(vec![1.0; EMBEDDING_DIM + 1]);
        assert!(matches!(result, Err(CoreError::Invalid(_))));
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut vector = unit_vector();
        vector[0] = f32::NAN;
        assert!(matches!(
            validate_embedding(vector),
            Err(CoreError::Invalid(_))
        ));

        let mut vector = unit_vector();
        vector[1] = f32::INFINITY;
        assert!(matches!(
            validate_embedding(vector),
            Err(CoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_vector_rejected() {
        assert!(matches!(
            validate_embedding(vec![0.0; EMBEDDING_DIM]),
            Err(CoreError::Invalid(_))
        ));
    }
}
