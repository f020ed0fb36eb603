//! HTTP client for the external emotion classifier.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use sylph_core::{CoreError, EmotionAnalyzer, EmotionRecord};
use tokio::sync::Mutex;
use tracing::debug;

/// Client for a classifier service exposing `POST /analyze` and returning
/// the frozen emotion record schema.
///
/// The backing model serves one request at a time per instance, so calls
/// are serialized here instead of trusting every caller to remember that.
pub struct HttpEmotionAnalyzer {
    client: Client,
    base_url: String,
    gate: Mutex<()>,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

impl HttpEmotionAnalyzer {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            gate: Mutex::new(()),
        }
    }

    /// Liveness probe used at startup
    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl EmotionAnalyzer for HttpEmotionAnalyzer {
    async fn analyze(&self, text: &str) -> sylph_core::Result<EmotionRecord> {
        let _serialized = self.gate.lock().await;

        let response = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&AnalyzeRequest { text })
            .send()
            .await
            .map_err(|e| CoreError::Transient(format!("emotion analysis request: {}", e)))?;

        if !response.status().is_success() {
            return Err(CoreError::Transient(format!(
                "emotion analysis failed with status {}",
                response.status()
            )));
        }

        let record: EmotionRecord = response
            .json()
            .await
            .map_err(|e| CoreError::Invalid(format!("emotion record schema: {}", e)))?;

        debug!(
            "Classified text as {} (confidence {:.2}, intensity {:.2})",
            record.primary_emotion, record.confidence, record.emotional_intensity
        );
        Ok(record)
    }
}
