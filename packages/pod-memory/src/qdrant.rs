//! Qdrant-backed vector store speaking the REST API directly.
//!
//! One collection per character, each point carrying the three frozen named
//! vectors (`content`, `emotion`, `semantic`) and the memory payload. The
//! collection name is the partition boundary; no query in this module
//! filters by character.

use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sylph_core::{
    MemoryHit, MemoryId, MemoryRecord, MemoryVectors, NamedVector, PointFilter, VectorStore,
    EMBEDDING_DIM,
};
use tracing::{debug, warn};

/// Vector store client for a Qdrant instance
pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantVectorStore {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.header("api-key", key);
        }
        builder
    }

    /// Liveness probe used at startup
    pub async fn health_check(&self) -> MemoryResult<bool> {
        let response = self
            .request(reqwest::Method::GET, "/collections")
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn collection_exists(&self, collection: &str) -> MemoryResult<bool> {
        let response = self
            .request(reqwest::Method::GET, &format!("/collections/{}", collection))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    fn filter_to_json(filter: &PointFilter) -> Option<Value> {
        let mut must = Vec::new();
        if let Some(user_id) = &filter.user_id {
            must.push(json!({"key": "user_id", "match": {"value": user_id}}));
        }
        if let Some(kind) = filter.kind {
            must.push(json!({"key": "kind", "match": {"value": kind.as_str()}}));
        }
        if let Some(text) = &filter.content_match {
            must.push(json!({"key": "content", "match": {"text": text}}));
        }
        if must.is_empty() {
            None
        } else {
            Some(json!({"must": must}))
        }
    }

    /// Qdrant returns raw cosine similarity; normalize into [0, 1]
    fn normalize_score(score: f32) -> f32 {
        ((score + 1.0) / 2.0).clamp(0.0, 1.0)
    }

    fn payload_to_record(payload: Value) -> MemoryResult<MemoryRecord> {
        serde_json::from_value(payload).map_err(MemoryError::Serialization)
    }

    fn record_to_payload(record: &MemoryRecord) -> MemoryResult<Value> {
        let mut payload = serde_json::to_value(record)?;
        // Integer timestamp alongside the record for server-side ordering
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                "timestamp_micros".to_string(),
                json!(record.timestamp.timestamp_micros()),
            );
        }
        Ok(payload)
    }

    async fn check_response(response: reqwest::Response, context: &str) -> MemoryResult<Value> {
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(MemoryError::Connection(format!(
                "{} failed with status {}: {}",
                context, status, body
            )));
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct ScoredPointDto {
    id: String,
    #[serde(default)]
    score: f32,
    payload: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    vector: SearchVector<'a>,
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Debug, Serialize)]
struct SearchVector<'a> {
    name: &'a str,
    vector: &'a [f32],
}

fn parse_hits(points: Vec<ScoredPointDto>) -> Vec<MemoryHit> {
    points
        .into_iter()
        .filter_map(|point| {
            let id: MemoryId = match point.id.parse() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Dropping point with unparseable id {}: {}", point.id, e);
                    return None;
                }
            };
            let payload = point.payload?;
            match QdrantVectorStore::payload_to_record(payload) {
                Ok(record) => Some(MemoryHit {
                    id,
                    score: QdrantVectorStore::normalize_score(point.score),
                    record,
                }),
                Err(e) => {
                    warn!("Dropping point {} with malformed payload: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, collection: &str) -> sylph_core::Result<()> {
        if self.collection_exists(collection).await? {
            return Ok(());
        }

        debug!("Creating vector collection {}", collection);
        let body = json!({
            "vectors": {
                "content": {"size": EMBEDDING_DIM, "distance": "Cosine"},
                "emotion": {"size": EMBEDDING_DIM, "distance": "Cosine"},
                "semantic": {"size": EMBEDDING_DIM, "distance": "Cosine"},
            }
        });

        let response = self
            .request(reqwest::Method::PUT, &format!("/collections/{}", collection))
            .json(&body)
            .send()
            .await
            .map_err(MemoryError::Http)?;
        Self::check_response(response, "collection create").await?;

        // Payload indexes: user scoping, kind scoping, chronological scroll,
        // and full-text matching on content for contradiction queries
        for (field, schema) in [
            ("user_id", json!("keyword")),
            ("kind", json!("keyword")),
            ("timestamp_micros", json!("integer")),
            ("content", json!({"type": "text", "tokenizer": "word", "lowercase": true})),
        ] {
            let response = self
                .request(reqwest::Method::PUT, &format!("/collections/{}/index", collection))
                .json(&json!({"field_name": field, "field_schema": schema}))
                .send()
                .await
                .map_err(MemoryError::Http)?;
            Self::check_response(response, "payload index create").await?;
        }

        Ok(())
    }

    async fn upsert_point(
        &self,
        collection: &str,
        record: &MemoryRecord,
        vectors: &MemoryVectors,
    ) -> sylph_core::Result<()> {
        vectors.validate()?;

        let payload = Self::record_to_payload(record)?;
        let body = json!({
            "points": [{
                "id": record.id.to_string(),
                "vector": {
                    "content": &vectors.content,
                    "emotion": &vectors.emotion,
                    "semantic": &vectors.semantic,
                },
                "payload": payload,
            }]
        });

        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{}/points?wait=true", collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(MemoryError::Http)?;
        Self::check_response(response, "point upsert").await?;

        debug!("Upserted memory {} into {}", record.id, collection);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: NamedVector,
        query: &[f32],
        k: usize,
        filter: &PointFilter,
    ) -> sylph_core::Result<Vec<MemoryHit>> {
        let body = SearchBody {
            vector: SearchVector {
                name: vector.name(),
                vector: query,
            },
            limit: k,
            with_payload: true,
            filter: Self::filter_to_json(filter),
        };

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/search", collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(MemoryError::Http)?;
        let body = Self::check_response(response, "search").await?;

        let points: Vec<ScoredPointDto> =
            serde_json::from_value(body.get("result").cloned().unwrap_or(Value::Null))
                .map_err(MemoryError::Serialization)?;
        Ok(parse_hits(points))
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        k: usize,
    ) -> sylph_core::Result<Vec<MemoryRecord>> {
        let mut body = json!({
            "limit": k,
            "with_payload": true,
            "order_by": {"key": "timestamp_micros", "direction": "desc"},
        });
        if let Some(filter) = Self::filter_to_json(filter) {
            body["filter"] = filter;
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/scroll", collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(MemoryError::Http)?;
        let body = Self::check_response(response, "scroll").await?;

        let points = body
            .get("result")
            .and_then(|r| r.get("points"))
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut records = Vec::with_capacity(points.len());
        for point in points {
            if let Some(payload) = point.get("payload").cloned() {
                match Self::payload_to_record(payload) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Dropping scrolled point with malformed payload: {}", e),
                }
            }
        }
        Ok(records)
    }

    async fn recommend(
        &self,
        collection: &str,
        positive_id: MemoryId,
        negative_filter: &PointFilter,
        k: usize,
    ) -> sylph_core::Result<Vec<MemoryHit>> {
        let mut body = json!({
            "positive": [positive_id.to_string()],
            "limit": k,
            "with_payload": true,
        });
        if let Some(filter) = Self::filter_to_json(negative_filter) {
            body["filter"] = filter;
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points/recommend", collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(MemoryError::Http)?;
        let body = Self::check_response(response, "recommend").await?;

        let points: Vec<ScoredPointDto> =
            serde_json::from_value(body.get("result").cloned().unwrap_or(Value::Null))
                .map_err(MemoryError::Serialization)?;
        Ok(parse_hits(points))
    }

    async fn get_point(
        &self,
        collection: &str,
        id: MemoryId,
    ) -> sylph_core::Result<Option<MemoryRecord>> {
        let body = json!({"ids": [id.to_string()], "with_payload": true});

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{}/points", collection),
            )
            .json(&body)
            .send()
            .await
            .map_err(MemoryError::Http)?;
        let body = Self::check_response(response, "point fetch").await?;

        let payload = body
            .get("result")
            .and_then(|r| r.as_array())
            .and_then(|points| points.first())
            .and_then(|point| point.get("payload"))
            .cloned();

        match payload {
            Some(payload) => Ok(Some(Self::payload_to_record(payload)?)),
            None => Ok(None),
        }
    }
}
