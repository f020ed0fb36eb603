//! In-memory store implementations.
//!
//! Behavior-equivalent stand-ins for the production backends, used by tests
//! and by local runs where no store URLs are configured. They implement the
//! same traits, so the pipeline cannot tell them apart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nalgebra::DVector;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use sylph_core::{
    CharacterDefinition, EmotionLabel, EmotionSample, FactStore, MemoryHit, MemoryId, MemoryRecord,
    MemoryVectors, MetricPoint, MetricsStore, NamedVector, PointFilter, RelationshipScores,
    UserFact, VectorStore,
};
use tokio::sync::RwLock;

/// Cosine similarity normalized to [0, 1], matching the production client
fn normalized_cosine(a: &[f32], b: &[f32]) -> f32 {
    let a = DVector::from_row_slice(a);
    let b = DVector::from_row_slice(b);
    let denom = a.norm() * b.norm();
    if denom == 0.0 {
        return 0.0;
    }
    ((a.dot(&b) / denom + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[derive(Clone)]
struct StoredPoint {
    record: MemoryRecord,
    vectors: MemoryVectors,
}

impl StoredPoint {
    fn matches(&self, filter: &PointFilter) -> bool {
        if let Some(user_id) = &filter.user_id {
            if &self.record.user_id != user_id {
                return false;
            }
        }
        if let Some(kind) = filter.kind {
            if self.record.kind != kind {
                return false;
            }
        }
        if let Some(text) = &filter.content_match {
            if !self
                .record
                .content
                .to_lowercase()
                .contains(&text.to_lowercase())
            {
                return false;
            }
        }
        true
    }

    fn vector(&self, name: NamedVector) -> &[f32] {
        match name {
            NamedVector::Content => &self.vectors.content,
            NamedVector::Emotion => &self.vectors.emotion,
            NamedVector::Semantic => &self.vectors.semantic,
        }
    }
}

/// In-memory vector store with per-collection point lists
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<StoredPoint>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection; test helper
    pub async fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, collection: &str) -> sylph_core::Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn upsert_point(
        &self,
        collection: &str,
        record: &MemoryRecord,
        vectors: &MemoryVectors,
    ) -> sylph_core::Result<()> {
        vectors.validate()?;
        let mut collections = self.collections.write().await;
        let points = collections.entry(collection.to_string()).or_default();
        points.retain(|point| point.record.id != record.id);
        points.push(StoredPoint {
            record: record.clone(),
            vectors: vectors.clone(),
        });
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
        let collections = self.collections.read().await;
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<MemoryHit> = points
            .iter()
            .filter(|point| point.matches(filter))
            .map(|point| MemoryHit {
                id: point.record.id,
                score: normalized_cosine(query, point.vector(vector)),
                record: point.record.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn scroll(
        &self,
        collection: &str,
        filter: &PointFilter,
        k: usize,
    ) -> sylph_core::Result<Vec<MemoryRecord>> {
        let collections = self.collections.read().await;
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut records: Vec<MemoryRecord> = points
            .iter()
            .filter(|point| point.matches(filter))
            .map(|point| point.record.clone())
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(k);
        Ok(records)
    }

    async fn recommend(
        &self,
        collection: &str,
        positive_id: MemoryId,
        negative_filter: &PointFilter,
        k: usize,
    ) -> sylph_core::Result<Vec<MemoryHit>> {
        let collections = self.collections.read().await;
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let Some(positive) = points.iter().find(|point| point.record.id == positive_id) else {
            return Ok(Vec::new());
        };

        let reference = positive.vector(NamedVector::Content).to_vec();
        let mut hits: Vec<MemoryHit> = points
            .iter()
            .filter(|point| point.record.id != positive_id && point.matches(negative_filter))
            .map(|point| MemoryHit {
                id: point.record.id,
                score: normalized_cosine(&reference, point.vector(NamedVector::Content)),
                record: point.record.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get_point(
        &self,
        collection: &str,
        id: MemoryId,
    ) -> sylph_core::Result<Option<MemoryRecord>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|points| points.iter().find(|point| point.record.id == id))
            .map(|point| point.record.clone()))
    }
}

type FactKey = (String, String, String, String);
type PairKey = (String, String);

/// In-memory relational store
#[derive(Default)]
pub struct InMemoryFactStore {
    facts: RwLock<HashMap<FactKey, UserFact>>,
    relationships: RwLock<HashMap<PairKey, RelationshipScores>>,
    characters: RwLock<HashMap<String, CharacterDefinition>>,
}

impl InMemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn fact_key(fact: &UserFact) -> FactKey {
        (
            fact.user_id.clone(),
            fact.character_id.clone(),
            fact.entity_name.to_lowercase(),
            fact.relationship_type.to_lowercase(),
        )
    }

    /// Total fact rows; test helper
    pub async fn fact_count(&self) -> usize {
        self.facts.read().await.len()
    }
}

#[async_trait]
impl FactStore for InMemoryFactStore {
    async fn upsert_fact(&self, fact: &UserFact) -> sylph_core::Result<()> {
        let mut facts = self.facts.write().await;
        facts
            .entry(Self::fact_key(fact))
            .and_modify(|existing| existing.absorb(fact))
            .or_insert_with(|| fact.clone());
        Ok(())
    }

    async fn facts_for_user(
        &self,
        user_id: &str,
        character_id: &str,
        min_confidence: f32,
        min_temporal_weight: f32,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        let facts = self.facts.read().await;
        let mut matching: Vec<UserFact> = facts
            .values()
            .filter(|fact| {
                fact.user_id == user_id
                    && fact.character_id == character_id
                    && fact.confidence >= min_confidence
                    && fact.temporal_weight >= min_temporal_weight
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.effective_weight().total_cmp(&a.effective_weight()));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn search_entities(
        &self,
        user_id: &str,
        character_id: &str,
        query: &str,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        let needle = query.to_lowercase();
        let facts = self.facts.read().await;
        let mut matching: Vec<UserFact> = facts
            .values()
            .filter(|fact| {
                fact.user_id == user_id
                    && fact.character_id == character_id
                    && fact.entity_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.effective_weight().total_cmp(&a.effective_weight()));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn related_entities(
        &self,
        user_id: &str,
        character_id: &str,
        entity_name: &str,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        let facts = self.facts.read().await;
        let pair_facts: Vec<&UserFact> = facts
            .values()
            .filter(|fact| fact.user_id == user_id && fact.character_id == character_id)
            .collect();

        // Entity graph: nodes are entities, edges join entities sharing a type
        let mut graph: UnGraph<String, ()> = UnGraph::new_undirected();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        for fact in &pair_facts {
            let name = fact.entity_name.to_lowercase();
            if !nodes.contains_key(&name) {
                let idx = graph.add_node(name.clone());
                nodes.insert(name, idx);
            }
        }
        for (i, a) in pair_facts.iter().enumerate() {
            for b in pair_facts.iter().skip(i + 1) {
                if a.entity_name != b.entity_name && a.entity_type == b.entity_type {
                    let ai = nodes[&a.entity_name.to_lowercase()];
                    let bi = nodes[&b.entity_name.to_lowercase()];
                    if graph.find_edge(ai, bi).is_none() {
                        graph.add_edge(ai, bi, ());
                    }
                }
            }
        }

        let Some(&seed) = nodes.get(&entity_name.to_lowercase()) else {
            return Ok(Vec::new());
        };

        // Two-hop breadth-first walk from the seed entity
        let mut reachable: HashSet<NodeIndex> = HashSet::new();
        let mut frontier = vec![seed];
        for _ in 0..2 {
            let mut next = Vec::new();
            for node in frontier {
                for neighbor in graph.neighbors(node) {
                    if neighbor != seed && reachable.insert(neighbor) {
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }

        let reachable_names: HashSet<&str> = reachable
            .iter()
            .map(|idx| graph[*idx].as_str())
            .collect();
        let mut matching: Vec<UserFact> = pair_facts
            .into_iter()
            .filter(|fact| reachable_names.contains(fact.entity_name.to_lowercase().as_str()))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.effective_weight().total_cmp(&a.effective_weight()));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn get_relationship(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> sylph_core::Result<Option<RelationshipScores>> {
        let relationships = self.relationships.read().await;
        Ok(relationships
            .get(&(user_id.to_string(), character_id.to_string()))
            .cloned())
    }

    async fn put_relationship(
        &self,
        user_id: &str,
        character_id: &str,
        scores: &RelationshipScores,
    ) -> sylph_core::Result<()> {
        self.relationships
            .write()
            .await
            .insert((user_id.to_string(), character_id.to_string()), scores.clone());
        Ok(())
    }

    async fn get_character(
        &self,
        character_id: &str,
    ) -> sylph_core::Result<Option<CharacterDefinition>> {
        Ok(self.characters.read().await.get(character_id).cloned())
    }

    async fn put_character(&self, definition: &CharacterDefinition) -> sylph_core::Result<()> {
        self.characters
            .write()
            .await
            .insert(definition.id.clone(), definition.clone());
        Ok(())
    }
}

/// In-memory metrics store retaining every written point
#[derive(Default)]
pub struct InMemoryMetricsStore {
    points: RwLock<Vec<MetricPoint>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points written for a measurement; test helper
    pub async fn count_for(&self, measurement: &str) -> usize {
        self.points
            .read()
            .await
            .iter()
            .filter(|point| point.measurement == measurement)
            .count()
    }

    /// Snapshot of all points; test helper
    pub async fn all_points(&self) -> Vec<MetricPoint> {
        self.points.read().await.clone()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn write(&self, point: MetricPoint) -> sylph_core::Result<()> {
        self.points.write().await.push(point);
        Ok(())
    }

    async fn bot_emotion_series(
        &self,
        character_id: &str,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> sylph_core::Result<Vec<EmotionSample>> {
        let points = self.points.read().await;
        let mut samples: Vec<EmotionSample> = points
            .iter()
            .filter(|point| point.measurement == "bot_emotion" && point.timestamp >= since)
            .filter(|point| {
                let tag = |key: &str| {
                    point
                        .tags
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| v.as_str())
                };
                tag("character") == Some(character_id) && tag("user_id") == Some(user_id)
            })
            .map(|point| {
                let emotion = point
                    .tags
                    .iter()
                    .find(|(k, _)| *k == "emotion")
                    .map(|(_, v)| EmotionLabel::parse(v))
                    .unwrap_or(EmotionLabel::Neutral);
                let intensity = point
                    .fields
                    .iter()
                    .find(|(k, _)| *k == "intensity")
                    .map(|(_, v)| *v as f32)
                    .unwrap_or(0.0);
                EmotionSample {
                    emotion,
                    intensity,
                    timestamp: point.timestamp,
                }
            })
            .collect();
        samples.sort_by_key(|sample| sample.timestamp);
        Ok(samples)
    }
}

/// Convenience bundle of the three in-memory stores sharing one lifetime
pub struct InMemoryStores {
    pub vectors: Arc<InMemoryVectorStore>,
    pub facts: Arc<InMemoryFactStore>,
    pub metrics: Arc<InMemoryMetricsStore>,
}

impl InMemoryStores {
    pub fn new() -> Self {
        Self {
            vectors: Arc::new(InMemoryVectorStore::new()),
            facts: Arc::new(InMemoryFactStore::new()),
            metrics: Arc::new(InMemoryMetricsStore::new()),
        }
    }
}

impl Default for InMemoryStores {
    fn default() -> Self {
        Self::new()
    }
}
