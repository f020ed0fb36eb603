//! PostgreSQL-backed relational store for user facts, relationship scores,
//! and character definitions.

use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use sylph_core::{CharacterDefinition, FactStore, RelationshipScores, UserFact};
use tracing::{debug, info};

/// Relational store client over a PostgreSQL pool
pub struct PostgresFactStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct FactRow {
    entity_name: String,
    entity_type: String,
    relationship_type: String,
    confidence: f32,
    last_mentioned: DateTime<Utc>,
    temporal_weight: f32,
}

impl FactRow {
    fn into_fact(self, user_id: &str, character_id: &str) -> UserFact {
        UserFact {
            user_id: user_id.to_string(),
            character_id: character_id.to_string(),
            entity_name: self.entity_name,
            entity_type: self.entity_type,
            relationship_type: self.relationship_type,
            confidence: self.confidence,
            last_mentioned: self.last_mentioned,
            temporal_weight: self.temporal_weight,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RelationshipRow {
    trust: f32,
    affection: f32,
    attunement: f32,
    interaction_count: i64,
    updated_at: DateTime<Utc>,
}

impl PostgresFactStore {
    /// Connect with a bounded pool
    pub async fn connect(database_url: &str, max_connections: u32) -> MemoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| MemoryError::Connection(format!("PostgreSQL connection failed: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if absent
    pub async fn initialize(&self) -> MemoryResult<()> {
        info!("Initializing relational store schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_facts (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id TEXT NOT NULL,
                character_id TEXT NOT NULL,
                entity_name TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                last_mentioned TIMESTAMPTZ NOT NULL,
                temporal_weight REAL NOT NULL DEFAULT 1.0,
                UNIQUE(user_id, character_id, entity_name, relationship_type)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS relationship_scores (
                user_id TEXT NOT NULL,
                character_id TEXT NOT NULL,
                trust REAL NOT NULL,
                affection REAL NOT NULL,
                attunement REAL NOT NULL,
                interaction_count BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, character_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                archetype TEXT NOT NULL,
                definition JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_user_facts_lookup \
             ON user_facts(user_id, character_id, entity_name)",
            "CREATE INDEX IF NOT EXISTS idx_user_facts_weight \
             ON user_facts(user_id, character_id, confidence)",
            "CREATE INDEX IF NOT EXISTS idx_user_facts_fulltext \
             ON user_facts USING GIN (to_tsvector('english', entity_name))",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Relational store schema initialized");
        Ok(())
    }

    /// Liveness probe used at startup
    pub async fn health_check(&self) -> MemoryResult<bool> {
        Ok(sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok())
    }
}

#[async_trait]
impl FactStore for PostgresFactStore {
    async fn upsert_fact(&self, fact: &UserFact) -> sylph_core::Result<()> {
        debug!(
            "Upserting fact {}:{} for {}/{}",
            fact.entity_name, fact.relationship_type, fact.user_id, fact.character_id
        );

        sqlx::query(
            r#"
            INSERT INTO user_facts (
                user_id, character_id, entity_name, entity_type,
                relationship_type, confidence, last_mentioned, temporal_weight
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, character_id, entity_name, relationship_type) DO UPDATE SET
                entity_type = EXCLUDED.entity_type,
                confidence = GREATEST(user_facts.confidence, EXCLUDED.confidence),
                last_mentioned = GREATEST(user_facts.last_mentioned, EXCLUDED.last_mentioned),
                temporal_weight = GREATEST(user_facts.temporal_weight, EXCLUDED.temporal_weight)
            "#,
        )
        .bind(&fact.user_id)
        .bind(&fact.character_id)
        .bind(&fact.entity_name)
        .bind(&fact.entity_type)
        .bind(&fact.relationship_type)
        .bind(fact.confidence)
        .bind(fact.last_mentioned)
        .bind(fact.temporal_weight)
        .execute(&self.pool)
        .await
        .map_err(MemoryError::Database)?;

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
        let rows = sqlx::query_as::<_, FactRow>(
            r#"
            SELECT entity_name, entity_type, relationship_type,
                   confidence, last_mentioned, temporal_weight
            FROM user_facts
            WHERE user_id = $1 AND character_id = $2
              AND confidence >= $3 AND temporal_weight >= $4
            ORDER BY confidence * temporal_weight DESC, last_mentioned DESC
            LIMIT $5
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .bind(min_confidence)
        .bind(min_temporal_weight)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(MemoryError::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_fact(user_id, character_id))
            .collect())
    }

    async fn search_entities(
        &self,
        user_id: &str,
        character_id: &str,
        query: &str,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        let rows = sqlx::query_as::<_, FactRow>(
            r#"
            SELECT entity_name, entity_type, relationship_type,
                   confidence, last_mentioned, temporal_weight
            FROM user_facts
            WHERE user_id = $1 AND character_id = $2
              AND to_tsvector('english', entity_name) @@ plainto_tsquery('english', $3)
            ORDER BY confidence * temporal_weight DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(MemoryError::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_fact(user_id, character_id))
            .collect())
    }

    async fn related_entities(
        &self,
        user_id: &str,
        character_id: &str,
        entity_name: &str,
        limit: usize,
    ) -> sylph_core::Result<Vec<UserFact>> {
        // Two hops across entities sharing a type with the seed entity
        let rows = sqlx::query_as::<_, FactRow>(
            r#"
            WITH RECURSIVE related AS (
                SELECT entity_name, entity_type, relationship_type,
                       confidence, last_mentioned, temporal_weight, 0 AS depth
                FROM user_facts
                WHERE user_id = $1 AND character_id = $2 AND entity_name = $3
              UNION
                SELECT f.entity_name, f.entity_type, f.relationship_type,
                       f.confidence, f.last_mentioned, f.temporal_weight, r.depth + 1
                FROM user_facts f
                JOIN related r ON f.entity_type = r.entity_type
                WHERE f.user_id = $1 AND f.character_id = $2 AND r.depth < 2
            )
            SELECT DISTINCT entity_name, entity_type, relationship_type,
                   confidence, last_mentioned, temporal_weight,
                   confidence * temporal_weight AS effective_weight
            FROM related
            WHERE entity_name <> $3
            ORDER BY effective_weight DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .bind(entity_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(MemoryError::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_fact(user_id, character_id))
            .collect())
    }

    async fn get_relationship(
        &self,
        user_id: &str,
        character_id: &str,
    ) -> sylph_core::Result<Option<RelationshipScores>> {
        let row = sqlx::query_as::<_, RelationshipRow>(
            r#"
            SELECT trust, affection, attunement, interaction_count, updated_at
            FROM relationship_scores
            WHERE user_id = $1 AND character_id = $2
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(MemoryError::Database)?;

        Ok(row.map(|row| RelationshipScores {
            trust: row.trust,
            affection: row.affection,
            attunement: row.attunement,
            interaction_count: row.interaction_count.max(0) as u64,
            updated_at: row.updated_at,
        }))
    }

    async fn put_relationship(
        &self,
        user_id: &str,
        character_id: &str,
        scores: &RelationshipScores,
    ) -> sylph_core::Result<()> {
        let mut tx = self.pool.begin().await.map_err(MemoryError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO relationship_scores (
                user_id, character_id, trust, affection, attunement,
                interaction_count, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, character_id) DO UPDATE SET
                trust = EXCLUDED.trust,
                affection = EXCLUDED.affection,
                attunement = EXCLUDED.attunement,
                interaction_count = EXCLUDED.interaction_count,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(character_id)
        .bind(scores.trust)
        .bind(scores.affection)
        .bind(scores.attunement)
        .bind(scores.interaction_count as i64)
        .bind(scores.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(MemoryError::Database)?;

        tx.commit().await.map_err(MemoryError::Database)?;
        Ok(())
    }

    async fn get_character(
        &self,
        character_id: &str,
    ) -> sylph_core::Result<Option<CharacterDefinition>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT definition FROM characters WHERE id = $1")
                .bind(character_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(MemoryError::Database)?;

        match row {
            Some((definition,)) => Ok(Some(
                serde_json::from_value(definition).map_err(MemoryError::Serialization)?,
            )),
            None => Ok(None),
        }
    }

    async fn put_character(&self, definition: &CharacterDefinition) -> sylph_core::Result<()> {
        let archetype = serde_json::to_value(definition.archetype)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "narrative_ai".to_string());

        sqlx::query(
            r#"
            INSERT INTO characters (id, name, archetype, definition, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                archetype = EXCLUDED.archetype,
                definition = EXCLUDED.definition,
                updated_at = NOW()
            "#,
        )
        .bind(&definition.id)
        .bind(&definition.name)
        .bind(archetype)
        .bind(serde_json::to_value(definition).map_err(MemoryError::Serialization)?)
        .execute(&self.pool)
        .await
        .map_err(MemoryError::Database)?;

        Ok(())
    }
}
