//! Read-through cache for character definitions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sylph_core::{CharacterDefinition, FactStore};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Character definitions change rarely; cache them in process with a TTL.
/// A fetch failure falls back to the minimal identity so the turn survives.
pub struct CharacterCache {
    store: Arc<dyn FactStore>,
    ttl: Duration,
    entries: RwLock<HashMap<String, (CharacterDefinition, Instant)>>,
}

impl CharacterCache {
    pub fn new(store: Arc<dyn FactStore>) -> Self {
        Self::with_ttl(store, Duration::from_secs(3600))
    }

    pub fn with_ttl(store: Arc<dyn FactStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The definition for a character, from cache when fresh
    pub async fn get(&self, character_id: &str) -> CharacterDefinition {
        {
            let entries = self.entries.read().await;
            if let Some((definition, fetched_at)) = entries.get(character_id) {
                if fetched_at.elapsed() < self.ttl {
                    return definition.clone();
                }
            }
        }

        match self.store.get_character(character_id).await {
            Ok(Some(definition)) => {
                debug!("Caching character definition for {}", character_id);
                self.entries
                    .write()
                    .await
                    .insert(character_id.to_string(), (definition.clone(), Instant::now()));
                definition
            }
            Ok(None) => {
                warn!("No definition for character {}, using minimal identity", character_id);
                CharacterDefinition::minimal(character_id)
            }
            Err(e) => {
                warn!(
                    "Character definition fetch failed for {}: {}, using minimal identity",
                    character_id, e
                );
                CharacterDefinition::minimal(character_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylph_pod_memory::InMemoryFactStore;

    #[tokio::test]
    async fn test_miss_falls_back_to_minimal() {
        let store = Arc::new(InMemoryFactStore::new());
        let cache = CharacterCache::new(store);
        let definition = cache.get("ghost").await;
        assert_eq!(definition.id, "ghost");
        assert_eq!(definition.name, "ghost");
    }

    #[tokio::test]
    async fn test_cache_serves_after_first_fetch() {
        let store = Arc::new(InMemoryFactStore::new());
        let mut definition = CharacterDefinition::minimal("elena");
        definition.name = "Elena".to_string();
        store.put_character(&definition).await.unwrap();

        let cache = CharacterCache::new(store.clone());
        assert_eq!(cache.get("elena").await.name, "Elena");

        // A later write is invisible until the TTL lapses
        definition.name = "Elena Mk II".to_string();
        store.put_character(&definition).await.unwrap();
        assert_eq!(cache.get("elena").await.name, "Elena");
    }
}
