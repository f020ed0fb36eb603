//! Runtime entry point: wire one character instance to its stores and
//! providers, then serve turns from a minimal stdin ingress loop.
//!
//! Platform adapters proper (chat transports, auth) live outside this
//! binary; stdin stands in for them so an instance can be exercised
//! end to end.

use anyhow::{bail, Context};
use std::env;
use std::io::Write;
use std::sync::Arc;
use sylph_core::{
    Archetype, CharacterDefinition, ChatModel, Embedder, EmotionAnalyzer, FactStore, MetricsStore,
    Turn, VectorStore,
};
use sylph_pod_emotion::HttpEmotionAnalyzer;
use sylph_pod_memory::{
    HttpEmbedder, InMemoryFactStore, InMemoryMetricsStore, InMemoryVectorStore,
    InfluxMetricsStore, PostgresFactStore, QdrantVectorStore,
};
use sylph_runtime::limits::defaults;
use sylph_runtime::{
    BoundedChatModel, BoundedFactStore, BoundedMetricsStore, BoundedVectorStore, EmojiDecorator,
    OpenAiChatClient, PipelineOrchestrator, RuntimeConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RuntimeConfig::from_env().context("loading runtime configuration")?;
    info!(
        "Starting sylph runtime (chat model {}, budget {} tokens)",
        config.llm_model_chat, config.token_budget
    );

    let http = sylph_runtime::http::shared_client();

    // Required providers
    let llm_base = env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let Ok(llm_key) = env::var("LLM_API_KEY") else {
        bail!("LLM_API_KEY is required");
    };
    let chat: Arc<dyn ChatModel> = Arc::new(BoundedChatModel::new(
        Arc::new(OpenAiChatClient::new(http.clone(), llm_base, llm_key)),
        defaults::CHAT_MODEL,
    ));

    let Ok(embedder_url) = env::var("EMBEDDER_URL") else {
        bail!("EMBEDDER_URL is required");
    };
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(http.clone(), embedder_url));

    let Ok(analyzer_url) = env::var("EMOTION_ANALYZER_URL") else {
        bail!("EMOTION_ANALYZER_URL is required");
    };
    let analyzer: Arc<dyn EmotionAnalyzer> =
        Arc::new(HttpEmotionAnalyzer::new(http.clone(), analyzer_url));

    // Stores: production clients when configured, in-memory otherwise
    let vectors: Arc<dyn VectorStore> = match env::var("QDRANT_URL") {
        Ok(url) => {
            let store = QdrantVectorStore::new(http.clone(), url, env::var("QDRANT_API_KEY").ok());
            if !store.health_check().await.unwrap_or(false) {
                warn!("Vector store health check failed; continuing anyway");
            }
            Arc::new(BoundedVectorStore::new(Arc::new(store), defaults::VECTOR_STORE))
        }
        Err(_) => {
            warn!("QDRANT_URL not set; conversation memory is in-process only");
            Arc::new(InMemoryVectorStore::new())
        }
    };

    let facts: Arc<dyn FactStore> = match env::var("POSTGRES_URL") {
        Ok(url) => {
            let store = PostgresFactStore::connect(&url, defaults::FACT_STORE as u32)
                .await
                .context("connecting to the relational store")?;
            store.initialize().await.context("initializing relational schema")?;
            Arc::new(BoundedFactStore::new(Arc::new(store), defaults::FACT_STORE))
        }
        Err(_) => {
            warn!("POSTGRES_URL not set; facts and relationships are in-process only");
            Arc::new(InMemoryFactStore::new())
        }
    };

    let metrics: Arc<dyn MetricsStore> = match env::var("INFLUX_URL") {
        Ok(url) => {
            let org = env::var("INFLUX_ORG").unwrap_or_else(|_| "sylph".into());
            let bucket = env::var("INFLUX_BUCKET").unwrap_or_else(|_| "sylph".into());
            let token = env::var("INFLUX_TOKEN").unwrap_or_default();
            let store = InfluxMetricsStore::new(http.clone(), url, org, bucket, token);
            if !store.health_check().await.unwrap_or(false) {
                warn!("Time-series store health check failed; continuing anyway");
            }
            Arc::new(BoundedMetricsStore::new(Arc::new(store), defaults::METRICS_STORE))
        }
        Err(_) => {
            warn!("INFLUX_URL not set; emotion analytics are in-process only");
            Arc::new(InMemoryMetricsStore::new())
        }
    };

    let character_id = env::var("SYLPH_CHARACTER_ID").unwrap_or_else(|_| "elena".into());
    let user_id = env::var("SYLPH_USER_ID").unwrap_or_else(|_| "local".into());
    seed_character_if_missing(facts.as_ref(), &character_id).await;

    let mut pipeline = PipelineOrchestrator::new(
        config.clone(),
        vectors,
        facts,
        metrics,
        chat,
        embedder,
        analyzer,
    );
    if config.enable_emoji_decoration {
        pipeline = pipeline.with_enricher(Arc::new(EmojiDecorator::new()));
    }

    info!("Ready; talking to character '{}' as user '{}'", character_id, user_id);
    serve_stdin(&pipeline, &character_id, &user_id).await
}

/// A first run against empty stores still needs a persona to speak as
async fn seed_character_if_missing(facts: &dyn FactStore, character_id: &str) {
    match facts.get_character(character_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let mut definition = CharacterDefinition::minimal(character_id);
            definition.name = {
                let mut chars = character_id.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => character_id.to_string(),
                }
            };
            definition.archetype = Archetype::RealWorld;
            definition.traits = vec!["curious".into(), "warm".into(), "attentive".into()];
            definition.backstory =
                "A marine biologist who spends half the year on research vessels and the other \
                 half missing the sea."
                    .into();
            if let Err(e) = facts.put_character(&definition).await {
                warn!("Could not seed character definition: {}", e);
            }
        }
        Err(e) => warn!("Character lookup failed during startup: {}", e),
    }
}

async fn serve_stdin(
    pipeline: &PipelineOrchestrator,
    character_id: &str,
    user_id: &str,
) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            info!("Ingress closed, shutting down");
            return Ok(());
        }
        let content = line.trim();
        if content.is_empty() {
            continue;
        }
        if content == "/quit" {
            return Ok(());
        }

        let turn = Turn::direct(user_id, character_id, "stdin", content);
        let result = pipeline.process(turn).await;
        println!("{}", result.response_text);
        if !result.success {
            warn!("Turn completed with a fallback response");
        }
    }
}
