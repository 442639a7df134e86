//! Embedding providers.
//!
//! Concrete implementations of [`Embedder`]:
//! - **[`OpenAiEmbedder`]** calls the OpenAI embeddings API with retry and backoff.
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`LocalEmbedder`]** runs a fastembed model in-process (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! [`CachedEmbedder`] wraps any of them with a bounded FIFO cache keyed by
//! model and text digest, so repeated queries over the same files do not
//! re-embed unchanged documents.
//!
//! Use [`create_embedder`] to build the configured provider.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workspace_mcp_core::embedding::{DisabledEmbedder, Embedder};

use crate::config::EmbeddingConfig;
use crate::http::post_json_with_retry;

// ============ OpenAI Provider ============

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    model: String,
    api_key: String,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model,
            api_key,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({ "model": self.model, "input": [text] });
        let json = post_json_with_retry(
            &self.client,
            "https://api.openai.com/v1/embeddings",
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
    Ok(to_f32_vec(embedding))
}

// ============ Ollama Provider ============

pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    url: String,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model,
            url,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({ "model": self.model, "input": [text] });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .and_then(|e| e.first())
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;
    Ok(to_f32_vec(embedding))
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            model: Arc::new(Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let slot = Arc::clone(&self.model);
        let name = self.model_name.clone();
        let text = text.to_string();

        // The model is loaded once, on first use, and reused afterwards.
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(
                    config_to_fastembed_model(&name)?,
                ))
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("local embedding model missing"))?;
            let mut out = model
                .embed(vec![text], None)
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))?;
            out.pop()
                .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
        })
        .await?
    }
}

// ============ Cache ============

struct FifoCache {
    entries: HashMap<[u8; 32], Arc<Vec<f32>>>,
    order: VecDeque<[u8; 32]>,
    max_entries: usize,
}

impl FifoCache {
    fn get(&self, key: &[u8; 32]) -> Option<Arc<Vec<f32>>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: [u8; 32], value: Arc<Vec<f32>>) {
        if self.max_entries == 0 {
            return;
        }
        if self.entries.insert(key, value).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.max_entries {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Memoizes another embedder. Failures are not cached.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<FifoCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, max_entries: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(FifoCache {
                entries: HashMap::new(),
                order: VecDeque::new(),
                max_entries,
            }),
        }
    }

    fn key(&self, text: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.model_name().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hasher.finalize().into()
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.key(text);
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key)) {
            return Ok(hit.as_ref().clone());
        }
        let vector = self.inner.embed(text).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, Arc::new(vector.clone()));
        }
        Ok(vector)
    }
}

/// Build the configured embedder, wrapped in a cache of `cache_entries`.
pub fn create_embedder(config: &EmbeddingConfig, cache_entries: usize) -> Result<Arc<dyn Embedder>> {
    let inner: Arc<dyn Embedder> = match config.provider.as_str() {
        "disabled" => return Ok(Arc::new(DisabledEmbedder)),
        "openai" => Arc::new(OpenAiEmbedder::new(config)?),
        "ollama" => Arc::new(OllamaEmbedder::new(config)?),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Arc::new(LocalEmbedder::new(config)?),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    };
    Ok(Arc::new(CachedEmbedder::new(inner, cache_entries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text == "fail" {
                bail!("boom");
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    fn counting() -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_cache_hits_skip_inner() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 8);
        let a = cached.embed("hello").await.unwrap();
        let b = cached.embed("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 2);
        cached.embed("a").await.unwrap();
        cached.embed("b").await.unwrap();
        cached.embed("c").await.unwrap();
        assert_eq!(cached.len(), 2);
        cached.embed("a").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let inner = counting();
        let cached = CachedEmbedder::new(inner.clone(), 8);
        assert!(cached.embed("fail").await.is_err());
        assert!(cached.embed("fail").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert!(cached.is_empty());
    }

    #[test]
    fn test_disabled_provider_is_uncached_and_disabled() {
        let e = create_embedder(&EmbeddingConfig::default(), 16).unwrap();
        assert!(!e.is_enabled());
        assert_eq!(e.model_name(), "disabled");
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails_fast_with_default_budget() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("nomic-embed-text".to_string()),
            dims: Some(768),
            url: Some(format!("http://127.0.0.1:{}", port)),
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        let started = std::time::Instant::now();
        let err = embedder.embed("query").await.unwrap_err();
        assert!(err.to_string().contains("Ollama connection error"));
        // One retry after a one-second backoff.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_parse_provider_responses() {
        let openai = serde_json::json!({ "data": [{ "embedding": [0.5, -1.0] }] });
        assert_eq!(parse_openai_response(&openai).unwrap(), vec![0.5, -1.0]);
        let ollama = serde_json::json!({ "embeddings": [[1.0, 2.0]] });
        assert_eq!(parse_ollama_response(&ollama).unwrap(), vec![1.0, 2.0]);
        assert!(parse_openai_response(&serde_json::json!({})).is_err());
    }
}
