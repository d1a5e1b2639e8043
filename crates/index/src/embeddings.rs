use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{EmbeddingProvider, RagError, VectorSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Dimension used when the model is not in the known table.
pub const DEFAULT_DIMENSION: usize = 384;

/// Vector size produced by a known embedding model.
pub fn dimension_for_model(model: &str) -> usize {
    match model {
        "sentence-transformers/all-MiniLM-L6-v2"
        | "all-minilm"
        | "BAAI/bge-small-en-v1.5"
        | "snowflake-arctic-embed:s" => 384,
        "BAAI/bge-base-en-v1.5"
        | "sentence-transformers/all-mpnet-base-v2"
        | "nomic-ai/nomic-embed-text-v1.5"
        | "nomic-embed-text" => 768,
        "BAAI/bge-large-en-v1.5" | "mxbai-embed-large" => 1024,
        _ => DEFAULT_DIMENSION,
    }
}

/// Turns text into a fixed-size vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;

    fn model(&self) -> &str;
}

/// Build the embedder named in the settings.
pub fn build_embedder(settings: &VectorSettings) -> common::Result<Arc<dyn Embedder>> {
    match settings.embedding_provider {
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            settings.embedding_url.clone(),
            settings.embedding_model.clone(),
            settings.timeout_secs,
        )?)),
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(dimension_for_model(
            &settings.embedding_model,
        )))),
    }
}

#[derive(Clone)]
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: String, model: String, timeout_secs: u64) -> common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RagError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            dimension: dimension_for_model(&model),
            base_url,
            model,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Embedding request failed: {}", response.status());
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        Ok(embedding_response.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Feature-hashing bag-of-words embedder. Needs no model server; texts that
/// share words land near each other.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

// FNV-1a, stable across builds unlike the std hasher
fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(&token.to_lowercase());
            let slot = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "hashing"
    }
}
