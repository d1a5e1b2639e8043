//! Vector index abstraction and the pieces both backends share.

use async_trait::async_trait;
use common::{Metadata, RagError, Result, VectorBackendKind, VectorSettings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::embeddings::{Embedder, build_embedder};
use crate::memory::MemoryIndex;
use crate::qdrant_index::QdrantIndex;

/// Exact-match conditions on payload fields; every condition must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadFilter(BTreeMap<String, Value>);

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, payload: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| payload.get(key) == Some(expected))
    }

    /// Qdrant `filter` object: one `must` clause per condition.
    pub fn to_qdrant(&self) -> Value {
        let must: Vec<Value> = self
            .0
            .iter()
            .map(|(key, value)| serde_json::json!({"key": key, "match": {"value": value}}))
            .collect();
        serde_json::json!({ "must": must })
    }
}

/// Store of embedded texts searchable by similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Ensure the backing collection exists with the embedder's dimension.
    async fn initialize(&self) -> Result<()>;

    /// Embed and store texts, returning their ids in input order.
    async fn add_texts(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        ids: Option<&[String]>,
    ) -> Result<Vec<String>>;

    /// Texts most similar to `query`, best first.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<String>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Replace the text (re-embedding it) and/or merge new metadata.
    async fn update(&self, id: &str, text: Option<&str>, metadata: Option<&Metadata>)
    -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// Build and initialize the configured vector backend.
pub async fn build_vector_index(settings: &VectorSettings) -> Result<Arc<dyn VectorIndex>> {
    let embedder = build_embedder(settings)?;
    let index: Arc<dyn VectorIndex> = match settings.backend {
        VectorBackendKind::Qdrant => Arc::new(QdrantIndex::new(settings, embedder)?),
        VectorBackendKind::Memory => Arc::new(MemoryIndex::new(embedder)),
    };
    index.initialize().await?;
    Ok(index)
}

/// One validated write: id, text and the payload to store with it.
#[derive(Debug, Clone)]
pub(crate) struct PendingPoint {
    pub id: String,
    pub text: String,
    pub payload: Metadata,
}

/// Check batch shapes and assign ids before any I/O happens.
pub(crate) fn prepare_batch(
    texts: &[String],
    metadatas: Option<&[Metadata]>,
    ids: Option<&[String]>,
) -> Result<Vec<PendingPoint>> {
    if let Some(metadatas) = metadatas {
        if metadatas.len() != texts.len() {
            return Err(RagError::validation(format!(
                "Got {} metadata entries for {} texts",
                metadatas.len(),
                texts.len()
            )));
        }
    }
    if let Some(ids) = ids {
        if ids.len() != texts.len() {
            return Err(RagError::validation(format!(
                "Got {} ids for {} texts",
                ids.len(),
                texts.len()
            )));
        }
    }

    Ok(texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let id = ids
                .map(|ids| ids[i].clone())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let metadata = metadatas.map(|m| m[i].clone()).unwrap_or_default();
            PendingPoint {
                payload: build_payload(text, &id, metadata),
                id,
                text: text.clone(),
            }
        })
        .collect())
}

/// Payload stored with a point. Reserved fields win over caller metadata.
pub(crate) fn build_payload(text: &str, id: &str, metadata: Metadata) -> Metadata {
    let mut payload = metadata;
    payload.insert("text".to_string(), Value::String(text.to_string()));
    payload.insert("document".to_string(), Value::String(text.to_string()));
    payload.insert("id".to_string(), Value::String(id.to_string()));
    payload
}

/// The stored text of a payload, falling back to `document`.
pub(crate) fn payload_text(payload: &Metadata) -> Option<String> {
    payload
        .get("text")
        .or_else(|| payload.get("document"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Embed and check the vector has the size the collection expects.
pub(crate) async fn embed_checked(embedder: &dyn Embedder, text: &str) -> anyhow::Result<Vec<f32>> {
    let vector = embedder.embed(text).await?;
    if vector.len() != embedder.dimension() {
        anyhow::bail!(
            "Embedding model {} returned {} dimensions, expected {}",
            embedder.model(),
            vector.len(),
            embedder.dimension()
        );
    }
    Ok(vector)
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
