use anyhow::Context;
use async_trait::async_trait;
use common::{Metadata, RagError, Result, VectorSettings};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::vector::{
    PayloadFilter, VectorIndex, build_payload, embed_checked, payload_text, prepare_batch,
};

/// Vector index backed by a Qdrant collection over its REST API.
pub struct QdrantIndex {
    base_url: String,
    client: reqwest::Client,
    embedder: Arc<dyn Embedder>,
    collection_name: String,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<Point>,
}

#[derive(Serialize)]
struct Point {
    id: String,
    vector: Vec<f32>,
    payload: Metadata,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<Metadata>,
}

#[derive(Deserialize)]
struct RetrieveResponse {
    result: Vec<RetrievedPoint>,
}

#[derive(Deserialize)]
struct RetrievedPoint {
    #[serde(default)]
    payload: Option<Metadata>,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

/// Qdrant only accepts unsigned ints or UUIDs as point ids. Caller ids that
/// are not UUIDs map to one derived from their SHA-256.
pub fn point_id(id: &str) -> String {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return uuid.hyphenated().to_string();
    }
    let digest = Sha256::digest(id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).hyphenated().to_string()
}

impl QdrantIndex {
    pub fn new(settings: &VectorSettings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| RagError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            client,
            embedder,
            collection_name: settings.collection_name.clone(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection_name)
    }

    /// Fetch the collection; `None` when it does not exist yet.
    async fn existing_dimension(&self) -> anyhow::Result<Option<Option<usize>>> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("Failed to reach Qdrant")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("Failed to get collection info: {}", response.status());
        }

        let info: Value = response.json().await?;
        let size = info
            .pointer("/result/config/params/vectors/size")
            .and_then(Value::as_u64)
            .map(|s| s as usize);
        Ok(Some(size))
    }

    async fn create_collection(&self) -> anyhow::Result<()> {
        let create_req = CreateCollection {
            vectors: VectorParams {
                size: self.embedder.dimension(),
                distance: "Cosine",
            },
        };

        let response = self
            .client
            .put(self.collection_url())
            .json(&create_req)
            .send()
            .await?;

        // another process may have created it between our check and this call
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to create collection: {}", error_text);
        }
        Ok(())
    }

    async fn upsert(&self, points: Vec<Point>) -> anyhow::Result<()> {
        let url = format!("{}/points?wait=true", self.collection_url());
        let response = self
            .client
            .put(&url)
            .json(&UpsertPoints { points })
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to upsert points: {}", error_text);
        }
        Ok(())
    }

    async fn search_rest(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> anyhow::Result<Vec<String>> {
        let vector = embed_checked(self.embedder.as_ref(), query).await?;
        let request = SearchRequest {
            vector: &vector,
            limit,
            with_payload: true,
            filter: filter.filter(|f| !f.is_empty()).map(PayloadFilter::to_qdrant),
        };

        let url = format!("{}/points/search", self.collection_url());
        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Qdrant search failed: {}", error_text);
        }

        let search: SearchResponse = response
            .json()
            .await
            .context("Failed to parse Qdrant search response")?;

        Ok(search
            .result
            .into_iter()
            .filter_map(|p| p.payload.as_ref().and_then(payload_text))
            .collect())
    }

    async fn retrieve(&self, id: &str) -> anyhow::Result<Option<RetrievedPoint>> {
        let url = format!("{}/points", self.collection_url());
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "ids": [point_id(id)],
                "with_payload": true,
                "with_vector": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to retrieve point: {}", error_text);
        }

        let retrieved: RetrieveResponse = response.json().await?;
        Ok(retrieved.result.into_iter().next())
    }

    async fn delete_rest(&self, ids: &[String]) -> anyhow::Result<()> {
        let url = format!("{}/points/delete?wait=true", self.collection_url());
        let points: Vec<String> = ids.iter().map(|id| point_id(id)).collect();
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            anyhow::bail!("Failed to delete points: {}", error_text);
        }
        Ok(())
    }

    async fn update_rest(
        &self,
        id: &str,
        text: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> anyhow::Result<()> {
        let existing = self
            .retrieve(id)
            .await?
            .with_context(|| format!("Point {} not found", id))?;

        let mut merged = existing.payload.unwrap_or_default();
        if let Some(metadata) = metadata {
            merged.extend(metadata.clone());
        }

        let (text, vector) = match text {
            Some(text) => (
                text.to_string(),
                embed_checked(self.embedder.as_ref(), text).await?,
            ),
            None => (
                payload_text(&merged).unwrap_or_default(),
                existing
                    .vector
                    .with_context(|| format!("Point {} has no stored vector", id))?,
            ),
        };

        self.upsert(vec![Point {
            id: point_id(id),
            vector,
            payload: build_payload(&text, id, merged),
        }])
        .await
    }

    async fn count_rest(&self) -> anyhow::Result<usize> {
        let url = format!("{}/points/count", self.collection_url());
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Failed to count points: {}", response.status());
        }

        let count: CountResponse = response.json().await?;
        Ok(count.result.count)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn initialize(&self) -> Result<()> {
        let expected = self.embedder.dimension();
        match self
            .existing_dimension()
            .await
            .map_err(|e| RagError::retrieval(format!("Failed to verify collection: {:#}", e)))?
        {
            Some(Some(size)) if size != expected => Err(RagError::configuration(format!(
                "Collection '{}' has dimension {} but embedding model {} produces {}",
                self.collection_name,
                size,
                self.embedder.model(),
                expected
            ))),
            Some(_) => {
                debug!(collection = %self.collection_name, "Collection already exists");
                Ok(())
            }
            None => {
                self.create_collection().await.map_err(|e| {
                    RagError::retrieval(format!("Failed to create collection: {:#}", e))
                })?;
                info!(
                    collection = %self.collection_name,
                    dimension = expected,
                    "Created Qdrant collection"
                );
                Ok(())
            }
        }
    }

    async fn add_texts(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        ids: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let pending = prepare_batch(texts, metadatas, ids)?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut points = Vec::with_capacity(pending.len());
        let mut ids = Vec::with_capacity(pending.len());
        for point in pending {
            let vector = embed_checked(self.embedder.as_ref(), &point.text)
                .await
                .map_err(|e| {
                    RagError::ingestion(format!("Failed to add texts to vector store: {:#}", e))
                })?;
            points.push(Point {
                id: point_id(&point.id),
                vector,
                payload: point.payload,
            });
            ids.push(point.id);
        }

        self.upsert(points).await.map_err(|e| {
            RagError::ingestion(format!("Failed to add texts to vector store: {:#}", e))
        })?;

        debug!(count = ids.len(), collection = %self.collection_name, "Upserted points");
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<String>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.search_rest(query, limit, filter)
            .await
            .map_err(|e| RagError::retrieval(format!("Failed to search vector store: {:#}", e)))
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.delete_rest(ids)
            .await
            .map_err(|e| RagError::retrieval(format!("Failed to delete points: {:#}", e)))
    }

    async fn update(
        &self,
        id: &str,
        text: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        self.update_rest(id, text, metadata)
            .await
            .map_err(|e| RagError::retrieval(format!("Failed to update point: {:#}", e)))
    }

    async fn count(&self) -> Result<usize> {
        self.count_rest()
            .await
            .map_err(|e| RagError::retrieval(format!("Failed to count points: {:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;

    #[test]
    fn test_point_id_keeps_uuids() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(point_id(id), id);
    }

    #[test]
    fn test_point_id_hashes_other_ids_stably() {
        let a = point_id("doc_0");
        assert_eq!(a, point_id("doc_0"));
        assert_ne!(a, point_id("doc_1"));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    fn unreachable_index() -> QdrantIndex {
        let settings = VectorSettings {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..VectorSettings::default()
        };
        QdrantIndex::new(&settings, Arc::new(HashingEmbedder::new(16))).unwrap()
    }

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let index = unreachable_index();
        let texts = vec!["a".to_string()];
        let metadatas = vec![Metadata::new(), Metadata::new()];

        let err = index
            .add_texts(&texts, Some(&metadatas), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unreachable_store_error_kinds() {
        let index = unreachable_index();
        let texts = vec!["a".to_string()];

        let err = index.add_texts(&texts, None, None).await.unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));

        let err = index.search("a", 3, None).await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));

        let err = index.initialize().await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
    }
}
