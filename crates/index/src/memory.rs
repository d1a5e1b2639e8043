use async_trait::async_trait;
use common::{Metadata, RagError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::embeddings::Embedder;
use crate::vector::{
    PayloadFilter, VectorIndex, build_payload, cosine_similarity, embed_checked, payload_text,
    prepare_batch,
};

struct StoredPoint {
    vector: Vec<f32>,
    payload: Metadata,
    // insertion order, used to break score ties
    seq: u64,
}

/// In-process vector index with exact cosine search.
pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    points: DashMap<String, StoredPoint>,
    next_seq: AtomicU64,
}

impl MemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            points: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn add_texts(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        ids: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let pending = prepare_batch(texts, metadatas, ids)?;

        let mut vectors = Vec::with_capacity(pending.len());
        for point in &pending {
            let vector = embed_checked(self.embedder.as_ref(), &point.text)
                .await
                .map_err(|e| RagError::ingestion(format!("Failed to add texts: {:#}", e)))?;
            vectors.push(vector);
        }

        let mut ids = Vec::with_capacity(pending.len());
        for (point, vector) in pending.into_iter().zip(vectors) {
            let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
            ids.push(point.id.clone());
            self.points.insert(
                point.id,
                StoredPoint {
                    vector,
                    payload: point.payload,
                    seq,
                },
            );
        }

        debug!(count = ids.len(), "Added texts to memory index");
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

        let query_vector = embed_checked(self.embedder.as_ref(), query)
            .await
            .map_err(|e| RagError::retrieval(format!("Failed to search: {:#}", e)))?;

        let mut scored: Vec<(f32, u64, String)> = self
            .points
            .iter()
            .filter(|entry| filter.is_none_or(|f| f.matches(&entry.payload)))
            .filter_map(|entry| {
                payload_text(&entry.payload).map(|text| {
                    (
                        cosine_similarity(&query_vector, &entry.vector),
                        entry.seq,
                        text,
                    )
                })
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        scored.truncate(limit);

        Ok(scored.into_iter().map(|(_, _, text)| text).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.points.remove(id);
        }
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        text: Option<&str>,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let new_vector = match text {
            Some(text) => Some(
                embed_checked(self.embedder.as_ref(), text)
                    .await
                    .map_err(|e| RagError::retrieval(format!("Failed to update point: {:#}", e)))?,
            ),
            None => None,
        };

        let mut point = self
            .points
            .get_mut(id)
            .ok_or_else(|| RagError::retrieval(format!("Point {} not found", id)))?;

        let mut merged = point.payload.clone();
        if let Some(metadata) = metadata {
            merged.extend(metadata.clone());
        }
        let current_text = payload_text(&point.payload).unwrap_or_default();
        point.payload = build_payload(text.unwrap_or(&current_text), id, merged);
        if let Some(vector) = new_vector {
            point.vector = vector;
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.points.len())
    }
}
