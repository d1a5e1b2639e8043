pub mod embeddings;
pub mod graph;
pub mod memory;
pub mod memory_graph;
pub mod neo4j_index;
pub mod qdrant_index;
pub mod vector;

pub use embeddings::{Embedder, HashingEmbedder, OllamaEmbedder, build_embedder};
pub use graph::{
    EntityNeighborhood, GraphBackend, GraphStats, GraphStore, GraphWriteSummary, NeighborLink,
};
pub use memory::MemoryIndex;
pub use memory_graph::MemoryGraph;
pub use neo4j_index::Neo4jBackend;
pub use qdrant_index::QdrantIndex;
pub use vector::{PayloadFilter, VectorIndex, build_vector_index};

use common::{Degradation, Metadata, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one ingestion call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Vector ids in input order
    pub ids: Vec<String>,
    /// Texts that went through graph extraction
    pub graph_documents: usize,
    /// Graph failures that were absorbed, in the order they happened
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

/// Writes texts to the vector index and, optionally, the knowledge graph.
#[derive(Clone)]
pub struct IngestionPipeline {
    vector: Arc<dyn VectorIndex>,
    graph: Arc<GraphStore>,
}

impl IngestionPipeline {
    pub fn new(vector: Arc<dyn VectorIndex>, graph: Arc<GraphStore>) -> Self {
        Self { vector, graph }
    }

    /// Vector writes always happen first. With `use_graph` unset the graph
    /// is used when available and its failures are absorbed; an explicit
    /// `Some(true)` makes graph failures fatal.
    pub async fn ingest(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        use_graph: Option<bool>,
    ) -> Result<IngestReport> {
        let explicit = use_graph.is_some();
        let use_graph = use_graph.unwrap_or_else(|| self.graph.is_available());

        let ids = self.vector.add_texts(texts, metadatas, None).await?;
        info!(count = ids.len(), "Stored texts in vector index");

        let mut report = IngestReport {
            ids,
            ..IngestReport::default()
        };
        if !use_graph || texts.is_empty() {
            return Ok(report);
        }

        match self.build_graph(texts).await {
            Ok((documents, degraded)) => {
                report.graph_documents = documents;
                report.degraded = degraded;
            }
            Err(e) if explicit => return Err(e),
            Err(e) => {
                warn!(error = %e, "Graph ingestion failed, continuing with vector store only");
                report.degraded.push(Degradation::new("graph_ingestion", &e));
            }
        }
        Ok(report)
    }

    /// Ingest chunks, recording where each came from in its payload.
    pub async fn ingest_chunks(
        &self,
        chunks: &[ingest::Chunk],
        source: &str,
        use_graph: Option<bool>,
    ) -> Result<IngestReport> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metadatas: Vec<Metadata> = chunks
            .iter()
            .map(|c| {
                let mut metadata = Metadata::new();
                metadata.insert("source".to_string(), json!(source));
                metadata.insert("source_id".to_string(), json!(c.source_id));
                metadata.insert("chunk_id".to_string(), json!(c.chunk_id()));
                metadata.insert("sequence_index".to_string(), json!(c.sequence_index));
                metadata
            })
            .collect();

        self.ingest(&texts, Some(&metadatas), use_graph).await
    }

    async fn build_graph(&self, texts: &[String]) -> Result<(usize, Vec<Degradation>)> {
        let mut documents = 0;
        let mut degraded = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            let doc_id = format!("doc_{}", i);
            let summary = self.graph.add_document_to_graph(text, Some(&doc_id)).await?;
            if let Some(degradation) = summary.degraded {
                warn!(doc_id = %doc_id, reason = %degradation, "Document added no graph data");
                degraded.push(degradation);
            }
            documents += 1;
        }
        Ok((documents, degraded))
    }
}
