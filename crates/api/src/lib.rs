//! Hybrid vector + knowledge-graph retrieval-augmented generation.
//!
//! [`Ragforge`] ties the pieces together: texts go into a vector index and,
//! when a graph store is reachable, into an entity graph built by the LLM.
//! Questions are answered from both, as a `{facts, answer}` pair.

pub mod files;
pub mod metrics;
pub mod server;

pub use common::{Degradation, Metadata, RagError, Result, Settings};
pub use files::{DirectoryIngestOptions, FileIngestOptions};
pub use index::{GraphStats, IngestReport, PayloadFilter};
pub use metrics::{Metrics, MetricsSnapshot};
pub use query::{AnswerResult, AskOptions};

use extract::{EntityExtractor, LanguageModel, build_language_model};
use index::{GraphStore, IngestionPipeline, VectorIndex, build_vector_index};
use metrics::TimedOperation;
use query::AnswerPipeline;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Entry point owning the language model and the shared stores.
///
/// Stores are created on first use and reused afterwards; concurrent first
/// callers wait on a single initialisation.
pub struct Ragforge {
    settings: Settings,
    llm: Arc<dyn LanguageModel>,
    vector: OnceCell<Arc<dyn VectorIndex>>,
    graph: OnceCell<Arc<GraphStore>>,
    metrics: Arc<Metrics>,
}

/// Explicit components for tests and embedding; anything left unset is
/// built from the settings.
#[derive(Default)]
pub struct RagforgeBuilder {
    settings: Option<Settings>,
    llm: Option<Arc<dyn LanguageModel>>,
    vector: Option<Arc<dyn VectorIndex>>,
    graph: Option<Arc<GraphStore>>,
}

impl RagforgeBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn language_model(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn vector_index(mut self, vector: Arc<dyn VectorIndex>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn graph_store(mut self, graph: Arc<GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn build(self) -> Result<Ragforge> {
        let settings = self.settings.unwrap_or_default();
        let llm = match self.llm {
            Some(llm) => llm,
            None => build_language_model(&settings.llm)?,
        };

        Ok(Ragforge {
            settings,
            llm,
            vector: OnceCell::new_with(self.vector),
            graph: OnceCell::new_with(self.graph),
            metrics: Metrics::new(),
        })
    }
}

impl Ragforge {
    pub fn builder() -> RagforgeBuilder {
        RagforgeBuilder::default()
    }

    /// Build everything from the settings. Fails only on invalid
    /// configuration; stores connect lazily.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        Self::builder().settings(settings).build()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn vector_store(&self) -> Result<Arc<dyn VectorIndex>> {
        self.vector
            .get_or_try_init(|| async {
                info!(
                    backend = ?self.settings.vector.backend,
                    collection = %self.settings.vector.collection_name,
                    "Initialising vector store"
                );
                build_vector_index(&self.settings.vector).await
            })
            .await
            .cloned()
    }

    pub async fn graph_store(&self) -> Arc<GraphStore> {
        self.graph
            .get_or_init(|| async {
                let extractor = EntityExtractor::new(self.llm.clone());
                Arc::new(GraphStore::connect(&self.settings.graph, extractor).await)
            })
            .await
            .clone()
    }

    pub async fn graph_available(&self) -> bool {
        self.graph_store().await.is_available()
    }

    async fn ingestion_pipeline(&self) -> Result<IngestionPipeline> {
        Ok(IngestionPipeline::new(
            self.vector_store().await?,
            self.graph_store().await,
        ))
    }

    /// Add texts to the knowledge base.
    ///
    /// `use_graph: None` builds the graph when it is available and absorbs
    /// graph failures; `Some(true)` makes them errors.
    pub async fn ingest(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        use_graph: Option<bool>,
    ) -> Result<IngestReport> {
        let timer = TimedOperation::start();
        let report = self
            .ingestion_pipeline()
            .await?
            .ingest(texts, metadatas, use_graph)
            .await;
        self.metrics.record_ingest(timer.elapsed(), texts.len());
        report
    }

    pub(crate) async fn ingest_chunks(
        &self,
        chunks: &[ingest::Chunk],
        source: &str,
        use_graph: Option<bool>,
    ) -> Result<IngestReport> {
        let timer = TimedOperation::start();
        let report = self
            .ingestion_pipeline()
            .await?
            .ingest_chunks(chunks, source, use_graph)
            .await;
        self.metrics.record_ingest(timer.elapsed(), chunks.len());
        report
    }

    /// Answer a question. Always returns a result; failures are described
    /// in `answer`.
    pub async fn ask(&self, question: &str, options: &AskOptions) -> AnswerResult {
        let timer = TimedOperation::start();
        let result = match self.vector_store().await {
            Ok(vector) => {
                AnswerPipeline::new(
                    self.llm.clone(),
                    vector,
                    self.graph_store().await,
                    self.settings.rag.clone(),
                )
                .ask(question, options)
                .await
            }
            Err(e) => {
                error!(error = %e, "Vector store unavailable");
                AnswerResult::from_error(&e)
            }
        };
        self.metrics.record_ask(timer.elapsed());
        result
    }

    /// Raw vector search, no generation.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<String>> {
        self.metrics.record_search();
        self.vector_store().await?.search(query, limit, filter).await
    }

    /// Delete every entity and relationship. Irreversible.
    pub async fn clear_graph(&self) -> Result<()> {
        self.graph_store().await.clear_graph().await
    }

    pub async fn graph_stats(&self) -> Result<GraphStats> {
        self.graph_store().await.stats().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use extract::ScriptedModel;
    use index::{HashingEmbedder, MemoryGraph, MemoryIndex};

    pub const EXTRACTION: &str = r#"{
        "entities": [
            {"name": "Shivaji", "type": "PERSON"},
            {"name": "Shivneri fort", "type": "LOCATION"}
        ],
        "relationships": [
            {"source": "Shivaji", "target": "Shivneri fort", "type": "BORN_IN", "description": "birthplace"}
        ]
    }"#;

    pub const ANSWER: &str = r#"{"facts": ["Shivaji was born in Shivneri fort."], "answer": "Shivneri fort"}"#;

    /// Answers extraction prompts with [`EXTRACTION`] and grounded prompts
    /// with [`ANSWER`].
    pub fn scripted_model() -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel::new(|prompt, _| {
            if prompt.starts_with("Context:") {
                Ok(ANSWER.to_string())
            } else {
                Ok(EXTRACTION.to_string())
            }
        }))
    }

    pub fn memory_ragforge(model: Arc<ScriptedModel>, with_graph: bool) -> Ragforge {
        memory_ragforge_with(Settings::default(), model, with_graph)
    }

    pub fn memory_ragforge_with(
        settings: Settings,
        model: Arc<ScriptedModel>,
        with_graph: bool,
    ) -> Ragforge {
        let graph = if with_graph {
            GraphStore::connected(
                Arc::new(MemoryGraph::new()),
                EntityExtractor::new(model.clone()),
            )
        } else {
            GraphStore::unconfigured()
        };

        Ragforge::builder()
            .settings(settings)
            .language_model(model)
            .vector_index(Arc::new(MemoryIndex::new(Arc::new(HashingEmbedder::new(128)))))
            .graph_store(Arc::new(graph))
            .build()
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use common::{EmbeddingProvider, GraphBackendKind, VectorBackendKind};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_ask_on_empty_store() {
        let ragforge = memory_ragforge(scripted_model(), false);
        let result = ragforge.ask("anything", &AskOptions::default()).await;
        assert_eq!(result.facts, Vec::<String>::new());
        assert_eq!(
            result.answer,
            "I could not find any relevant information in the knowledge base to answer your question."
        );
    }

    #[tokio::test]
    async fn test_ingest_then_search() {
        let ragforge = memory_ragforge(scripted_model(), false);
        ragforge
            .ingest(&strings(&["Shivaji was born in Shivneri fort."]), None, None)
            .await
            .unwrap();

        let found = ragforge.search("Where was Shivaji born?", 1, None).await.unwrap();
        assert_eq!(found, strings(&["Shivaji was born in Shivneri fort."]));
    }

    #[tokio::test]
    async fn test_without_graph_credentials_behaves_like_vector_only() {
        let model = scripted_model();
        let ragforge = memory_ragforge(model.clone(), false);
        assert!(!ragforge.graph_available().await);

        let report = ragforge
            .ingest(&strings(&["Shivaji was born in Shivneri fort."]), None, None)
            .await
            .unwrap();
        assert_eq!(report.graph_documents, 0);

        let result = ragforge
            .ask("Where was Shivaji born?", &AskOptions::default())
            .await;
        assert_eq!(result.answer, "Shivneri fort");
        // only the answer call, no extraction
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_graph_round_trip() {
        let ragforge = memory_ragforge(scripted_model(), true);
        ragforge
            .ingest(&strings(&["Shivaji was born in Shivneri fort."]), None, None)
            .await
            .unwrap();

        let stats = ragforge.graph_stats().await.unwrap();
        assert_eq!(stats.entity_count, 2);
        assert_eq!(stats.relation_count, 1);

        ragforge.clear_graph().await.unwrap();
        assert_eq!(ragforge.graph_stats().await.unwrap(), GraphStats::default());
    }

    #[tokio::test]
    async fn test_stores_are_built_lazily_from_settings() {
        let mut settings = Settings::default();
        settings.vector.backend = VectorBackendKind::Memory;
        settings.vector.embedding_provider = EmbeddingProvider::Hashing;
        settings.graph.backend = GraphBackendKind::Memory;

        let ragforge = Ragforge::builder()
            .settings(settings)
            .language_model(scripted_model())
            .build()
            .unwrap();

        let first = ragforge.vector_store().await.unwrap();
        let second = ragforge.vector_store().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(ragforge.graph_available().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_builds_each_store_once() {
        let mut settings = Settings::default();
        settings.vector.backend = VectorBackendKind::Memory;
        settings.vector.embedding_provider = EmbeddingProvider::Hashing;
        settings.graph.backend = GraphBackendKind::Memory;

        let model = scripted_model();
        let ragforge = Ragforge::builder()
            .settings(settings)
            .language_model(model.clone())
            .build()
            .unwrap();
        // test handle + facade
        assert_eq!(Arc::strong_count(&model), 2);

        let vectors =
            futures::future::join_all((0..16).map(|_| ragforge.vector_store())).await;
        let graphs = futures::future::join_all((0..16).map(|_| ragforge.graph_store())).await;

        let first = vectors[0].as_ref().unwrap();
        assert!(vectors.iter().all(|v| Arc::ptr_eq(first, v.as_ref().unwrap())));
        assert!(graphs.iter().all(|g| Arc::ptr_eq(&graphs[0], g)));
        // exactly one extractor was built for the graph store
        assert_eq!(Arc::strong_count(&model), 3);
    }

    #[test]
    fn test_missing_groq_key_is_configuration_error() {
        let err = Ragforge::from_settings(Settings::default()).err().unwrap();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_metrics_count_operations() {
        let ragforge = memory_ragforge(scripted_model(), false);
        ragforge.ingest(&strings(&["a", "b"]), None, None).await.unwrap();
        ragforge.ask("a?", &AskOptions::default()).await;

        let snapshot = ragforge.metrics().snapshot();
        assert_eq!(snapshot.ingest_calls, 1);
        assert_eq!(snapshot.total_texts_ingested, 2);
        assert_eq!(snapshot.ask_calls, 1);
    }
}
