//! Knowledge graph storage: backend trait, availability state and the
//! extraction-driven write and read paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Degradation, GraphBackendKind, GraphSettings, RagError, Result};
use extract::{EntityExtractor, EntityType, entity_id, relation_type};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::memory_graph::MemoryGraph;
use crate::neo4j_index::Neo4jBackend;

/// Query names tried against the graph per question.
const MAX_QUERY_ENTITIES: usize = 3;
/// Relationship lines rendered per entity.
const MAX_LINKS_PER_ENTITY: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipRecord {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub relation_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// One edge seen from an entity, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborLink {
    pub related: String,
    pub relation: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityNeighborhood {
    pub name: String,
    pub entity_type: String,
    pub links: Vec<NeighborLink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
}

/// What one document contributed to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphWriteSummary {
    pub entities: usize,
    pub relationships: usize,
    /// Relationships whose endpoints were not found by name
    pub dropped_relationships: usize,
    /// Set when extraction failed and the document contributed nothing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

/// Storage operations a graph database has to provide.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn ensure_schema(&self) -> anyhow::Result<()>;

    /// Create the entity or refresh its name, type and last-seen time.
    async fn merge_entity(&self, id: &str, name: &str, entity_type: EntityType)
    -> anyhow::Result<()>;

    /// Case-insensitive exact name lookup. Picks the smallest id on ties.
    async fn find_entity_id(&self, name: &str) -> anyhow::Result<Option<String>>;

    /// At most one edge per (source, target, type); later descriptions win.
    async fn merge_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        description: &str,
    ) -> anyhow::Result<()>;

    /// Entities whose name contains `fragment` (case-insensitive), with
    /// their edges in both directions.
    async fn neighborhoods(
        &self,
        fragment: &str,
        limit: usize,
    ) -> anyhow::Result<Vec<EntityNeighborhood>>;

    async fn clear(&self) -> anyhow::Result<()>;

    async fn stats(&self) -> anyhow::Result<GraphStats>;
}

enum GraphState {
    Unconfigured,
    Connected {
        backend: Arc<dyn GraphBackend>,
        extractor: EntityExtractor,
    },
    Failed(String),
}

/// Graph store that is either connected or unavailable for the rest of
/// its life. Construction never fails.
pub struct GraphStore {
    state: GraphState,
}

impl GraphStore {
    pub fn connected(backend: Arc<dyn GraphBackend>, extractor: EntityExtractor) -> Self {
        Self {
            state: GraphState::Connected { backend, extractor },
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            state: GraphState::Unconfigured,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: GraphState::Failed(reason.into()),
        }
    }

    /// Connect using the settings. Missing configuration or an unreachable
    /// server leaves the store unavailable instead of failing.
    pub async fn connect(settings: &GraphSettings, extractor: EntityExtractor) -> Self {
        if !settings.enabled {
            info!("Graph store disabled");
            return Self::unconfigured();
        }
        if !settings.is_configured() {
            warn!("Neo4j connection parameters not fully set. Graph store is unavailable");
            return Self::unconfigured();
        }

        let backend: Arc<dyn GraphBackend> = match settings.backend {
            GraphBackendKind::Memory => Arc::new(MemoryGraph::new()),
            GraphBackendKind::Neo4j => match Neo4jBackend::connect(settings).await {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    let reason = format!("{:#}", e);
                    error!(error = %reason, "Failed to connect to Neo4j");
                    return Self::failed(reason);
                }
            },
        };

        if let Err(e) = backend.ensure_schema().await {
            let reason = format!("{:#}", e);
            error!(error = %reason, "Failed to create graph schema");
            return Self::failed(reason);
        }

        info!("Connected to graph store");
        Self::connected(backend, extractor)
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, GraphState::Connected { .. })
    }

    /// Why the store is unavailable, if it is.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            GraphState::Connected { .. } => None,
            GraphState::Unconfigured => Some("not configured"),
            GraphState::Failed(reason) => Some(reason),
        }
    }

    fn connection(&self) -> Result<(&Arc<dyn GraphBackend>, &EntityExtractor)> {
        match &self.state {
            GraphState::Connected { backend, extractor } => Ok((backend, extractor)),
            _ => Err(RagError::graph("graph store unavailable")),
        }
    }

    /// Extract entities and relationships from `text` and merge them in.
    pub async fn add_document_to_graph(
        &self,
        text: &str,
        doc_id: Option<&str>,
    ) -> Result<GraphWriteSummary> {
        let (backend, extractor) = self.connection()?;

        let extract::Extraction {
            result: extraction,
            degraded,
        } = extractor.extract_checked(text).await;
        if extraction.is_empty() {
            debug!(doc_id = ?doc_id, degraded = degraded.is_some(), "No entities extracted");
            return Ok(GraphWriteSummary {
                degraded,
                ..GraphWriteSummary::default()
            });
        }

        self.write_extraction(backend.as_ref(), &extraction)
            .await
            .map_err(|e| RagError::graph(format!("Failed to add document to graph: {:#}", e)))
            .inspect(|summary| {
                info!(
                    doc_id = ?doc_id,
                    entities = summary.entities,
                    relationships = summary.relationships,
                    dropped = summary.dropped_relationships,
                    "Added document to graph"
                );
            })
    }

    async fn write_extraction(
        &self,
        backend: &dyn GraphBackend,
        extraction: &extract::ExtractionResult,
    ) -> anyhow::Result<GraphWriteSummary> {
        let mut summary = GraphWriteSummary::default();

        for entity in &extraction.entities {
            let name = entity.name.trim();
            if name.is_empty() {
                continue;
            }
            let id = entity_id(entity.entity_type, name);
            backend.merge_entity(&id, name, entity.entity_type).await?;
            summary.entities += 1;
        }

        for rel in &extraction.relationships {
            let source = rel.source.trim();
            let target = rel.target.trim();
            if source.is_empty() || target.is_empty() {
                summary.dropped_relationships += 1;
                continue;
            }

            let Some(source_id) = backend.find_entity_id(source).await? else {
                summary.dropped_relationships += 1;
                continue;
            };
            let Some(target_id) = backend.find_entity_id(target).await? else {
                summary.dropped_relationships += 1;
                continue;
            };

            backend
                .merge_relationship(
                    &source_id,
                    &target_id,
                    &relation_type(&rel.relation_type),
                    rel.description.trim(),
                )
                .await?;
            summary.relationships += 1;
        }

        Ok(summary)
    }

    /// Render the neighborhood of entities mentioned in `query` as text.
    /// Empty when nothing matches.
    pub async fn get_graph_context(&self, query: &str, max_entities: usize) -> Result<String> {
        let (backend, extractor) = self.connection()?;
        if max_entities == 0 || query.trim().is_empty() {
            return Ok(String::new());
        }

        let mut names = extractor.extract(query).await.entity_names();
        if names.is_empty() {
            names.push(query.trim().to_string());
        }

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for name in names.iter().take(MAX_QUERY_ENTITIES) {
            let neighborhoods = backend
                .neighborhoods(name, max_entities)
                .await
                .map_err(|e| RagError::graph(format!("Failed to get graph context: {:#}", e)))?;
            for neighborhood in neighborhoods {
                if seen.insert((neighborhood.name.clone(), neighborhood.entity_type.clone())) {
                    found.push(neighborhood);
                }
            }
        }
        found.truncate(max_entities);

        if found.is_empty() {
            return Ok(String::new());
        }
        Ok(format_context(&found))
    }

    pub async fn clear_graph(&self) -> Result<()> {
        let (backend, _) = self.connection()?;
        backend
            .clear()
            .await
            .map_err(|e| RagError::graph(format!("Failed to clear graph: {:#}", e)))?;
        info!("Cleared knowledge graph");
        Ok(())
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        let (backend, _) = self.connection()?;
        backend
            .stats()
            .await
            .map_err(|e| RagError::graph(format!("Failed to get graph stats: {:#}", e)))
    }
}

/// Textual rendering handed to the answer prompt.
pub fn format_context(entities: &[EntityNeighborhood]) -> String {
    let mut parts = vec!["Graph Context:".to_string()];

    for entity in entities {
        parts.push(format!("\n{} ({}):", entity.name, entity.entity_type));
        // Dangling links don't count toward the cap
        for link in entity
            .links
            .iter()
            .filter(|l| !l.related.is_empty())
            .take(MAX_LINKS_PER_ENTITY)
        {
            parts.push(format!("  - {}: {}", link.relation, link.related));
            if !link.description.is_empty() {
                parts.push(format!("    ({})", link.description));
            }
        }
    }

    parts.join("\n")
}
