use common::{Degradation, Result};
use index::{GraphStore, PayloadFilter, VectorIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Prefix marking the synthetic graph entry in a retrieval.
pub const GRAPH_CONTEXT_PREFIX: &str = "[Graph Context] ";

/// How vector hits and graph context are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    VectorOnly,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    pub limit: usize,
    pub max_entities: usize,
    pub filter: Option<PayloadFilter>,
}

/// Ordered snippets: vector hits first, then at most one graph entry.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub snippets: Vec<String>,
    pub degraded: Option<Degradation>,
}

impl RetrievalStrategy {
    /// Unknown names fall back to hybrid.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "vector_only" => Self::VectorOnly,
            "hybrid" => Self::Hybrid,
            other => {
                warn!(strategy = other, "Unknown retrieval strategy, falling back to hybrid");
                Self::Hybrid
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::VectorOnly => "vector_only",
            Self::Hybrid => "hybrid",
        }
    }

    /// Vector failures propagate; graph failures are logged and reported
    /// through `degraded`.
    pub async fn retrieve(
        &self,
        query: &str,
        vector: &dyn VectorIndex,
        graph: Option<&GraphStore>,
        options: &RetrievalOptions,
    ) -> Result<RetrievalOutcome> {
        let snippets = vector
            .search(query, options.limit, options.filter.as_ref())
            .await?;
        let mut outcome = RetrievalOutcome {
            snippets,
            degraded: None,
        };

        let graph = match (self, graph) {
            (Self::Hybrid, Some(graph)) if graph.is_available() => graph,
            _ => return Ok(outcome),
        };

        match graph.get_graph_context(query, options.max_entities).await {
            Ok(context) if !context.is_empty() => {
                outcome
                    .snippets
                    .push(format!("{}{}", GRAPH_CONTEXT_PREFIX, context));
            }
            Ok(_) => debug!("No graph context for query"),
            Err(e) => {
                warn!(error = %e, "Graph retrieval failed, using vector results only");
                outcome.degraded = Some(Degradation::new("graph_retrieval", &e));
            }
        }

        Ok(outcome)
    }
}
