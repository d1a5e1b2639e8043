//! Error taxonomy shared by every crate in the workspace.
//!
//! All failures surface as one [`RagError`] so callers can handle them
//! uniformly and still match on the specific kind when they care.

use std::fmt::Display;

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Missing or invalid setup, raised while constructing components
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// LLM provider failure after retries were exhausted
    #[error("Provider error: {0}")]
    Provider(String),

    /// Vector store read failure
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Vector store write failure or file I/O failure while ingesting
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Graph store failure
    #[error("Graph error: {0}")]
    Graph(String),

    /// Malformed arguments, detected before any I/O happens
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RagError {
    pub fn configuration(msg: impl Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    pub fn provider(msg: impl Display) -> Self {
        Self::Provider(msg.to_string())
    }

    pub fn retrieval(msg: impl Display) -> Self {
        Self::Retrieval(msg.to_string())
    }

    pub fn ingestion(msg: impl Display) -> Self {
        Self::Ingestion(msg.to_string())
    }

    pub fn graph(msg: impl Display) -> Self {
        Self::Graph(msg.to_string())
    }

    pub fn validation(msg: impl Display) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Short machine-friendly name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Provider(_) => "provider",
            Self::Retrieval(_) => "retrieval",
            Self::Ingestion(_) => "ingestion",
            Self::Graph(_) => "graph",
            Self::Validation(_) => "validation",
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::graph("connection refused");
        assert_eq!(err.to_string(), "Graph error: connection refused");
        assert_eq!(err.kind(), "graph");
    }

    #[test]
    fn test_constructors_map_to_variants() {
        assert!(matches!(RagError::provider("x"), RagError::Provider(_)));
        assert!(matches!(RagError::retrieval("x"), RagError::Retrieval(_)));
        assert!(matches!(RagError::ingestion("x"), RagError::Ingestion(_)));
        assert!(matches!(RagError::validation("x"), RagError::Validation(_)));
        assert!(matches!(RagError::configuration("x"), RagError::Configuration(_)));
    }
}
