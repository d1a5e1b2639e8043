pub mod config;
pub mod degrade;
pub mod error;

pub use config::{
    EmbeddingProvider, GraphBackendKind, GraphSettings, LlmProvider, LlmSettings, LogFormat,
    RagSettings, ServerSettings, Settings, VectorBackendKind, VectorSettings,
};
pub use degrade::Degradation;
pub use error::{RagError, Result};

/// Arbitrary key/value payload stored next to a text in the vector index.
pub type Metadata = serde_json::Map<String, serde_json::Value>;
