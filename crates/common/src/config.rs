use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{RagError, Result};

const ENV_PREFIX: &str = "RAGFORGE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LlmSettings,
    pub vector: VectorSettings,
    pub graph: GraphSettings,
    pub rag: RagSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Groq,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub retry_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackendKind {
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Ollama,
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    pub backend: VectorBackendKind,
    pub url: String,
    pub collection_name: String,
    pub embedding_provider: EmbeddingProvider,
    pub embedding_url: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackendKind {
    Neo4j,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    pub enabled: bool,
    pub backend: GraphBackendKind,
    pub uri: Option<String>,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    pub max_context_chunks: usize,
    pub max_graph_entities: usize,
    pub default_strategy: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub log_format: LogFormat,
    /// Directory `/ingest/path` may read from; path ingestion is refused
    /// when unset
    pub ingest_root: Option<String>,
    /// Origins allowed by CORS; no CORS headers when empty
    pub cors_origins: Vec<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Groq,
            api_key: None,
            model: "llama-3.3-70b-versatile".to_string(),
            base_url: None,
            timeout_secs: 30,
            max_retries: 3,
            retry_interval_ms: 1000,
        }
    }
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackendKind::Qdrant,
            url: "http://localhost:6333".to_string(),
            collection_name: "ragforge_knowledge_base".to_string(),
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_url: "http://localhost:11434".to_string(),
            embedding_model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: GraphBackendKind::Neo4j,
            uri: Some("bolt://localhost:7687".to_string()),
            user: "neo4j".to_string(),
            password: None,
            database: "neo4j".to_string(),
        }
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            max_context_chunks: 5,
            max_graph_entities: 5,
            default_strategy: "hybrid".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            log_format: LogFormat::Text,
            ingest_root: None,
            cors_origins: Vec::new(),
        }
    }
}

impl GraphSettings {
    /// Credentials and URI are both present; says nothing about reachability.
    pub fn is_configured(&self) -> bool {
        let has_uri = self.uri.as_deref().is_some_and(|u| !u.trim().is_empty());
        let has_password = self.password.as_deref().is_some_and(|p| !p.is_empty());
        match self.backend {
            GraphBackendKind::Neo4j => has_uri && has_password,
            GraphBackendKind::Memory => true,
        }
    }
}

impl Settings {
    /// Load settings from the process environment (and `.env` when present).
    pub fn from_env() -> Result<Self> {
        // A missing .env file is the common case
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source.
    ///
    /// Each option is read from its generic name first, then from the
    /// `RAGFORGE_`-prefixed name, then falls back to the default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Settings::default();

        let llm = LlmSettings {
            provider: env.parse_enum("LLM_PROVIDER", defaults.llm.provider, |v| match v {
                "groq" => Some(LlmProvider::Groq),
                "ollama" => Some(LlmProvider::Ollama),
                _ => None,
            })?,
            api_key: env.get("GROQ_API_KEY").or_else(|| env.get("LLM_API_KEY")),
            model: env.get("LLM_MODEL").unwrap_or(defaults.llm.model),
            base_url: env.get("LLM_BASE_URL"),
            timeout_secs: env.parse("LLM_TIMEOUT", defaults.llm.timeout_secs)?,
            max_retries: env.parse("LLM_RETRIES", defaults.llm.max_retries)?,
            retry_interval_ms: env.parse("LLM_RETRY_INTERVAL_MS", defaults.llm.retry_interval_ms)?,
        };

        let vector = VectorSettings {
            backend: env.parse_enum("VECTOR_BACKEND", defaults.vector.backend, |v| match v {
                "qdrant" => Some(VectorBackendKind::Qdrant),
                "memory" => Some(VectorBackendKind::Memory),
                _ => None,
            })?,
            url: env.get("QDRANT_URL").unwrap_or(defaults.vector.url),
            collection_name: env
                .get("COLLECTION_NAME")
                .unwrap_or(defaults.vector.collection_name),
            embedding_provider: env.parse_enum(
                "EMBEDDING_PROVIDER",
                defaults.vector.embedding_provider,
                |v| match v {
                    "ollama" => Some(EmbeddingProvider::Ollama),
                    "hashing" => Some(EmbeddingProvider::Hashing),
                    _ => None,
                },
            )?,
            embedding_url: env.get("EMBEDDING_URL").unwrap_or(defaults.vector.embedding_url),
            embedding_model: env
                .get("EMBEDDING_MODEL")
                .unwrap_or(defaults.vector.embedding_model),
            timeout_secs: env.parse("VECTOR_TIMEOUT", defaults.vector.timeout_secs)?,
        };

        let graph = GraphSettings {
            enabled: env.parse_bool("ENABLE_GRAPHRAG", defaults.graph.enabled)?,
            backend: env.parse_enum("GRAPH_BACKEND", defaults.graph.backend, |v| match v {
                "neo4j" => Some(GraphBackendKind::Neo4j),
                "memory" => Some(GraphBackendKind::Memory),
                _ => None,
            })?,
            uri: env.get("NEO4J_URI").or(defaults.graph.uri),
            user: env.get("NEO4J_USER").unwrap_or(defaults.graph.user),
            password: env.get("NEO4J_PASSWORD"),
            database: env.get("NEO4J_DATABASE").unwrap_or(defaults.graph.database),
        };

        let rag = RagSettings {
            max_context_chunks: env.parse("MAX_CHUNKS", defaults.rag.max_context_chunks)?,
            max_graph_entities: env.parse("MAX_GRAPH_ENTITIES", defaults.rag.max_graph_entities)?,
            default_strategy: env
                .get("RETRIEVAL_STRATEGY")
                .unwrap_or(defaults.rag.default_strategy),
        };

        let server = ServerSettings {
            bind_addr: env.get("BIND_ADDR").unwrap_or(defaults.server.bind_addr),
            log_format: env.parse_enum("LOG_FORMAT", defaults.server.log_format, |v| match v {
                "text" => Some(LogFormat::Text),
                "json" => Some(LogFormat::Json),
                _ => None,
            })?,
            ingest_root: env.get("INGEST_ROOT"),
            cors_origins: env.get_list("CORS_ORIGINS"),
        };

        Ok(Self {
            llm,
            vector,
            graph,
            rag,
            server,
        })
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .or_else(|| (self.lookup)(&format!("{ENV_PREFIX}{name}")))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Comma-separated values, blanks dropped.
    fn get_list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e| RagError::configuration(format!("invalid value for {name}: {raw} ({e})"))),
            None => Ok(default),
        }
    }

    fn parse_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name).map(|v| v.to_lowercase()) {
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(RagError::configuration(format!(
                    "invalid boolean for {name}: {v}"
                ))),
            },
            None => Ok(default),
        }
    }

    fn parse_enum<T>(&self, name: &str, default: T, pick: impl Fn(&str) -> Option<T>) -> Result<T> {
        match self.get(name).map(|v| v.to_lowercase()) {
            Some(v) => pick(&v).ok_or_else(|| {
                RagError::configuration(format!("unsupported value for {name}: {v}"))
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.rag.max_context_chunks, 5);
        assert_eq!(settings.llm.max_retries, 3);
        assert_eq!(settings.vector.collection_name, "ragforge_knowledge_base");
        assert!(settings.graph.enabled);
        assert!(!settings.graph.is_configured());
    }

    #[test]
    fn test_generic_name_wins_over_prefixed() {
        let settings = settings_from(&[
            ("NEO4J_PASSWORD", "generic"),
            ("RAGFORGE_NEO4J_PASSWORD", "prefixed"),
            ("RAGFORGE_MAX_CHUNKS", "8"),
        ])
        .unwrap();
        assert_eq!(settings.graph.password.as_deref(), Some("generic"));
        assert_eq!(settings.rag.max_context_chunks, 8);
        assert!(settings.graph.is_configured());
    }

    #[test]
    fn test_invalid_number_is_configuration_error() {
        let err = settings_from(&[("RAGFORGE_LLM_RETRIES", "many")]).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[test]
    fn test_enum_values_parse_case_insensitively() {
        let settings = settings_from(&[
            ("LLM_PROVIDER", "Ollama"),
            ("VECTOR_BACKEND", "memory"),
            ("GRAPH_BACKEND", "MEMORY"),
            ("ENABLE_GRAPHRAG", "off"),
        ])
        .unwrap();
        assert_eq!(settings.llm.provider, LlmProvider::Ollama);
        assert_eq!(settings.vector.backend, VectorBackendKind::Memory);
        assert_eq!(settings.graph.backend, GraphBackendKind::Memory);
        assert!(!settings.graph.enabled);

        assert!(settings_from(&[("LLM_PROVIDER", "openai")]).is_err());
    }

    #[test]
    fn test_server_exposure_settings() {
        let settings = settings_from(&[]).unwrap();
        assert!(settings.server.ingest_root.is_none());
        assert!(settings.server.cors_origins.is_empty());

        let settings = settings_from(&[
            ("INGEST_ROOT", "/srv/docs"),
            ("CORS_ORIGINS", "https://a.example, ,https://b.example"),
        ])
        .unwrap();
        assert_eq!(settings.server.ingest_root.as_deref(), Some("/srv/docs"));
        assert_eq!(
            settings.server.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }
}
