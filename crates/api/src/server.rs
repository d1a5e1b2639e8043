//! HTTP surface over [`Ragforge`].

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use common::{Metadata, RagError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::{
    AnswerResult, AskOptions, DirectoryIngestOptions, FileIngestOptions, GraphStats,
    IngestReport, MetricsSnapshot, PayloadFilter, Ragforge,
};

type AppState = Arc<Ragforge>;

pub fn router(ragforge: Arc<Ragforge>) -> Router {
    let cors = cors_layer(&ragforge.settings().server.cors_origins);

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/ingest", post(ingest_texts))
        .route("/ingest/path", post(ingest_path))
        .route("/search", post(search))
        .route("/ask", post(ask))
        .route("/graph", delete(clear_graph))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors).with_state(ragforge),
        None => router.with_state(ragforge),
    }
}

/// CORS restricted to the configured origins, or none at all.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE]),
    )
}

/// Resolve a requested path inside the ingest root. Symlinks and `..` are
/// resolved before the containment check.
fn resolve_ingest_path(root: Option<&str>, requested: &str) -> Result<PathBuf, RagError> {
    let root = root.ok_or_else(|| RagError::validation("path ingestion is disabled"))?;
    let root = std::fs::canonicalize(root)
        .map_err(|e| RagError::configuration(format!("invalid ingest root {}: {}", root, e)))?;

    let requested = Path::new(requested);
    let candidate = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    match std::fs::canonicalize(&candidate) {
        Ok(resolved) if resolved.starts_with(&root) => Ok(resolved),
        _ => Err(RagError::validation(format!(
            "path is not inside the ingest root: {}",
            requested.display()
        ))),
    }
}

/// A [`RagError`] rendered as a JSON error body.
pub struct ApiError(RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RagError::Validation(_) => StatusCode::BAD_REQUEST,
            RagError::Provider(_) | RagError::Retrieval(_) | RagError::Graph(_) => {
                StatusCode::BAD_GATEWAY
            }
            RagError::Ingestion(_) | RagError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind(),
        };
        (status, Json(body)).into_response()
    }
}

fn tracked<T>(state: &Ragforge, result: Result<T, RagError>) -> Result<T, ApiError> {
    state.metrics().record_request(result.is_ok());
    result.map_err(|e| {
        tracing::error!(error = %e, kind = e.kind(), "Request failed");
        ApiError(e)
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    vector_store: String,
    graph_store: String,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let vector_store = match state.vector_store().await {
        Ok(vector) => match vector.count().await {
            Ok(_) => "ok".to_string(),
            Err(e) => format!("error: {}", e),
        },
        Err(e) => format!("error: {}", e),
    };

    let graph = state.graph_store().await;
    let graph_store = match graph.unavailable_reason() {
        None => "available".to_string(),
        Some(reason) => format!("unavailable: {}", reason),
    };

    Json(HealthResponse {
        status: "ok",
        vector_store,
        graph_store,
    })
}

#[derive(Deserialize)]
struct IngestRequest {
    texts: Vec<String>,
    #[serde(default)]
    metadatas: Option<Vec<Metadata>>,
    #[serde(default)]
    use_graph: Option<bool>,
}

async fn ingest_texts(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ApiError> {
    let result = state
        .ingest(&req.texts, req.metadatas.as_deref(), req.use_graph)
        .await;
    tracked(&state, result).map(Json)
}

#[derive(Deserialize)]
struct IngestPathRequest {
    path: String,
    #[serde(flatten)]
    options: DirectoryIngestOptions,
}

#[derive(Serialize)]
struct IngestPathResponse {
    files_ingested: usize,
}

async fn ingest_path(
    State(state): State<AppState>,
    Json(req): Json<IngestPathRequest>,
) -> Result<Json<IngestPathResponse>, ApiError> {
    let path = match resolve_ingest_path(state.settings().server.ingest_root.as_deref(), &req.path) {
        Ok(path) => path,
        Err(e) => return tracked(&state, Err(e)),
    };

    let result = if path.is_dir() {
        state.ingest_from_directory(&path, &req.options).await
    } else {
        let options = FileIngestOptions {
            chunk_size: req.options.chunk_size,
            chunk_overlap: req.options.chunk_overlap,
            use_graph: req.options.use_graph,
        };
        state
            .ingest_from_file(&path, &options)
            .await
            .map(|report| usize::from(report.is_some()))
    };

    tracked(&state, result).map(|files_ingested| Json(IngestPathResponse { files_ingested }))
}

fn default_limit() -> usize {
    5
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    filter: Option<PayloadFilter>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<String>,
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let result = state
        .search(&req.query, req.limit, req.filter.as_ref())
        .await;
    tracked(&state, result).map(|results| Json(SearchResponse { results }))
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(flatten)]
    options: AskOptions,
}

async fn ask(State(state): State<AppState>, Json(req): Json<AskRequest>) -> Json<AnswerResult> {
    let result = state.ask(&req.question, &req.options).await;
    state.metrics().record_request(true);
    Json(result)
}

#[derive(Serialize)]
struct ClearResponse {
    cleared: bool,
}

async fn clear_graph(State(state): State<AppState>) -> Result<Json<ClearResponse>, ApiError> {
    let result = state.clear_graph().await;
    tracked(&state, result).map(|_| Json(ClearResponse { cleared: true }))
}

#[derive(Serialize)]
struct StatsResponse {
    graph_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    graph: Option<GraphStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vectors: Option<usize>,
    metrics: MetricsSnapshot,
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let graph_store = state.graph_store().await;
    let graph = if graph_store.is_available() {
        graph_store.stats().await.ok()
    } else {
        None
    };

    let vectors = match state.vector_store().await {
        Ok(vector) => vector.count().await.ok(),
        Err(_) => None,
    };

    Json(StatsResponse {
        graph_available: graph_store.is_available(),
        graph,
        vectors,
        metrics: state.metrics().snapshot(),
    })
}
