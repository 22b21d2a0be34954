//! HTTP API: query endpoint, collection debug view and extracted images.


use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::{StoredChunk, VectorStore};
use crate::embeddings::OllamaClient;
use crate::search::{QueryResult, Searcher};

/// Number of records returned by `GET /debug`
const DEBUG_SAMPLE_SIZE: usize = 10;
const EMBEDDING_FAILED: &str = "Failed to get embedding for query.";

pub struct AppState {
    searcher: Searcher,
    images_dir: PathBuf,
    top_k: usize,
}

impl AppState {
    #[inline]
    pub const fn new(searcher: Searcher, images_dir: PathBuf, top_k: usize) -> Self {
        Self {
            searcher,
            images_dir,
            top_k,
        }
    }

    /// Open the vector store and embedding client described by `config`
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let vector_store = VectorStore::new(config)
            .await
            .context("Failed to initialize LanceDB vector store")?;
        let ollama_client =
            OllamaClient::new(config).context("Failed to initialize Ollama client")?;

        let images_dir = config.images_dir();
        std::fs::create_dir_all(&images_dir).with_context(|| {
            format!("Failed to create images directory {}", images_dir.display())
        })?;

        Ok(Self::new(
            Searcher::new(ollama_client, vector_store),
            images_dir,
            config.server.top_k,
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DebugResponse {
    pub count: u64,
    pub sample: Vec<StoredChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/debug", get(debug_handler))
        .route("/images/{*path}", get(image_handler))
        .with_state(state)
}

/// Serve the API on `addr` until Ctrl-C
#[inline]
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read listener address")?;

    info!("Listening on http://{}", local_addr);
    println!("Serving on http://{local_addr}");

    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Query must not be empty."));
    }
    debug!("Incoming query: {}", query);

    let embedding_state = Arc::clone(&state);
    let embedding = tokio::task::spawn_blocking(move || {
        embedding_state.searcher.embed_query(&query)
    })
    .await
    .map_err(|e| {
        error!("Embedding task failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, EMBEDDING_FAILED)
    })?;

    let vector = match embedding {
        Ok(vector) => vector,
        Err(e) => {
            warn!("{}", e);
            return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, EMBEDDING_FAILED));
        }
    };

    let results = state
        .searcher
        .search_vector(&vector, state.top_k)
        .await
        .map_err(|e| {
            error!("Search failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    debug!("Returning {} results", results.len());
    Ok(Json(QueryResponse { results }))
}

async fn debug_handler(State(state): State<Arc<AppState>>) -> Result<Json<DebugResponse>, ApiError> {
    let store = state.searcher.vector_store();
    let internal = |e: crate::RagError| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());

    let count = store.count().await.map_err(internal)?;
    let sample = store.peek(DEBUG_SAMPLE_SIZE).await.map_err(internal)?;
    debug!("Debug view: {} chunks", count);

    Ok(Json(DebugResponse { count, sample }))
}

async fn image_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(requested): UrlPath<String>,
) -> Response {
    let Some(path) = resolve_image_path(&state.images_dir, &requested) else {
        warn!("Rejected image path {:?}", requested);
        return StatusCode::BAD_REQUEST.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Join a request path onto the images directory; `None` if it could escape it
#[inline]
pub fn resolve_image_path(images_dir: &Path, requested: &str) -> Option<PathBuf> {
    let relative = Path::new(requested);
    let mut components = relative.components().peekable();
    components.peek()?;

    if components.all(|component| matches!(component, Component::Normal(_) | Component::CurDir)) {
        Some(images_dir.join(relative))
    } else {
        None
    }
}

/// MIME type for an image file, by extension
#[inline]
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
