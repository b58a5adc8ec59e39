//! HTTP query API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/get-images?query=&k=` | Fan out to all four backends |
//! | `GET`  | `/backends/{name}?query=&k=&variant=` | Query one backend |
//! | `GET`  | `/backends` | Backend names and loaded handles |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "k must be >= 1" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! A query that finds nothing is still a 200 with empty lists.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! can call the API directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use eduimg_core::models::BackendKind;
use eduimg_core::RetrievalError;

use crate::aggregate::{
    parse_variant, query_all_backends, query_backend, AggregatedResponse, BackendResponse,
};
use crate::backends::{BackendStatus, Engine};
use crate::config::Config;

/// Starts the HTTP server on `[server].bind`.
///
/// With `warm`, every backend handle is loaded before the listener opens;
/// handles that fail to load are retried on first query.
pub async fn run_server(config: &Config, warm: bool) -> anyhow::Result<()> {
    let engine = Arc::new(Engine::new(config));

    if warm {
        let warming = Arc::clone(&engine);
        let results = tokio::task::spawn_blocking(move || warming.warm()).await?;
        for (key, result) in results {
            match result {
                Ok(documents) => info!(key = %key, documents, "warmed"),
                Err(e) => warn!(key = %key, error = %e, "warm-up load failed"),
            }
        }
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("eduimg listening on http://{}", config.server.bind);
    axum::serve(listener, router(engine)).await?;

    Ok(())
}

/// Build the router over a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/get-images", get(handle_get_images))
        .route("/backends", get(handle_list_backends))
        .route("/backends/{name}", get(handle_backend_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(engine)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        if err.is_caller_error() {
            bad_request(err.to_string())
        } else {
            internal(err.to_string())
        }
    }
}

// ============ Query parameters ============

/// Raw query-string parameters. Numbers stay strings here so malformed
/// values get the JSON error body instead of the extractor's plain text.
#[derive(Debug, Deserialize)]
struct QueryParams {
    query: Option<String>,
    k: Option<String>,
    variant: Option<String>,
}

impl QueryParams {
    /// The query text as sent. Blank text is a valid query that ranks by
    /// baseline score; only a missing parameter is rejected.
    fn query(&self) -> Result<&str, AppError> {
        self.query
            .as_deref()
            .ok_or_else(|| bad_request("missing query parameter 'query'"))
    }

    fn k(&self, default_k: usize) -> Result<usize, AppError> {
        match self.k.as_deref() {
            None | Some("") => Ok(default_k),
            Some(raw) => {
                let k: i64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| bad_request(format!("k must be an integer, got '{}'", raw)))?;
                if k < 1 {
                    return Err(bad_request("k must be >= 1"));
                }
                Ok(usize::try_from(k).unwrap_or(usize::MAX))
            }
        }
    }

    fn variant(&self) -> Result<Option<i64>, AppError> {
        match self.variant.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| bad_request(format!("variant must be an integer, got '{}'", raw))),
        }
    }
}

// ============ GET /get-images ============

async fn handle_get_images(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<AggregatedResponse>, AppError> {
    let query = params.query()?;
    let k = params.k(engine.default_k())?;
    let response = query_all_backends(Arc::clone(&engine), query, k).await?;
    Ok(Json(response))
}

// ============ GET /backends/{name} ============

async fn handle_backend_query(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<BackendResponse>, AppError> {
    let kind: BackendKind = name
        .parse()
        .map_err(|_| not_found(format!("no backend named: {}", name)))?;
    let query = params.query()?;
    let k = params.k(engine.default_k())?;
    let variant = parse_variant(params.variant()?)?;
    let response = query_backend(Arc::clone(&engine), kind, query, k, variant).await?;
    Ok(Json(response))
}

// ============ GET /backends ============

#[derive(Serialize)]
struct BackendListResponse {
    backends: Vec<BackendStatus>,
}

async fn handle_list_backends(State(engine): State<Arc<Engine>>) -> Json<BackendListResponse> {
    Json(BackendListResponse {
        backends: engine.status(),
    })
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
