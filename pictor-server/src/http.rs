//! Pictor HTTP API
//!
//! Axum-based HTTP server that exposes image embedding over HTTP.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function. The inner functions are directly testable without axum
//! dispatch machinery.
//!
//! Endpoints:
//! - POST /api/embed — embed one base64-encoded image (512-dim CLIP vector)
//! - GET  /          — service banner
//! - GET  /health    — liveness probe

use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use pictor_core::config::ServiceConfig;
use pictor_core::embedding::{decode_image_payload, EmbedError, ImageEmbedder};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

/// Banner returned by GET /
const BANNER: &str = "Pictor Image Embedding API";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub embedder: Arc<dyn ImageEmbedder>,
}

/// Build the Axum router with all endpoints.
///
/// CORS is permissive: the embed endpoint is called straight from browser
/// clients on other origins.
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/embed", post(embed_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    config: &ServiceConfig,
    embedder: Arc<dyn ImageEmbedder>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(HttpState { embedder });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Pictor HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

/// Body of POST /api/embed.
#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    /// Base64 image bytes. A `data:<mime>;base64,` prefix is accepted and
    /// stripped before decoding.
    pub image_base64: String,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner embed — decodes the payload, runs the embedder, and returns
/// (status_code, json_body).
///
/// An empty payload is the caller's fault (400 with a `detail` body); every
/// other failure on this path is reported as 500 with the cause in `detail`.
pub async fn embed_inner(
    embedder: &dyn ImageEmbedder,
    req: EmbedRequest,
) -> (StatusCode, serde_json::Value) {
    let bytes = match decode_image_payload(&req.image_base64) {
        Ok(bytes) => bytes,
        Err(e @ EmbedError::EmptyPayload) => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "detail": e.to_string() }),
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode image payload");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "detail": format!("internal server error: {e}") }),
            );
        }
    };

    match embedder.embed(&bytes).await {
        Ok(embedding) => {
            let dimension = embedding.len();
            tracing::info!(dimension, "Embedding generated");
            (
                StatusCode::OK,
                serde_json::json!({
                    "status": "success",
                    "embedding": embedding,
                    "dimension": dimension,
                }),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to process image");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "detail": format!("internal server error: {e}") }),
            )
        }
    }
}

/// Inner banner — pure.
pub fn root_inner() -> serde_json::Value {
    serde_json::json!({ "message": BANNER })
}

/// Inner health check — pure. The server holds no downstream connection to
/// probe; a process that answers is a healthy process.
pub fn health_inner() -> serde_json::Value {
    serde_json::json!({ "status": "healthy" })
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn embed_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<EmbedRequest>,
) -> impl IntoResponse {
    let (status, body) = embed_inner(state.embedder.as_ref(), req).await;
    (status, Json(body))
}

pub async fn root_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(root_inner()))
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner()))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
