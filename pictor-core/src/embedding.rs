//! Embedding backends for Pictor
//!
//! Defines the `ImageEmbedder` trait plus the payload coding shared by the
//! HTTP API and its clients. Two backends implement the trait:
//! - **CLIP ONNX** (`clip` module): local inference with the ViT-B/32
//!   vision export, used by the server
//! - **Remote** (`EmbedHttpClient`): calls a running server's
//!   `POST /api/embed`, used by the backfill

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::BackfillConfig;

/// Embedding dimension of the CLIP ViT-B/32 image encoder.
pub const CLIP_DIMENSIONS: usize = 512;

/// Embedding errors
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("missing image_base64 parameter")]
    EmptyPayload,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embed API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("invalid response: expected {expected} dimensions, got {actual}")]
    InvalidDimensions { expected: usize, actual: usize },

    #[error("model not found at {path} (run scripts/download-model.sh to fetch it)")]
    ModelNotFound { path: String },

    #[error("inference error: {0}")]
    Inference(String),
}

/// Abstraction over embedding providers.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    /// Embed one image from its raw encoded bytes (PNG, JPEG, ...).
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError>;

    /// Embedding dimension (512 for CLIP ViT-B/32).
    fn dimensions(&self) -> usize;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Decode an `image_base64` payload into raw image bytes.
///
/// Browser clients send data URIs (`data:image/jpeg;base64,...`); the prefix
/// is stripped without inspecting the MIME type, and bare base64 is accepted
/// as-is. An empty payload is rejected before decoding so callers can map it
/// to a client error rather than a decode failure.
pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>, EmbedError> {
    if payload.is_empty() {
        return Err(EmbedError::EmptyPayload);
    }
    // The base64 alphabet contains neither ';' nor ',', so this split can
    // only ever match a data-URI header.
    let encoded = match payload.split_once(";base64,") {
        Some((header, rest)) if header.starts_with("data:") => rest,
        _ => payload,
    };
    Ok(STANDARD.decode(encoded)?)
}

/// Encode image bytes the way clients submit them: base64 behind a
/// `data:image/jpeg;base64,` prefix. The prefix is fixed regardless of the
/// actual image format; the service strips it without looking at the MIME.
pub fn encode_image_payload(image: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(image))
}

// ============================================================================
// EmbedHttpClient — remote backend over POST /api/embed
// ============================================================================

#[derive(Debug, Deserialize)]
struct EmbedApiResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedApiError {
    detail: String,
}

/// HTTP client for a running Pictor embedding service.
///
/// Submits images exactly as a browser client would and parses the embed
/// response body. Used by the backfill so that backfilled vectors come from
/// the same code path as live traffic.
#[derive(Debug, Clone)]
pub struct EmbedHttpClient {
    client: Client,
    base_url: String,
    dimensions: usize,
}

impl EmbedHttpClient {
    /// Create a client for `config.endpoint` with the configured per-request
    /// timeout.
    pub fn new(config: &BackfillConfig, dimensions: usize) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            dimensions,
        })
    }

    async fn embed_once(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = serde_json::json!({ "image_base64": encode_image_payload(image) });

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<EmbedApiError>(&error_body)
                .map(|e| e.detail)
                .unwrap_or(error_body);
            return Err(EmbedError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: EmbedApiResponse = response.json().await?;

        if parsed.embedding.len() != self.dimensions {
            return Err(EmbedError::InvalidDimensions {
                expected: self.dimensions,
                actual: parsed.embedding.len(),
            });
        }

        Ok(parsed.embedding)
    }
}

#[async_trait]
impl ImageEmbedder for EmbedHttpClient {
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        self.embed_once(image).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "remote"
    }
}

// ============================================================================
// TESTS
// ============================================================================
