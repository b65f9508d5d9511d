//! CLIP ONNX embedding backend — local image inference via ViT-B/32
//!
//! Uses the `ort` crate for ONNX Runtime and `image` for decoding and
//! preprocessing. Produces 512-dimensional embeddings entirely offline from
//! the `clip-vit-base-patch32` vision export.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ort::session::Session;
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::EmbeddingConfig;
use crate::embedding::{EmbedError, ImageEmbedder};

/// CLIP ViT-B/32 per-channel normalization constants, RGB order.
const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Local CLIP vision embedding client.
pub struct ClipVisionEmbedder {
    session: Arc<Mutex<Session>>,
    dimensions: usize,
    image_size: u32,
}

impl std::fmt::Debug for ClipVisionEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipVisionEmbedder")
            .field("dimensions", &self.dimensions)
            .field("image_size", &self.image_size)
            .finish_non_exhaustive()
    }
}

impl ClipVisionEmbedder {
    /// Create a new CLIP vision embedding client.
    ///
    /// Loads the ONNX model from the path specified in `config` (empty path
    /// means the default location). Returns `EmbedError::ModelNotFound` if
    /// the file is missing.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let model_path = resolve_model_path(&config.model_path);
        if !model_path.exists() {
            return Err(EmbedError::ModelNotFound {
                path: model_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(1)?))
            .and_then(|mut b| Ok(b.commit_from_file(&model_path)?))
            .map_err(|e| EmbedError::Inference(e.to_string()))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            dimensions: config.dimensions,
            image_size: config.image_size,
        })
    }
}

#[async_trait]
impl ImageEmbedder for ClipVisionEmbedder {
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        // Decoding and inference are CPU-bound — run on the blocking pool.
        let session = Arc::clone(&self.session);
        let dimensions = self.dimensions;
        let image_size = self.image_size;
        let bytes = image.to_vec();

        let result = tokio::task::spawn_blocking(move || {
            let mut session_guard = session
                .lock()
                .map_err(|e| EmbedError::Inference(format!("session lock poisoned: {e}")))?;
            embed_sync(&mut session_guard, &bytes, image_size, dimensions)
        })
        .await
        .map_err(|e| EmbedError::Inference(format!("spawn_blocking join error: {e}")))?;

        result
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "clip-vit-base-patch32"
    }
}

/// Run CLIP vision inference synchronously.
fn embed_sync(
    session: &mut Session,
    bytes: &[u8],
    image_size: u32,
    expected_dims: usize,
) -> Result<Vec<f32>, EmbedError> {
    // 1. Decode
    let image = decode_image(bytes)?;

    // 2. Preprocess into an NCHW pixel tensor (batch_size=1)
    let (shape, pixels) = preprocess(&image, image_size);
    let tensor =
        Tensor::from_array((shape, pixels)).map_err(|e| EmbedError::Inference(e.to_string()))?;

    let inputs = ort::inputs! {
        "pixel_values" => tensor,
    };

    // 3. Run session
    let outputs = session
        .run(inputs)
        .map_err(|e| EmbedError::Inference(e.to_string()))?;

    // 4. Extract the pooled image embedding
    // The vision export names it "image_embeds"; fall back to the first
    // output for exports that only emit one.
    let output = match outputs.get("image_embeds") {
        Some(value) => value,
        None => &outputs[0],
    };
    // try_extract_tensor returns (&Shape, &[f32])
    let (_out_shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| EmbedError::Inference(e.to_string()))?;

    let embedding = data.to_vec();

    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(EmbedError::Inference(
            "embedding contains non-finite values".to_string(),
        ));
    }
    if embedding.len() != expected_dims {
        return Err(EmbedError::InvalidDimensions {
            expected: expected_dims,
            actual: embedding.len(),
        });
    }

    Ok(embedding)
}

/// Decode raw image bytes (PNG, JPEG, ...) with format sniffing.
fn decode_image(bytes: &[u8]) -> Result<DynamicImage, EmbedError> {
    image::load_from_memory(bytes).map_err(|e| EmbedError::ImageDecode(e.to_string()))
}

/// CLIP image preprocessing: resize the shortest edge to `size`, center
/// crop to `size`x`size`, scale to [0,1], normalize per channel, and lay
/// out as NCHW. Returns `(shape, pixels)` ready for `Tensor::from_array`.
fn preprocess(image: &DynamicImage, size: u32) -> (Vec<i64>, Vec<f32>) {
    let (w, h) = image.dimensions();

    // Resize so the shortest edge hits the target, preserving aspect ratio
    let scale = size as f32 / w.min(h) as f32;
    let new_w = ((w as f32) * scale).round().max(1.0) as u32;
    let new_h = ((h as f32) * scale).round().max(1.0) as u32;
    let resized = image
        .resize_exact(new_w, new_h, FilterType::CatmullRom)
        .to_rgb8();

    // Center crop
    let start_x = resized.width().saturating_sub(size) / 2;
    let start_y = resized.height().saturating_sub(size) / 2;

    let side = size as usize;
    let mut pixels = vec![0.0f32; 3 * side * side];
    for y in 0..side {
        for x in 0..side {
            let px = resized.get_pixel(start_x + x as u32, start_y + y as u32);
            for c in 0..3 {
                let value = px[c] as f32 / 255.0;
                pixels[c * side * side + y * side + x] = (value - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
    }

    (vec![1, 3, size as i64, size as i64], pixels)
}

/// Resolve the default model directory.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("pictor/models")
}

/// Resolve the path to the vision ONNX model.
///
/// If `model_path` from config is empty, uses the default location.
pub fn resolve_model_path(model_path: &str) -> PathBuf {
    if model_path.is_empty() {
        default_model_dir().join("clip-vit-base-patch32-vision.onnx")
    } else {
        PathBuf::from(model_path)
    }
}

// ============================================================================
// TESTS
// ============================================================================
