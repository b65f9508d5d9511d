pub mod clip;
pub mod config;
pub mod embedding;
pub mod id;
pub mod store;

pub use clip::ClipVisionEmbedder;
pub use config::PictorConfig;
pub use embedding::{
    decode_image_payload, encode_image_payload, EmbedError, EmbedHttpClient, ImageEmbedder,
    CLIP_DIMENSIONS,
};
pub use id::record_id;
pub use store::{PgVectorStore, StoreError, VectorRecord, VectorStore};
