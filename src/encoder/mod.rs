//! Query encoding for text and image search.
//!
//! Keyframe embeddings are precomputed; only queries need encoding, and that
//! is delegated to an external CLIP service.

mod http;

pub use http::HttpEncoder;

use crate::error::Result;
use async_trait::async_trait;

/// Trait for CLIP query encoders.
#[async_trait]
pub trait QueryEncoder: Send + Sync {
    /// Encode text queries, one vector per query, in order.
    async fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a base64-encoded image.
    async fn encode_image_base64(&self, image_base64: &str) -> Result<Vec<f32>>;
}
