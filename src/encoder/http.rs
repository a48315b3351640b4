//! HTTP client for an external CLIP encoder service.
//!
//! `POST {url}/encode/text {"texts": [...]}` and
//! `POST {url}/encode/image {"image_base64": "..."}` both answer
//! `{"embeddings": [[...], ...]}`.

use super::QueryEncoder;
use crate::config::EncoderSettings;
use crate::error::{ClipframeError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Encoder backed by a CLIP HTTP service.
pub struct HttpEncoder {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    texts: &'a [String],
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image_base64: &'a str,
}

#[derive(Deserialize)]
struct EncodeResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEncoder {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClipframeError::Config(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &EncoderSettings) -> Result<Self> {
        Self::new(&settings.url, Duration::from_secs(settings.timeout_secs))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClipframeError::Encoder(format!(
                "encoder returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: EncodeResponse = response.json().await?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl QueryEncoder for HttpEncoder {
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.post("/encode/text", &TextRequest { texts }).await?;
        if embeddings.len() != texts.len() {
            return Err(ClipframeError::Encoder(format!(
                "asked for {} text embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        debug!("Encoded {} text queries", embeddings.len());
        Ok(embeddings)
    }

    #[instrument(skip_all)]
    async fn encode_image_base64(&self, image_base64: &str) -> Result<Vec<f32>> {
        self.post("/encode/image", &ImageRequest { image_base64 })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClipframeError::Encoder("empty image embedding response".to_string()))
    }
}
