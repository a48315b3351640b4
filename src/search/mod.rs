//! Query service: text and image search over the keyframe collection.
//!
//! Queries are encoded by the external CLIP encoder, searched in the vector
//! store with an optional object filter, merged, ranked, paginated and
//! grouped by video.

use crate::config::Settings;
use crate::encoder::{HttpEncoder, QueryEncoder};
use crate::error::{ClipframeError, Result};
use crate::joiner::DetectedObject;
use crate::vector_store::{
    CollectionInfo, QdrantStore, ScoredPoint, SearchFilter, SearchRequest, VectorStore,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Results returned when a request does not set `limit`.
pub const DEFAULT_LIMIT: usize = 500;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn default_page() -> usize {
    1
}

/// Options shared by text and image search.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchOptions {
    /// Keep only keyframes where every listed object was detected.
    #[serde(default)]
    pub object_filters: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub score_threshold: f32,
    /// 1-based page over the ranked results.
    #[serde(default = "default_page")]
    pub page: usize,
    /// Defaults to `limit`, i.e. a single page.
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            object_filters: Vec::new(),
            limit: DEFAULT_LIMIT,
            score_threshold: 0.0,
            page: 1,
            page_size: None,
        }
    }
}

impl SearchOptions {
    fn validate(&self, max_limit: usize) -> Result<()> {
        if self.limit == 0 || self.limit > max_limit {
            return Err(ClipframeError::InvalidInput(format!(
                "limit must be between 1 and {}, got {}",
                max_limit, self.limit
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ClipframeError::InvalidInput(format!(
                "score_threshold must be between 0 and 1, got {}",
                self.score_threshold
            )));
        }
        if self.page == 0 {
            return Err(ClipframeError::InvalidInput("page starts at 1".to_string()));
        }
        if let Some(page_size) = self.page_size {
            if page_size == 0 || page_size > max_limit {
                return Err(ClipframeError::InvalidInput(format!(
                    "page_size must be between 1 and {}, got {}",
                    max_limit, page_size
                )));
            }
        }
        Ok(())
    }

    fn filter(&self) -> SearchFilter {
        let mut labels: Vec<String> = Vec::new();
        for label in self.object_filters.iter().map(|l| l.trim()) {
            if !label.is_empty() && !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }
        SearchFilter {
            object_labels: labels,
            ..Default::default()
        }
    }
}

/// Search by one or more text queries.
#[derive(Debug, Clone, Deserialize)]
pub struct TextSearchRequest {
    pub query_texts: Vec<String>,
    #[serde(flatten)]
    pub options: SearchOptions,
}

/// Search by example image.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSearchRequest {
    pub image_base64: String,
    #[serde(flatten)]
    pub options: SearchOptions,
}

/// One ranked keyframe.
#[derive(Debug, Clone, Serialize)]
pub struct VideoSearchResult {
    pub rank: usize,
    pub original_id: String,
    pub video_id: String,
    pub keyframe_idx: usize,
    pub jpg_path: String,
    pub pts_time: f64,
    pub frame_idx: u64,
    pub similarity_score: f32,
    pub objects: Vec<DetectedObject>,
}

/// Keyframes of one video within the returned page.
#[derive(Debug, Clone, Serialize)]
pub struct VideoGroupedResult {
    pub video_id: String,
    pub total_frames: usize,
    pub best_score: f32,
    pub frames: Vec<VideoSearchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoSearchResponse {
    /// Ranked results across all pages.
    pub total_results: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub query_time_ms: f64,
    pub results: Vec<VideoSearchResult>,
    pub grouped_by_video: Vec<VideoGroupedResult>,
}

/// Text and image search over the keyframe collection.
pub struct SearchService {
    store: Arc<dyn VectorStore>,
    encoder: Arc<dyn QueryEncoder>,
    collection: String,
    max_limit: usize,
}

impl SearchService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        encoder: Arc<dyn QueryEncoder>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            encoder,
            collection: collection.into(),
            max_limit: 1000,
        }
    }

    /// Service for the configured store and encoder.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let store = Arc::new(QdrantStore::from_settings(&settings.store)?);
        let encoder = Arc::new(HttpEncoder::from_settings(&settings.encoder)?);
        Ok(Self::new(store, encoder, settings.store.collection.clone())
            .with_max_limit(settings.server.max_limit))
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Summary of the searched collection.
    pub async fn collection_info(&self) -> Result<CollectionInfo> {
        self.store
            .collection_info(&self.collection)
            .await?
            .ok_or_else(|| {
                ClipframeError::Config(format!("collection '{}' does not exist", self.collection))
            })
    }

    /// Search with one or more text queries; blank queries are ignored.
    #[instrument(skip(self, request), fields(queries = request.query_texts.len()))]
    pub async fn search_text(&self, request: &TextSearchRequest) -> Result<VideoSearchResponse> {
        let started = Instant::now();
        request.options.validate(self.max_limit)?;

        let queries: Vec<String> = request
            .query_texts
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();
        if queries.is_empty() {
            return Err(ClipframeError::InvalidInput(
                "at least one non-empty query text is required".to_string(),
            ));
        }

        let vectors = self.encoder.encode_texts(&queries).await?;
        self.search_vectors(vectors, &request.options, started).await
    }

    /// Search with a base64-encoded example image.
    #[instrument(skip_all)]
    pub async fn search_image(&self, request: &ImageSearchRequest) -> Result<VideoSearchResponse> {
        let started = Instant::now();
        request.options.validate(self.max_limit)?;
        if request.image_base64.trim().is_empty() {
            return Err(ClipframeError::InvalidInput("image_base64 is empty".to_string()));
        }

        let vector = self
            .encoder
            .encode_image_base64(request.image_base64.trim())
            .await?;
        self.search_vectors(vec![vector], &request.options, started).await
    }

    async fn search_vectors(
        &self,
        vectors: Vec<Vec<f32>>,
        options: &SearchOptions,
        started: Instant,
    ) -> Result<VideoSearchResponse> {
        let filter = options.filter();
        let mut best: HashMap<String, ScoredPoint> = HashMap::new();

        for vector in vectors {
            let request = SearchRequest {
                vector,
                filter: filter.clone(),
                limit: options.limit,
                score_threshold: Some(options.score_threshold),
            };
            for hit in self.store.search(&self.collection, &request).await? {
                match best.get(&hit.id) {
                    Some(existing) if existing.score >= hit.score => {}
                    _ => {
                        best.insert(hit.id.clone(), hit);
                    }
                }
            }
        }

        let mut ranked: Vec<ScoredPoint> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(options.limit);

        let total_results = ranked.len();
        let page_size = options.page_size.unwrap_or(options.limit);
        let total_pages = total_results.div_ceil(page_size);
        // Pages past the end are empty; the offset saturates instead of wrapping.
        let offset = (options.page - 1).saturating_mul(page_size);
        let results: Vec<VideoSearchResult> = ranked
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(page_size)
            .map(|(i, hit)| to_result(i + 1, hit))
            .collect();

        debug!(
            "{} ranked results, returning page {} of {}",
            total_results, options.page, total_pages
        );

        Ok(VideoSearchResponse {
            total_results,
            page: options.page,
            page_size,
            total_pages,
            query_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            grouped_by_video: group_by_video(&results),
            results,
        })
    }
}

fn to_result(rank: usize, hit: ScoredPoint) -> VideoSearchResult {
    let payload = hit.payload;
    VideoSearchResult {
        rank,
        original_id: hit.id,
        video_id: payload.video_id,
        keyframe_idx: payload.keyframe_idx,
        jpg_path: payload.jpg_path,
        pts_time: payload.pts_time,
        frame_idx: payload.frame_idx,
        similarity_score: hit.score,
        objects: payload.objects,
    }
}

/// Group ranked results by video, best video first.
pub fn group_by_video(results: &[VideoSearchResult]) -> Vec<VideoGroupedResult> {
    let mut groups: Vec<VideoGroupedResult> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for result in results {
        let slot = *index.entry(result.video_id.as_str()).or_insert_with(|| {
            groups.push(VideoGroupedResult {
                video_id: result.video_id.clone(),
                total_frames: 0,
                best_score: result.similarity_score,
                frames: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.total_frames += 1;
        group.best_score = group.best_score.max(result.similarity_score);
        group.frames.push(result.clone());
    }

    groups.sort_by(|a, b| {
        b.best_score
            .partial_cmp(&a.best_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    groups
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;

    /// Encoder that maps known texts to fixed vectors.
    pub struct FakeEncoder {
        pub texts: HashMap<String, Vec<f32>>,
        pub image: Vec<f32>,
    }

    #[async_trait]
    impl QueryEncoder for FakeEncoder {
        async fn encode_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            texts
                .iter()
                .map(|t| {
                    self.texts
                        .get(t)
                        .cloned()
                        .ok_or_else(|| ClipframeError::Encoder(format!("unknown text {}", t)))
                })
                .collect()
        }

        async fn encode_image_base64(&self, _image_base64: &str) -> Result<Vec<f32>> {
            Ok(self.image.clone())
        }
    }
}
