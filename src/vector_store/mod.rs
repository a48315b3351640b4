//! Vector store abstraction for Clipframe.
//!
//! The vector database is an external collaborator. The pipeline and the
//! search service only talk to it through the [`VectorStore`] trait.

mod memory;
mod qdrant;

pub use memory::MemoryVectorStore;
pub use qdrant::QdrantStore;

use crate::config::{HnswSettings, StoreSettings};
use crate::error::{ClipframeError, Result};
use crate::joiner::{KeyframePayload, KeyframeRecord};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

/// Parameters for creating the keyframe collection. Distance is always cosine.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: String,
    pub vector_size: usize,
    pub hnsw: HnswSettings,
    pub default_segment_number: u32,
    pub memmap_threshold: u64,
}

impl CollectionSpec {
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self {
            name: settings.collection.clone(),
            vector_size: settings.vector_size,
            hnsw: settings.hnsw.clone(),
            default_segment_number: settings.default_segment_number,
            memmap_threshold: settings.memmap_threshold,
        }
    }
}

/// Type of a payload index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadSchema {
    Keyword,
    Bool,
}

/// Payload fields indexed for filtering.
pub const PAYLOAD_INDEXES: [(&str, PayloadSchema); 4] = [
    ("video_id", PayloadSchema::Keyword),
    ("batch", PayloadSchema::Keyword),
    ("object_labels", PayloadSchema::Keyword),
    ("has_objects", PayloadSchema::Bool),
];

/// Payload conditions of a search; all of them must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    /// Every label must appear in `object_labels`.
    pub object_labels: Vec<String>,
    pub video_id: Option<String>,
    pub batch: Option<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.object_labels.is_empty() && self.video_id.is_none() && self.batch.is_none()
    }

    /// Evaluate the filter locally.
    pub fn matches(&self, payload: &KeyframePayload) -> bool {
        self.object_labels
            .iter()
            .all(|label| payload.object_labels.contains(label))
            && self
                .video_id
                .as_ref()
                .map_or(true, |id| *id == payload.video_id)
            && self.batch.as_ref().map_or(true, |b| *b == payload.batch)
    }
}

/// A similarity query.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub filter: SearchFilter,
    pub limit: usize,
    /// Hits scoring below this are dropped.
    pub score_threshold: Option<f32>,
}

/// A search hit.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Record id (`{video_id}_{keyframe_idx:03}`).
    pub id: String,
    /// Cosine similarity (higher is better).
    pub score: f32,
    pub payload: KeyframePayload,
}

/// Summary of a collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_size: Option<usize>,
    pub points_count: u64,
    pub status: String,
}

/// Trait for vector store implementations.
///
/// Write failures must be classified: [`ClipframeError::Transient`] for
/// conditions worth retrying, [`ClipframeError::Permanent`] for rejections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection summary, or `None` if the collection does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Create a cosine-distance collection.
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// Index a payload field for filtering.
    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchema,
    ) -> Result<()>;

    /// Insert or overwrite a batch of records in a single call.
    async fn upsert(&self, collection: &str, records: &[KeyframeRecord]) -> Result<()>;

    /// Filtered similarity search, best hits first.
    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>>;

    /// Check that the store is reachable.
    async fn health(&self) -> Result<()>;
}

/// Make sure the collection exists with the expected vector size.
///
/// Creates it when missing and returns whether it was created. An existing
/// collection with a different vector size is a configuration error.
/// Payload indexes are (re)created either way, so a run interrupted between
/// creating the collection and its indexes is repaired by the next one.
pub async fn ensure_collection(
    store: &dyn VectorStore,
    spec: &CollectionSpec,
    payload_indexes: bool,
) -> Result<bool> {
    let created = match store.collection_info(&spec.name).await? {
        Some(info) => {
            if let Some(size) = info.vector_size {
                if size != spec.vector_size {
                    return Err(ClipframeError::Config(format!(
                        "collection '{}' stores {}-dimensional vectors, expected {}",
                        spec.name, size, spec.vector_size
                    )));
                }
            }
            info!(
                "Using existing collection '{}' ({} points)",
                spec.name, info.points_count
            );
            false
        }
        None => {
            store.create_collection(spec).await?;
            info!("Created collection '{}'", spec.name);
            true
        }
    };

    if payload_indexes {
        for (field, schema) in PAYLOAD_INDEXES {
            store.create_payload_index(&spec.name, field, schema).await?;
        }
        debug!("Ensured {} payload indexes", PAYLOAD_INDEXES.len());
    }

    Ok(created)
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::joiner::{DetectedObject, KeyframePayload, KeyframeRecord};

    /// A record with the given vector and high-confidence labels.
    pub fn record(video_id: &str, idx: usize, vector: Vec<f32>, labels: &[&str]) -> KeyframeRecord {
        let id = format!("{}_{:03}", video_id, idx);
        KeyframeRecord {
            id: id.clone(),
            vector,
            payload: KeyframePayload {
                original_id: id,
                video_id: video_id.to_string(),
                keyframe_idx: idx,
                keyframe_name: format!("{:03}.jpg", idx),
                jpg_path: format!("Keyframes_L21/keyframes/{}/{:03}.jpg", video_id, idx),
                pts_time: idx as f64,
                frame_idx: idx as u64 * 25,
                fps: 25,
                batch: "L21".to_string(),
                objects: labels
                    .iter()
                    .map(|l| DetectedObject {
                        entity: l.to_string(),
                        score: 0.9,
                    })
                    .collect(),
                object_labels: labels.iter().map(|l| l.to_string()).collect(),
                high_confidence_objects: labels.iter().map(|l| l.to_string()).collect(),
                object_count: labels.len(),
                has_objects: !labels.is_empty(),
            },
        }
    }
}
