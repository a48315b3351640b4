//! In-memory vector store implementation.
//!
//! Useful for testing and dry runs.

use super::{
    cosine_similarity, CollectionInfo, CollectionSpec, PayloadSchema, ScoredPoint, SearchRequest,
    VectorStore,
};
use crate::error::{ClipframeError, Result};
use crate::joiner::KeyframeRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

struct Collection {
    vector_size: usize,
    points: HashMap<String, KeyframeRecord>,
    payload_indexes: Vec<(String, PayloadSchema)>,
}

/// In-memory vector store.
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of points in a collection (0 if it does not exist).
    pub fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, |c| c.points.len()))
            .unwrap_or(0)
    }

    /// A stored record by id.
    pub fn get(&self, collection: &str, id: &str) -> Option<KeyframeRecord> {
        self.collections
            .read()
            .ok()?
            .get(collection)?
            .points
            .get(id)
            .cloned()
    }

    /// Indexed payload fields of a collection.
    pub fn payload_indexes(&self, collection: &str) -> Vec<(String, PayloadSchema)> {
        self.collections
            .read()
            .map(|c| {
                c.get(collection)
                    .map(|c| c.payload_indexes.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> ClipframeError {
    ClipframeError::Permanent("memory store lock poisoned".to_string())
}

fn missing(collection: &str) -> ClipframeError {
    ClipframeError::Permanent(format!("collection '{}' not found", collection))
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            vector_size: Some(c.vector_size),
            points_count: c.points.len() as u64,
            status: "green".to_string(),
        }))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        if collections.contains_key(&spec.name) {
            return Err(ClipframeError::Permanent(format!(
                "collection '{}' already exists",
                spec.name
            )));
        }
        collections.insert(
            spec.name.clone(),
            Collection {
                vector_size: spec.vector_size,
                points: HashMap::new(),
                payload_indexes: Vec::new(),
            },
        );
        Ok(())
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadSchema,
    ) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        target.payload_indexes.retain(|(f, _)| f != field);
        target.payload_indexes.push((field.to_string(), schema));
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[KeyframeRecord]) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(bad) = records.iter().find(|r| r.vector.len() != target.vector_size) {
            return Err(ClipframeError::Permanent(format!(
                "{}: vector has {} dimensions, collection expects {}",
                bad.id,
                bad.vector.len(),
                target.vector_size
            )));
        }

        for record in records {
            target.points.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;
        let threshold = request.score_threshold.unwrap_or(f32::MIN);

        let mut results: Vec<ScoredPoint> = target
            .points
            .values()
            .filter(|r| request.filter.matches(&r.payload))
            .map(|r| ScoredPoint {
                id: r.id.clone(),
                score: cosine_similarity(&request.vector, &r.vector),
                payload: r.payload.clone(),
            })
            .filter(|p| p.score >= threshold)
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(request.limit);

        Ok(results)
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}
