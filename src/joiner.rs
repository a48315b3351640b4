//! Record joiner: aligns one video's sources into keyframe records.
//!
//! The embedding matrix, the timing table and the detection sets of a video
//! are joined index-by-index. Keyframe `i` (0-based) becomes the record
//! `{video_id}_{i+1:03}` whose payload is derived only from entry `i` of each
//! source.

use crate::dataset::naming;
use crate::error::{ClipframeError, Result};
use crate::source::{Detection, VideoSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Detections scoring strictly above this are listed in `high_confidence_objects`.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// A detected object as persisted in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub entity: String,
    pub score: f64,
}

/// Payload stored next to each vector. Field order and names are the
/// persisted contract that search clients read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframePayload {
    /// Record id (`{video_id}_{keyframe_idx:03}`); point ids are derived from it.
    #[serde(default)]
    pub original_id: String,
    pub video_id: String,
    /// 1-based keyframe index.
    pub keyframe_idx: usize,
    pub keyframe_name: String,
    /// Image path relative to the data root.
    pub jpg_path: String,
    pub pts_time: f64,
    pub frame_idx: u64,
    pub fps: i64,
    pub batch: String,
    pub objects: Vec<DetectedObject>,
    pub object_labels: Vec<String>,
    pub high_confidence_objects: Vec<String>,
    pub object_count: usize,
    pub has_objects: bool,
}

impl KeyframePayload {
    /// Record identity, rebuilt from the video and index for payloads
    /// written without `original_id`.
    pub fn record_id(&self) -> String {
        if self.original_id.is_empty() {
            naming::record_id(&self.video_id, self.keyframe_idx)
        } else {
            self.original_id.clone()
        }
    }
}

/// The unit uploaded to the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeRecord {
    /// `{video_id}_{keyframe_idx:03}`.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: KeyframePayload,
}

impl KeyframeRecord {
    /// Deterministic point id for stores that only accept UUIDs.
    ///
    /// Loading the same keyframe twice overwrites the same point.
    pub fn point_uuid(&self) -> Uuid {
        point_uuid(&self.id)
    }
}

/// UUIDv5 of a record id.
pub fn point_uuid(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

/// Joins [`VideoSource`]s into [`KeyframeRecord`]s.
#[derive(Debug, Clone)]
pub struct RecordJoiner {
    keyframes_pattern: String,
}

impl RecordJoiner {
    /// `keyframes_pattern` is the keyframe directory pattern used for `jpg_path`.
    pub fn new(keyframes_pattern: impl Into<String>) -> Self {
        Self {
            keyframes_pattern: keyframes_pattern.into(),
        }
    }

    /// Start a lazy pass over the records of `source`.
    ///
    /// Fails before yielding anything if the three sources differ in length.
    /// Calling `join` again restarts from the first keyframe.
    pub fn join<'a>(&'a self, source: &'a VideoSource) -> Result<Records<'a>> {
        let embeddings = source.embeddings.len();
        let timings = source.timings.len();
        let detections = source.detections.len();

        if embeddings != timings || timings != detections {
            return Err(ClipframeError::Alignment {
                video_id: source.video_id.clone(),
                embeddings,
                timings,
                detections,
            });
        }

        Ok(Records {
            joiner: self,
            source,
            next: 0,
        })
    }

    fn build(&self, source: &VideoSource, index: usize) -> KeyframeRecord {
        let keyframe_idx = index + 1;
        let timing = &source.timings[index];
        let frame_detections = &source.detections[index];

        let (object_labels, high_confidence_objects) = summarize_labels(frame_detections);
        let objects: Vec<DetectedObject> = frame_detections
            .iter()
            .map(|d| DetectedObject {
                entity: d.entity.clone(),
                score: d.score,
            })
            .collect();

        let id = naming::record_id(&source.video_id, keyframe_idx);
        let payload = KeyframePayload {
            original_id: id.clone(),
            video_id: source.video_id.clone(),
            keyframe_idx,
            keyframe_name: naming::keyframe_file_name(keyframe_idx),
            jpg_path: naming::jpg_path(&self.keyframes_pattern, &source.video_id, keyframe_idx),
            pts_time: timing.pts_time,
            frame_idx: timing.frame_idx,
            fps: timing.fps as i64,
            batch: naming::batch_label(&source.video_id).to_string(),
            object_count: objects.len(),
            has_objects: !objects.is_empty(),
            objects,
            object_labels,
            high_confidence_objects,
        };

        KeyframeRecord {
            id,
            vector: source.embeddings.row(index).to_vec(),
            payload,
        }
    }
}

/// Distinct labels and distinct high-confidence labels, in order of first appearance.
fn summarize_labels(detections: &[Detection]) -> (Vec<String>, Vec<String>) {
    let mut labels = Vec::new();
    let mut seen = HashSet::new();
    let mut confident = Vec::new();
    let mut seen_confident = HashSet::new();

    for detection in detections {
        if seen.insert(detection.entity.as_str()) {
            labels.push(detection.entity.clone());
        }
        if detection.score > HIGH_CONFIDENCE_THRESHOLD
            && seen_confident.insert(detection.entity.as_str())
        {
            confident.push(detection.entity.clone());
        }
    }

    (labels, confident)
}

/// Lazy sequence of one video's records.
pub struct Records<'a> {
    joiner: &'a RecordJoiner,
    source: &'a VideoSource,
    next: usize,
}

impl Iterator for Records<'_> {
    type Item = KeyframeRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.source.timings.len() {
            return None;
        }
        let record = self.joiner.build(self.source, self.next);
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.timings.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Records<'_> {}
