//! Dataset discovery.
//!
//! The dataset is four parallel directory trees keyed by video id:
//! embedding matrices, timing tables, detection directories and keyframe
//! images.

pub mod naming;
mod scanner;

pub use scanner::{DatasetManifest, DatasetScanner, MissingSource, VideoEntry, VideoStatus};

use crate::config::Settings;
use std::path::{Path, PathBuf};

/// The four dataset roots.
#[derive(Debug, Clone)]
pub struct DatasetRoots {
    /// Directory of `{video_id}.npy` files.
    pub embeddings: PathBuf,
    /// Directory of `{video_id}.csv` files.
    pub timing: PathBuf,
    /// Directory of `{video_id}/` detection directories.
    pub detections: PathBuf,
    /// Root that `keyframes_pattern` is resolved against.
    pub keyframes: PathBuf,
    /// Keyframe directory pattern with a `{batch}` placeholder.
    pub keyframes_pattern: String,
}

impl DatasetRoots {
    /// Resolve the roots from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            embeddings: settings.embeddings_root(),
            timing: settings.timing_root(),
            detections: settings.detections_root(),
            keyframes: settings.data_root(),
            keyframes_pattern: settings.dataset.keyframes_dir_pattern.clone(),
        }
    }

    pub fn embedding_path(&self, video_id: &str) -> PathBuf {
        self.embeddings.join(format!("{}.npy", video_id))
    }

    pub fn timing_path(&self, video_id: &str) -> PathBuf {
        self.timing.join(format!("{}.csv", video_id))
    }

    pub fn detection_dir(&self, video_id: &str) -> PathBuf {
        self.detections.join(video_id)
    }

    pub fn keyframe_dir(&self, video_id: &str) -> PathBuf {
        self.keyframes
            .join(naming::keyframes_dir(&self.keyframes_pattern, video_id))
    }

    /// All roots with a label, for validation and diagnostics.
    pub fn labeled(&self) -> [(&'static str, &Path); 4] {
        [
            ("embeddings", self.embeddings.as_path()),
            ("timing", self.timing.as_path()),
            ("detections", self.detections.as_path()),
            ("keyframes", self.keyframes.as_path()),
        ]
    }
}
