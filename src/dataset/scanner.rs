//! Dataset scanner: enumerates videos and checks their companion sources.

use super::DatasetRoots;
use crate::error::{ClipframeError, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// A companion source that a video is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSource {
    /// No `{video_id}.csv` timing table.
    Timing,
    /// No `{video_id}/` detection directory.
    Detections,
    /// No keyframe image directory (only when keyframes are required).
    Keyframes,
}

impl fmt::Display for MissingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingSource::Timing => write!(f, "timing csv"),
            MissingSource::Detections => write!(f, "detection directory"),
            MissingSource::Keyframes => write!(f, "keyframe directory"),
        }
    }
}

/// Completeness of one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "missing", rename_all = "snake_case")]
pub enum VideoStatus {
    Complete,
    Incomplete(Vec<MissingSource>),
}

/// One video found by the scanner.
#[derive(Debug, Clone, Serialize)]
pub struct VideoEntry {
    pub video_id: String,
    pub status: VideoStatus,
}

impl VideoEntry {
    pub fn is_complete(&self) -> bool {
        self.status == VideoStatus::Complete
    }
}

/// Every video found in the embeddings root, sorted by id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetManifest {
    pub entries: Vec<VideoEntry>,
}

impl DatasetManifest {
    /// Videos with all sources present.
    pub fn complete(&self) -> impl Iterator<Item = &VideoEntry> {
        self.entries.iter().filter(|e| e.is_complete())
    }

    /// Videos excluded from processing, with what they lack.
    pub fn incomplete(&self) -> impl Iterator<Item = (&str, &[MissingSource])> {
        self.entries.iter().filter_map(|e| match &e.status {
            VideoStatus::Incomplete(missing) => Some((e.video_id.as_str(), missing.as_slice())),
            VideoStatus::Complete => None,
        })
    }

    pub fn complete_count(&self) -> usize {
        self.complete().count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a [`DatasetManifest`] from the dataset roots.
pub struct DatasetScanner {
    roots: DatasetRoots,
    require_keyframes: bool,
}

impl DatasetScanner {
    pub fn new(roots: DatasetRoots) -> Self {
        Self {
            roots,
            require_keyframes: false,
        }
    }

    /// Treat a missing keyframe image directory as an incomplete video.
    pub fn require_keyframes(mut self, required: bool) -> Self {
        self.require_keyframes = required;
        self
    }

    pub fn roots(&self) -> &DatasetRoots {
        &self.roots
    }

    /// Scan the dataset.
    ///
    /// Fails with a configuration error if any root is missing or unreadable;
    /// there is no partial scan.
    #[instrument(skip(self))]
    pub fn scan(&self) -> Result<DatasetManifest> {
        self.validate_roots()?;

        let read_dir = std::fs::read_dir(&self.roots.embeddings).map_err(|e| {
            ClipframeError::Config(format!(
                "cannot read embeddings root {}: {}",
                self.roots.embeddings.display(),
                e
            ))
        })?;

        let mut video_ids = Vec::new();
        for entry in read_dir {
            let path = entry
                .map_err(|e| {
                    ClipframeError::Config(format!(
                        "cannot list embeddings root {}: {}",
                        self.roots.embeddings.display(),
                        e
                    ))
                })?
                .path();

            let is_npy = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("npy"));
            if !is_npy || !path.is_file() {
                continue;
            }

            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if !stem.starts_with('.') && !stem.is_empty() => {
                    video_ids.push(stem.to_string())
                }
                _ => debug!("Ignoring embedding file {}", path.display()),
            }
        }
        video_ids.sort();

        let entries: Vec<VideoEntry> = video_ids
            .into_iter()
            .map(|video_id| {
                let status = self.check_video(&video_id);
                if let VideoStatus::Incomplete(missing) = &status {
                    let names: Vec<String> = missing.iter().map(|m| m.to_string()).collect();
                    warn!("{} is incomplete: missing {}", video_id, names.join(", "));
                }
                VideoEntry { video_id, status }
            })
            .collect();

        let manifest = DatasetManifest { entries };
        info!(
            "Scanned {} videos ({} complete)",
            manifest.len(),
            manifest.complete_count()
        );
        Ok(manifest)
    }

    fn validate_roots(&self) -> Result<()> {
        for (label, root) in self.roots.labeled() {
            if !root.is_dir() {
                return Err(ClipframeError::Config(format!(
                    "{} root does not exist or is not a directory: {}",
                    label,
                    root.display()
                )));
            }
        }
        Ok(())
    }

    fn check_video(&self, video_id: &str) -> VideoStatus {
        let mut missing = Vec::new();

        if !self.roots.timing_path(video_id).is_file() {
            missing.push(MissingSource::Timing);
        }
        if !self.roots.detection_dir(video_id).is_dir() {
            missing.push(MissingSource::Detections);
        }

        let keyframe_dir = self.roots.keyframe_dir(video_id);
        if !keyframe_dir.is_dir() {
            if self.require_keyframes {
                missing.push(MissingSource::Keyframes);
            } else {
                debug!(
                    "{} has no keyframe directory at {}",
                    video_id,
                    keyframe_dir.display()
                );
            }
        }

        if missing.is_empty() {
            VideoStatus::Complete
        } else {
            VideoStatus::Incomplete(missing)
        }
    }
}
