//! Source readers for one video's raw artifacts.
//!
//! A video is made of an embedding matrix (`.npy`), a timing table (`.csv`)
//! and a directory of per-keyframe detection files (`.json`). Parsing is pure;
//! [`SourceReader`] adds the disk access with read timeouts.

mod detections;
mod embeddings;
mod timing;

pub use detections::{parse_detections, Detection};
pub use embeddings::{parse_embeddings, EmbeddingMatrix};
pub use timing::{parse_timings, TimingRecord};

use crate::dataset::{naming, DatasetRoots};
use crate::error::{ClipframeError, Result};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, instrument};

/// All raw inputs of one video, index-aligned by keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSource {
    pub video_id: String,
    pub embeddings: EmbeddingMatrix,
    pub timings: Vec<TimingRecord>,
    /// Detections per keyframe; an empty set means nothing was detected.
    pub detections: Vec<Vec<Detection>>,
}

/// Reads [`VideoSource`]s from the dataset roots.
pub struct SourceReader {
    roots: DatasetRoots,
    vector_size: usize,
    read_timeout: Duration,
}

impl SourceReader {
    pub fn new(roots: DatasetRoots, vector_size: usize, read_timeout: Duration) -> Self {
        Self {
            roots,
            vector_size,
            read_timeout,
        }
    }

    pub fn roots(&self) -> &DatasetRoots {
        &self.roots
    }

    /// Load every source of a video.
    ///
    /// Detections are looked up for keyframes `1..=N` where N is the number of
    /// timing rows; a keyframe without a detection file gets an empty set.
    #[instrument(skip(self))]
    pub async fn read(&self, video_id: &str) -> Result<VideoSource> {
        let embedding_path = self.roots.embedding_path(video_id);
        let bytes = self.read_file(&embedding_path).await?;
        let embeddings = parse_embeddings(&bytes, &embedding_path, self.vector_size)?;
        drop(bytes);

        let timing_path = self.roots.timing_path(video_id);
        let bytes = self.read_file(&timing_path).await?;
        let timings = parse_timings(&bytes, &timing_path)?;

        let detection_dir = self.roots.detection_dir(video_id);
        let mut detections = Vec::with_capacity(timings.len());
        let mut files_found = 0usize;
        for keyframe_idx in 1..=timings.len() {
            let frame = self.read_frame_detections(&detection_dir, keyframe_idx).await?;
            if frame.is_some() {
                files_found += 1;
            }
            detections.push(frame.unwrap_or_default());
        }

        debug!(
            "Loaded {}: {} embeddings, {} timing rows, {} detection files",
            video_id,
            embeddings.len(),
            timings.len(),
            files_found
        );

        Ok(VideoSource {
            video_id: video_id.to_string(),
            embeddings,
            timings,
            detections,
        })
    }

    /// Detections of one keyframe, or `None` when no detection file exists.
    async fn read_frame_detections(
        &self,
        dir: &Path,
        keyframe_idx: usize,
    ) -> Result<Option<Vec<Detection>>> {
        for name in naming::detection_file_candidates(keyframe_idx) {
            let path = dir.join(name);
            match self.read_file(&path).await {
                Ok(bytes) => return parse_detections(&bytes, &path).map(Some),
                Err(ClipframeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.within_timeout(path, tokio::fs::read(path)).await
    }

    /// Bound a read of `path` by the read timeout; running out is an IO error.
    async fn within_timeout<T>(
        &self,
        path: &Path,
        read: impl Future<Output = std::io::Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.read_timeout, read).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ClipframeError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!(
                    "reading {} took longer than {:?}",
                    path.display(),
                    self.read_timeout
                ),
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Helpers for writing dataset fixtures.

    /// Encode a C-order little-endian f32 matrix as `.npy` bytes.
    pub fn npy_f32(rows: usize, cols: usize, value: impl Fn(usize, usize) -> f32) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
            rows, cols
        );
        // Magic (6) + version (2) + length (2) + header must be 64-aligned, newline-terminated.
        let unpadded = 10 + header.len() + 1;
        let padding = (64 - unpadded % 64) % 64;
        header.push_str(&" ".repeat(padding));
        header.push('\n');

        let mut bytes = Vec::with_capacity(10 + header.len() + rows * cols * 4);
        bytes.extend_from_slice(b"\x93NUMPY");
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        for r in 0..rows {
            for c in 0..cols {
                bytes.extend_from_slice(&value(r, c).to_le_bytes());
            }
        }
        bytes
    }

    /// Timing CSV with `rows` keyframes at 30 fps, sampled every 25 frames.
    pub fn timing_csv(rows: usize) -> String {
        let mut csv = String::from("n,pts_time,fps,frame_idx\n");
        for i in 0..rows {
            let frame_idx = i * 25;
            csv.push_str(&format!(
                "{},{},30,{}\n",
                i + 1,
                frame_idx as f64 / 30.0,
                frame_idx
            ));
        }
        csv
    }
}
