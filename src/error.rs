//! Error types for Clipframe.

use crate::loader::RunReport;
use std::path::PathBuf;
use thiserror::Error;

/// Library-level error type for Clipframe operations.
#[derive(Error, Debug)]
pub enum ClipframeError {
    /// Missing dataset roots, bad collection schema, unusable settings.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed CSV row, malformed detection JSON, unequal parallel arrays.
    #[error("Parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Embedding matrix is empty or has the wrong width.
    #[error("Shape error in {}: {message}", path.display())]
    Shape { path: PathBuf, message: String },

    /// The sources of one video do not have the same number of keyframes.
    #[error(
        "Alignment error for {video_id}: {embeddings} embeddings, {timings} timing rows, {detections} detection sets"
    )]
    Alignment {
        video_id: String,
        embeddings: usize,
        timings: usize,
        detections: usize,
    },

    /// Network failure or timeout talking to the vector store; retryable.
    #[error("Transient store error: {0}")]
    Transient(String),

    /// The vector store rejected the request outright; aborts the run.
    #[error("Permanent store error: {0}")]
    Permanent(String),

    /// A run-scoped failure stopped a load part-way; `report` holds what was
    /// done before it.
    #[error("Load aborted: {error}")]
    RunAborted {
        report: Box<RunReport>,
        error: Box<ClipframeError>,
    },

    #[error("Query encoder error: {0}")]
    Encoder(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClipframeError {
    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn shape(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Shape {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error only invalidates the video being processed.
    ///
    /// Video-scoped errors skip the video and the run continues; everything
    /// else aborts the run.
    pub fn is_video_scoped(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Shape { .. } | Self::Alignment { .. } | Self::Io(_)
        )
    }

    /// Whether a store call that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result type alias for Clipframe operations.
pub type Result<T> = std::result::Result<T, ClipframeError>;
