//! Configuration settings for Clipframe.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub dataset: DatasetSettings,
    pub store: StoreSettings,
    pub ingest: IngestSettings,
    pub encoder: EncoderSettings,
    pub server: ServerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

/// Location of the precomputed dataset on disk.
///
/// Sub-directories are joined onto `data_root`; an absolute sub-directory
/// replaces the root entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    /// Directory containing all dataset folders.
    pub data_root: String,
    /// CLIP feature matrices, one `{video_id}.npy` per video.
    pub embeddings_dir: String,
    /// Per-frame timing tables, one `{video_id}.csv` per video.
    pub timing_dir: String,
    /// Object detections, one `{video_id}/` directory of JSON files per video.
    pub detections_dir: String,
    /// Keyframe image directory relative to `data_root`; `{batch}` is replaced
    /// by the batch label of the video (e.g. `L21`).
    pub keyframes_dir_pattern: String,
    /// Treat a missing keyframe image directory as an incomplete video.
    pub require_keyframes: bool,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            data_root: "./data".to_string(),
            embeddings_dir: "clip-features-32-aic25-b1/clip-features-32".to_string(),
            timing_dir: "map-keyframes-aic25-b1/map-keyframes".to_string(),
            detections_dir: "objects-aic25-b1/objects".to_string(),
            keyframes_dir_pattern: "Keyframes_{batch}/keyframes".to_string(),
            require_keyframes: false,
        }
    }
}

/// HNSW index parameters passed to the vector store on collection creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswSettings {
    pub m: u32,
    pub ef_construct: u32,
}

impl Default for HnswSettings {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 200,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Base URL of the Qdrant REST API.
    pub url: String,
    /// API key sent as the `api-key` header, if the server requires one.
    pub api_key: Option<String>,
    /// Collection holding keyframe points.
    pub collection: String,
    /// Embedding dimensionality.
    pub vector_size: usize,
    /// Timeout for a single store request, in seconds.
    pub timeout_secs: u64,
    pub hnsw: HnswSettings,
    pub default_segment_number: u32,
    pub memmap_threshold: u64,
    /// Create keyword/bool payload indexes when creating the collection.
    pub create_payload_indexes: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            api_key: None,
            collection: "video_keyframes".to_string(),
            vector_size: 512,
            timeout_secs: 60,
            hnsw: HnswSettings::default(),
            default_segment_number: 16,
            memmap_threshold: 20_000,
            create_payload_indexes: true,
        }
    }
}

/// Load pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Points per upsert call.
    pub batch_size: usize,
    /// Attempts per batch, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on the delay between retries, in milliseconds.
    pub max_backoff_ms: u64,
    /// Videos processed concurrently. 1 is strictly sequential.
    pub workers: usize,
    /// Timeout for reading a single dataset file, in seconds.
    pub read_timeout_secs: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            workers: 1,
            read_timeout_secs: 30,
        }
    }
}

/// External CLIP encoder settings (query side only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Base URL of the encoder service.
    pub url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8001".to_string(),
            timeout_secs: 30,
        }
    }
}

/// HTTP search API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Directory with the static frontend, served as a fallback route.
    pub static_dir: Option<String>,
    /// Upper bound on results returned by one search request.
    pub max_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            static_dir: None,
            max_limit: 1000,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ClipframeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clipframe")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data root.
    pub fn data_root(&self) -> PathBuf {
        Self::expand_path(&self.dataset.data_root)
    }

    /// Directory of `.npy` embedding matrices.
    pub fn embeddings_root(&self) -> PathBuf {
        self.data_root().join(Self::expand_path(&self.dataset.embeddings_dir))
    }

    /// Directory of timing CSV files.
    pub fn timing_root(&self) -> PathBuf {
        self.data_root().join(Self::expand_path(&self.dataset.timing_dir))
    }

    /// Directory of per-video detection directories.
    pub fn detections_root(&self) -> PathBuf {
        self.data_root().join(Self::expand_path(&self.dataset.detections_dir))
    }

    /// Static frontend directory, if configured.
    pub fn static_dir(&self) -> Option<PathBuf> {
        self.server.static_dir.as_deref().map(Self::expand_path)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest.read_timeout_secs)
    }
}
