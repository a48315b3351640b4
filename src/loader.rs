//! Load pipeline for Clipframe.
//!
//! Coordinates a whole run: dataset scan, collection bootstrap, then
//! read, join and upload for every complete video.

use crate::config::Settings;
use crate::dataset::{DatasetManifest, DatasetRoots, DatasetScanner};
use crate::error::{ClipframeError, Result};
use crate::joiner::RecordJoiner;
use crate::source::SourceReader;
use crate::uploader::{BatchUploader, FailedBatch, RetryPolicy, VideoUploadOutcome};
use crate::vector_store::{ensure_collection, CollectionSpec, QdrantStore, VectorStore};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use indicatif::ProgressBar;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Which videos a run covers and how many are processed at once.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Process only the first N complete videos.
    pub limit: Option<usize>,
    /// Restrict the run to these video ids (empty means all).
    pub videos: Vec<String>,
    /// Overrides `ingest.workers`.
    pub workers: Option<usize>,
}

/// A video that was not (fully) processed and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedVideo {
    pub video_id: String,
    pub reason: String,
}

/// Run-scoped counters, returned at the end of a load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub collection: String,
    pub videos_found: usize,
    pub videos_attempted: usize,
    pub videos_succeeded: usize,
    pub records_uploaded: usize,
    pub records_failed: usize,
    /// Records never sent because the run was cancelled or aborted.
    pub records_not_submitted: usize,
    pub skipped: Vec<SkippedVideo>,
    pub failed_batches: Vec<FailedBatch>,
    pub elapsed_secs: f64,
    pub cancelled: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn skip(&mut self, video_id: &str, reason: impl Into<String>) {
        self.skipped.push(SkippedVideo {
            video_id: video_id.to_string(),
            reason: reason.into(),
        });
    }

    fn record(&mut self, outcome: VideoUploadOutcome) {
        self.videos_attempted += 1;
        if outcome.is_complete() {
            self.videos_succeeded += 1;
        }
        self.records_uploaded += outcome.records_uploaded;
        self.records_failed += outcome.records_failed;
        self.records_not_submitted += outcome.records_not_submitted;
        self.failed_batches.extend(outcome.failed_batches);
    }

    /// Write the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// The load pipeline.
pub struct Loader {
    settings: Settings,
    store: Arc<dyn VectorStore>,
    scanner: DatasetScanner,
    reader: SourceReader,
    joiner: RecordJoiner,
    uploader: BatchUploader,
    progress: Option<ProgressBar>,
}

impl Loader {
    /// Create a loader writing to the configured Qdrant instance.
    pub fn new(settings: Settings) -> Result<Self> {
        let store: Arc<dyn VectorStore> = Arc::new(QdrantStore::from_settings(&settings.store)?);
        Ok(Self::with_store(settings, store))
    }

    /// Create a loader with a custom store.
    pub fn with_store(settings: Settings, store: Arc<dyn VectorStore>) -> Self {
        let roots = DatasetRoots::from_settings(&settings);
        let scanner =
            DatasetScanner::new(roots.clone()).require_keyframes(settings.dataset.require_keyframes);
        let reader = SourceReader::new(
            roots.clone(),
            settings.store.vector_size,
            settings.read_timeout(),
        );
        let joiner = RecordJoiner::new(roots.keyframes_pattern.clone());
        let uploader = BatchUploader::new(
            store.clone(),
            settings.store.collection.clone(),
            settings.ingest.batch_size,
        )
        .with_retry_policy(RetryPolicy::from_settings(&settings.ingest))
        .with_call_timeout(Duration::from_secs(settings.store.timeout_secs));

        Self {
            settings,
            store,
            scanner,
            reader,
            joiner,
            uploader,
            progress: None,
        }
    }

    /// Report per-video progress on this bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Scan the dataset without loading anything.
    pub fn scan(&self) -> Result<DatasetManifest> {
        self.scanner.scan()
    }

    /// Run the load.
    ///
    /// Per-video faults are recorded in the report and the run goes on.
    /// Configuration faults found before loading starts are returned as is.
    /// A permanent store rejection stops the remaining videos and is returned
    /// as [`ClipframeError::RunAborted`] with the report of the work done.
    #[instrument(skip_all)]
    pub async fn run(&self, options: &LoadOptions, cancel: &CancellationToken) -> Result<RunReport> {
        let started = Instant::now();
        let mut report = RunReport {
            collection: self.settings.store.collection.clone(),
            ..Default::default()
        };

        let manifest = self.scanner.scan()?;
        report.videos_found = manifest.len();
        for (video_id, missing) in manifest.incomplete() {
            let missing: Vec<String> = missing.iter().map(|m| m.to_string()).collect();
            report.skip(video_id, format!("missing {}", missing.join(", ")));
        }

        let selected = self.select(&manifest, options, &mut report);
        info!(
            "Loading {} of {} videos into '{}'",
            selected.len(),
            manifest.len(),
            self.settings.store.collection
        );

        ensure_collection(
            self.store.as_ref(),
            &CollectionSpec::from_settings(&self.settings.store),
            self.settings.store.create_payload_indexes,
        )
        .await?;

        if let Some(pb) = &self.progress {
            pb.set_length(selected.len() as u64);
        }

        let workers = options
            .workers
            .unwrap_or(self.settings.ingest.workers)
            .max(1);
        // Cancelled by the caller or by an abort; `cancel` only by the caller.
        let stop = &cancel.child_token();
        let mut abort: Option<ClipframeError> = None;
        let mut results = futures::stream::iter(selected)
            .map(|video_id| async move {
                let result = self.load_video(&video_id, stop).await;
                (video_id, result)
            })
            .buffer_unordered(workers);

        while let Some((video_id, result)) = results.next().await {
            match result {
                Ok(Some(outcome)) => {
                    info!(
                        "{}: {} records uploaded, {} failed",
                        video_id, outcome.records_uploaded, outcome.records_failed
                    );
                    if outcome.records_not_submitted > 0 {
                        report.skip(
                            &video_id,
                            format!(
                                "stopped with {} records not submitted",
                                outcome.records_not_submitted
                            ),
                        );
                    }
                    report.record(outcome);
                }
                Ok(None) if abort.is_some() => report.skip(&video_id, "not started: run aborted"),
                Ok(None) => report.skip(&video_id, "cancelled before start"),
                Err(e) if e.is_video_scoped() => {
                    warn!("Skipping {}: {}", video_id, e);
                    report.videos_attempted += 1;
                    report.skip(&video_id, e.to_string());
                }
                Err(e) => {
                    error!("Stopping load after {} failed: {}", video_id, e);
                    report.videos_attempted += 1;
                    report.skip(&video_id, e.to_string());
                    stop.cancel();
                    if abort.is_none() {
                        abort = Some(e);
                    }
                }
            }

            if let Some(pb) = &self.progress {
                pb.set_message(video_id);
                pb.inc(1);
            }
        }

        report.cancelled = cancel.is_cancelled();
        report.elapsed_secs = started.elapsed().as_secs_f64();
        report.finished_at = Some(Utc::now());

        info!(
            "Load finished: {}/{} videos, {} records uploaded, {} failed in {:.1}s",
            report.videos_succeeded,
            report.videos_attempted,
            report.records_uploaded,
            report.records_failed,
            report.elapsed_secs
        );

        match abort {
            Some(error) => Err(ClipframeError::RunAborted {
                report: Box::new(report),
                error: Box::new(error),
            }),
            None => Ok(report),
        }
    }

    /// Complete videos the run will process, after `--video` and `--limit`.
    fn select(
        &self,
        manifest: &DatasetManifest,
        options: &LoadOptions,
        report: &mut RunReport,
    ) -> Vec<String> {
        for requested in &options.videos {
            if !manifest.entries.iter().any(|e| &e.video_id == requested) {
                warn!("Requested video {} not found in dataset", requested);
                report.skip(requested, "not found in dataset");
            }
        }

        manifest
            .complete()
            .map(|e| e.video_id.clone())
            .filter(|id| options.videos.is_empty() || options.videos.contains(id))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Read, join and upload one video. `None` if cancelled before it started.
    async fn load_video(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<VideoUploadOutcome>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let source = self.reader.read(video_id).await?;
        let records = self.joiner.join(&source)?;
        info!("Uploading {} records for {}", records.len(), video_id);

        self.uploader
            .upload(video_id, records, cancel)
            .await
            .map(Some)
    }
}
