//! Batch uploader: pushes one video's records to the vector store.
//!
//! Records are accumulated into batches of at most `batch_size` and each
//! batch is submitted in a single upsert. A transient failure retries the
//! whole batch with exponential backoff. When the attempts run out the batch
//! is recorded as failed and the next batch goes ahead. A permanent failure
//! is returned to the caller and ends the run.

use crate::config::IngestSettings;
use crate::error::{ClipframeError, Result};
use crate::joiner::KeyframeRecord;
use crate::vector_store::VectorStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Exponential backoff for batch retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per batch, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    pub max_backoff: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &IngestSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            ..Default::default()
        }
    }

    /// Delay after `current`, clamped to `max_backoff`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_backoff)
    }
}

/// A batch that could not be delivered.
#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch {
    pub video_id: String,
    /// 1-based position of the batch within its video.
    pub batch: usize,
    pub records: usize,
    pub error: String,
}

/// What happened to one video's records.
#[derive(Debug, Clone, Default)]
pub struct VideoUploadOutcome {
    pub records_uploaded: usize,
    pub records_failed: usize,
    /// Batches submitted (successful or not).
    pub batches: usize,
    pub failed_batches: Vec<FailedBatch>,
    /// Records left unsent because the upload was cancelled.
    pub records_not_submitted: usize,
    /// Cancellation stopped the upload before the last batch.
    pub cancelled: bool,
}

impl VideoUploadOutcome {
    /// Every record of the video reached the store.
    pub fn is_complete(&self) -> bool {
        self.records_failed == 0 && self.records_not_submitted == 0 && !self.cancelled
    }
}

/// Delivers record streams to a [`VectorStore`] in bounded batches.
pub struct BatchUploader {
    store: Arc<dyn VectorStore>,
    collection: String,
    batch_size: usize,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl BatchUploader {
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>, batch_size: usize) -> Self {
        Self {
            store,
            collection: collection.into(),
            batch_size: batch_size.max(1),
            policy: RetryPolicy::default(),
            call_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Time limit for a single upsert call; exceeding it counts as a transient failure.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Upload the records of one video, in order.
    ///
    /// Cancellation is checked before each batch; a batch already being
    /// retried stops at its next backoff and is reported as failed.
    #[instrument(skip(self, records, cancel))]
    pub async fn upload<I>(
        &self,
        video_id: &str,
        records: I,
        cancel: &CancellationToken,
    ) -> Result<VideoUploadOutcome>
    where
        I: IntoIterator<Item = KeyframeRecord>,
    {
        let mut outcome = VideoUploadOutcome::default();
        let mut records = records.into_iter();
        let mut batch: Vec<KeyframeRecord> = Vec::with_capacity(self.batch_size);

        loop {
            batch.clear();
            batch.extend(records.by_ref().take(self.batch_size));
            if batch.is_empty() {
                break;
            }
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                outcome.records_not_submitted = batch.len() + records.count();
                debug!(
                    "Cancelled {} with {} records not submitted",
                    video_id, outcome.records_not_submitted
                );
                break;
            }

            outcome.batches += 1;
            match self.submit(&batch, cancel).await {
                Ok(()) => {
                    debug!("Uploaded batch {} ({} records)", outcome.batches, batch.len());
                    outcome.records_uploaded += batch.len();
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "Giving up on batch {} of {} ({} records): {}",
                        outcome.batches,
                        video_id,
                        batch.len(),
                        e
                    );
                    outcome.records_failed += batch.len();
                    outcome.failed_batches.push(FailedBatch {
                        video_id: video_id.to_string(),
                        batch: outcome.batches,
                        records: batch.len(),
                        error: e.to_string(),
                    });
                    outcome.cancelled |= cancel.is_cancelled();
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outcome)
    }

    /// Submit one batch, retrying transient failures.
    async fn submit(&self, batch: &[KeyframeRecord], cancel: &CancellationToken) -> Result<()> {
        let mut delay = self.policy.initial_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let result =
                match tokio::time::timeout(self.call_timeout, self.store.upsert(&self.collection, batch))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ClipframeError::Transient(format!(
                        "upsert timed out after {:?}",
                        self.call_timeout
                    ))),
                };

            let err = match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => e,
                Err(e) => return Err(e),
            };

            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Batch upload failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(err),
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.policy.next_delay(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::test_support::record;
    use crate::vector_store::{CollectionInfo, CollectionSpec, PayloadSchema, ScoredPoint, SearchRequest};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Ok,
        Transient,
        Permanent,
        Hang,
    }

    /// Store that answers upserts from a script and records every call.
    #[derive(Default)]
    struct ScriptedStore {
        script: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedStore {
        fn with_script(replies: &[Reply]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(replies.iter().copied().collect()),
                calls: Mutex::default(),
            })
        }

        fn call_sizes(&self) -> Vec<usize> {
            self.calls.lock().unwrap().iter().map(|c| c.len()).collect()
        }
    }

    #[async_trait]
    impl VectorStore for ScriptedStore {
        async fn collection_info(&self, _name: &str) -> Result<Option<CollectionInfo>> {
            Ok(None)
        }

        async fn create_collection(&self, _spec: &CollectionSpec) -> Result<()> {
            Ok(())
        }

        async fn create_payload_index(
            &self,
            _collection: &str,
            _field: &str,
            _schema: PayloadSchema,
        ) -> Result<()> {
            Ok(())
        }

        async fn upsert(&self, _collection: &str, records: &[KeyframeRecord]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(records.iter().map(|r| r.id.clone()).collect());
            let reply = self.script.lock().unwrap().pop_front().unwrap_or(Reply::Ok);
            match reply {
                Reply::Ok => Ok(()),
                Reply::Transient => Err(ClipframeError::Transient("503".to_string())),
                Reply::Permanent => Err(ClipframeError::Permanent("400 wrong size".to_string())),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            }
        }

        async fn search(
            &self,
            _collection: &str,
            _request: &SearchRequest,
        ) -> Result<Vec<ScoredPoint>> {
            Ok(Vec::new())
        }

        async fn health(&self) -> Result<()> {
            Ok(())
        }
    }

    fn records(count: usize) -> Vec<KeyframeRecord> {
        (1..=count)
            .map(|i| record("L21_V001", i, vec![0.0; 2], &[]))
            .collect()
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    /// Backoff long enough that only cancellation ends it.
    fn slow_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_next_delay_doubles_and_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next_delay(Duration::from_secs(20)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_ordered() {
        let store = ScriptedStore::with_script(&[]);
        let uploader = BatchUploader::new(store.clone(), "frames", 1000);

        let outcome = tokio_test::assert_ok!(
            uploader
                .upload("L21_V001", records(2550), &CancellationToken::new())
                .await
        );

        assert_eq!(store.call_sizes(), vec![1000, 1000, 550]);
        let calls = store.calls.lock().unwrap();
        assert_eq!(calls[0][0], "L21_V001_001");
        assert_eq!(calls[1][0], "L21_V001_1001");
        assert_eq!(calls[2][549], "L21_V001_2550");
        assert_eq!(outcome.records_uploaded, 2550);
        assert_eq!(outcome.batches, 3);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = ScriptedStore::with_script(&[Reply::Transient, Reply::Transient, Reply::Ok]);
        let uploader =
            BatchUploader::new(store.clone(), "frames", 1000).with_retry_policy(fast_policy(5));

        let outcome = tokio_test::assert_ok!(
            uploader
                .upload("L21_V001", records(10), &CancellationToken::new())
                .await
        );

        assert_eq!(store.call_sizes(), vec![10, 10, 10]);
        assert_eq!(outcome.records_failed, 0);
        assert_eq!(outcome.records_uploaded, 10);
    }

    #[tokio::test]
    async fn test_exhausted_batch_is_counted_and_run_continues() {
        let store = ScriptedStore::with_script(&[Reply::Transient, Reply::Transient]);
        let uploader =
            BatchUploader::new(store.clone(), "frames", 4).with_retry_policy(fast_policy(2));

        let outcome = uploader
            .upload("L21_V001", records(6), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.call_sizes(), vec![4, 4, 2]);
        assert_eq!(outcome.records_failed, 4);
        assert_eq!(outcome.records_uploaded, 2);
        assert_eq!(outcome.failed_batches.len(), 1);
        assert_eq!(outcome.failed_batches[0].batch, 1);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_permanent_failure_aborts() {
        let store = ScriptedStore::with_script(&[Reply::Ok, Reply::Permanent]);
        let uploader = BatchUploader::new(store.clone(), "frames", 2).with_retry_policy(fast_policy(5));

        let err = tokio_test::assert_err!(
            uploader
                .upload("L21_V001", records(6), &CancellationToken::new())
                .await
        );

        assert!(matches!(err, ClipframeError::Permanent(_)));
        assert_eq!(store.call_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_timed_out_call_is_retried_as_transient() {
        let store = ScriptedStore::with_script(&[Reply::Hang, Reply::Ok]);
        let uploader = BatchUploader::new(store.clone(), "frames", 10)
            .with_retry_policy(fast_policy(3))
            .with_call_timeout(Duration::from_millis(20));

        let outcome = uploader
            .upload("L21_V001", records(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.call_sizes().len(), 2);
        assert_eq!(outcome.records_uploaded, 3);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_new_batches() {
        let store = ScriptedStore::with_script(&[]);
        let uploader = BatchUploader::new(store.clone(), "frames", 2);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = uploader.upload("L21_V001", records(5), &cancel).await.unwrap();

        assert!(store.call_sizes().is_empty());
        assert!(outcome.cancelled);
        assert_eq!(outcome.records_uploaded, 0);
        assert_eq!(outcome.records_failed, 0);
        assert_eq!(outcome.records_not_submitted, 5);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_fails_batch_without_retry() {
        let store = ScriptedStore::with_script(&[Reply::Transient; 3]);
        let uploader =
            BatchUploader::new(store.clone(), "frames", 4).with_retry_policy(slow_policy(5));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            uploader.upload("L21_V001", records(6), &cancel),
        )
        .await
        .expect("cancel should interrupt the backoff")
        .unwrap();

        assert_eq!(store.call_sizes(), vec![4]);
        assert!(outcome.cancelled);
        assert_eq!(outcome.failed_batches.len(), 1);
        assert_eq!(outcome.failed_batches[0].batch, 1);
        assert_eq!(outcome.records_failed, 4);
        assert_eq!(outcome.records_not_submitted, 2);
        assert_eq!(outcome.records_uploaded, 0);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_of_last_batch_marks_outcome_cancelled() {
        let store = ScriptedStore::with_script(&[Reply::Transient]);
        let uploader =
            BatchUploader::new(store.clone(), "frames", 10).with_retry_policy(slow_policy(3));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = uploader.upload("L21_V001", records(3), &cancel).await.unwrap();

        assert_eq!(store.call_sizes(), vec![3]);
        assert!(outcome.cancelled);
        assert_eq!(outcome.records_failed, 3);
        assert_eq!(outcome.records_not_submitted, 0);
    }
}
