//! # Download Coordinator
//!
//! Runs one media transfer and keeps its [`QueueItem`] and the progress hub
//! in step with it.
//!
//! ## Overview
//!
//! The media fetcher runs on its own tokio task and reports byte progress
//! through a [`ProgressSink`] backed by a bounded channel. The coordinator is
//! the only consumer of that channel, so every queue item update and every
//! `download_progress` event comes from a single place:
//!
//! ```text
//! fetch task ──TransferProgress──▶ mpsc ──▶ coordinator ──▶ JobStore
//!                                                     └──▶ ProgressHub
//! ```
//!
//! A failed attempt is reported back as [`DownloadResult::Failure`]. Whether
//! to try again is the caller's decision; the coordinator only tells it if
//! the item still has attempts left and how long to back off.

use crate::job::{ErrorCategory, ErrorRecord, SyncJobId};
use crate::queue::{QueueItem, QueueStatus, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_RETRIES};
use crate::repository::JobStore;
use crate::Result;
use bridge_traits::media::{MediaFetcher, ProgressSink, TransferProgress};
use core_runtime::config::ArchiveConfig;
use core_runtime::events::{ArchiveEvent, DownloadProgress, ProgressHub, TransferState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Retry and buffering limits for downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Attempts per item before it is marked failed
    pub retry_ceiling: u32,
    pub initial_backoff_ms: u64,
    /// Depth of the fetcher-to-coordinator progress channel
    pub progress_channel_capacity: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            retry_ceiling: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            progress_channel_capacity: 32,
        }
    }
}

impl From<&ArchiveConfig> for DownloadSettings {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            retry_ceiling: config.retry_ceiling,
            initial_backoff_ms: config.initial_backoff_ms,
            progress_channel_capacity: config.progress_channel_capacity.max(1),
        }
    }
}

/// Outcome of one download attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadResult {
    Success {
        local_path: PathBuf,
        thumbnail_path: Option<PathBuf>,
        byte_size: u64,
        quality_label: String,
    },
    Failure {
        message: String,
        /// The item has attempts left
        retryable: bool,
        /// Back-off before the next attempt
        retry_after: Duration,
    },
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadResult::Success { .. })
    }
}

/// Progress sink that hands events to the coordinator task
///
/// Uses `try_send`, so a fetcher never waits on the coordinator. Events that
/// arrive while the channel is full are dropped; a later one supersedes them.
struct ChannelSink {
    tx: mpsc::Sender<TransferProgress>,
}

impl ProgressSink for ChannelSink {
    fn report(&self, progress: TransferProgress) {
        let _ = self.tx.try_send(progress);
    }
}

/// Per-item download driver
pub struct DownloadCoordinator {
    fetcher: Arc<dyn MediaFetcher>,
    store: Arc<dyn JobStore>,
    hub: ProgressHub,
    settings: DownloadSettings,
}

impl DownloadCoordinator {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        store: Arc<dyn JobStore>,
        hub: ProgressHub,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            hub,
            settings,
        }
    }

    pub fn settings(&self) -> DownloadSettings {
        self.settings
    }

    /// Run one download attempt for an item
    ///
    /// # Errors
    ///
    /// Only store failures are returned as errors. Transfer failures come
    /// back as [`DownloadResult::Failure`].
    #[instrument(skip(self, title), fields(job_id = %job_id, item = %item_external_id))]
    pub async fn download(
        &self,
        job_id: SyncJobId,
        item_external_id: &str,
        title: Option<&str>,
    ) -> Result<DownloadResult> {
        let mut item = self.queue_item_for(job_id, item_external_id, title).await?;
        item.start_download();
        self.store.upsert_queue_item(&item).await?;
        self.publish(&item, TransferState::Downloading);

        let (tx, mut rx) = mpsc::channel(self.settings.progress_channel_capacity);
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelSink { tx });
        let fetcher = Arc::clone(&self.fetcher);
        let item_id = item_external_id.to_string();
        let mut handle = tokio::spawn(async move { fetcher.download(&item_id, sink).await });

        let joined = loop {
            let progress = tokio::select! {
                biased;
                Some(progress) = rx.recv() => progress,
                joined = &mut handle => break joined,
            };

            if let Err(e) = self.on_progress(&mut item, &progress).await {
                warn!(error = %e, "Progress could not be stored, stopping the transfer");
                handle.abort();
                let _ = handle.await;
                return Err(e);
            }
        };

        // Events reported right before the fetcher returned
        while let Ok(progress) = rx.try_recv() {
            self.on_progress(&mut item, &progress).await?;
        }

        let outcome = match joined {
            Ok(Ok(media)) => Ok(media),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) if e.is_panic() => Err(format!("Download task panicked: {}", e)),
            Err(e) => Err(format!("Download task aborted: {}", e)),
        };

        match outcome {
            Ok(media) => {
                item.progress = 1.0;
                self.publish(&item, TransferState::Processing);

                item.complete();
                self.store.upsert_queue_item(&item).await?;
                self.publish(&item, TransferState::Completed);

                debug!(bytes = media.byte_size, "Download completed");
                Ok(DownloadResult::Success {
                    quality_label: media.quality_label(),
                    local_path: media.local_path,
                    thumbnail_path: media.thumbnail_path,
                    byte_size: media.byte_size,
                })
            }
            Err(message) => self.on_failure(job_id, item, message).await,
        }
    }

    async fn queue_item_for(
        &self,
        job_id: SyncJobId,
        item_external_id: &str,
        title: Option<&str>,
    ) -> Result<QueueItem> {
        let existing = self.store.find_queue_item(&job_id, item_external_id).await?;

        // A queued record is mid-retry; anything else starts over
        let item = match existing {
            Some(item) if item.status == QueueStatus::Queued && item.retry_count > 0 => item,
            _ => QueueItem::new(job_id, item_external_id)
                .with_title(title.map(str::to_string))
                .with_max_retries(self.settings.retry_ceiling),
        };

        Ok(item)
    }

    async fn on_progress(&self, item: &mut QueueItem, progress: &TransferProgress) -> Result<()> {
        item.update_progress(progress);
        self.store.upsert_queue_item(item).await?;
        self.publish(item, TransferState::Downloading);
        Ok(())
    }

    async fn on_failure(
        &self,
        job_id: SyncJobId,
        mut item: QueueItem,
        message: String,
    ) -> Result<DownloadResult> {
        let retryable = item.fail(message.clone());
        self.store.upsert_queue_item(&item).await?;

        if retryable {
            debug!(attempt = item.retry_count, error = %message, "Download attempt failed");
            self.publish(&item, TransferState::Queued);
        } else {
            warn!(attempts = item.retry_count, error = %message, "Download failed permanently");
            let record = ErrorRecord::new(
                job_id,
                Some(item.item_external_id.as_str()),
                ErrorCategory::Download,
                format!("Giving up after {} attempts: {}", item.retry_count, message),
            );
            self.store.append_error_record(&record).await?;
            self.publish(&item, TransferState::Failed);
        }

        Ok(DownloadResult::Failure {
            message,
            retryable,
            retry_after: item.next_retry_delay(self.settings.initial_backoff_ms),
        })
    }

    fn publish(&self, item: &QueueItem, status: TransferState) {
        self.hub
            .publish(ArchiveEvent::DownloadProgress(DownloadProgress {
                job_id: item.job_id.to_string(),
                item_id: item.item_external_id.clone(),
                title: item.title.clone(),
                progress: item.progress * 100.0,
                rate: item.rate_label.clone(),
                eta: item.eta_label.clone(),
                status,
            }));
    }
}
