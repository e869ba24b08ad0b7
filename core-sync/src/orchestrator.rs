//! # Sync Orchestrator
//!
//! Runs channel archive jobs, one at a time.
//!
//! ## Overview
//!
//! The `SyncOrchestrator` owns the single active-job slot. Starting a job
//! persists it as `running`, then spawns one task that walks the phases:
//!
//! 1. Refresh channel statistics (best effort)
//! 2. Enumerate candidate items, page by page
//! 3. For each candidate: fetch details, upsert the catalog item, download
//!    media, sync comments
//! 4. Finalize: persist the terminal status and run history, notify observers
//!
//! A failure inside one item is written to the error log and the loop moves
//! on. Authorization or configuration failures from the remote platform, and
//! storage failures, abort the run and mark it `failed`.
//!
//! ## Cancellation
//!
//! [`stop`](SyncOrchestrator::stop) trips a `CancellationToken` that is polled
//! between phases and before every item. A download that is already running
//! is allowed to finish; no new item starts afterwards.
//!
//! ## Resume
//!
//! A job found `running` at startup is handed to
//! [`resume`](SyncOrchestrator::resume). It re-enumerates the channel but
//! skips every item already recorded as processed under that job, whatever
//! its outcome and wherever it now sits in the listing. Counters continue
//! from their persisted values.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{JobKind, SyncOrchestrator, TimeFilter};
//!
//! let orchestrator = SyncOrchestrator::new(pool, metadata, fetcher, hub, &config);
//!
//! let job_id = orchestrator.start(JobKind::Full, TimeFilter::None, "UC123").await?;
//! println!("{:?}", orchestrator.current_status());
//!
//! orchestrator.stop().await;
//! orchestrator.wait_for_completion().await;
//! ```

use crate::comments::CommentSync;
use crate::download::{DownloadCoordinator, DownloadResult, DownloadSettings};
use crate::job::{
    ErrorCategory, ErrorRecord, JobKind, SyncHistory, SyncJob, SyncJobId, SyncStatus, TimeFilter,
};
use crate::repository::{JobStore, SqliteJobStore};
use crate::{Result, SyncError};
use bridge_traits::media::MediaFetcher;
use bridge_traits::metadata::{ItemSummary, MetadataClient};
use bridge_traits::time::{Clock, SystemClock};
use core_library::models::{Channel, Item};
use core_library::repositories::{
    ChannelRepository, ItemRepository, SqliteChannelRepository, SqliteCommentRepository,
    SqliteItemRepository,
};
use core_runtime::config::ArchiveConfig;
use core_runtime::events::{
    ArchiveEvent, ProgressHub, ProgressSnapshot, SyncPhase, SyncProgress,
};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Tracking for the job currently owning the slot
struct ActiveJob {
    job_id: SyncJobId,
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Bytes and comments written, per item or summed over a run
#[derive(Debug, Default)]
struct ItemStats {
    bytes_stored: u64,
    comments_synced: u64,
}

/// Why an item did not finish
enum ItemFailure {
    /// Already written to the error log
    Logged,
    /// Still needs an error log entry, categorised by the step that raised it
    Step {
        step: ErrorCategory,
        error: SyncError,
    },
}

fn at_step<E: Into<SyncError>>(step: ErrorCategory) -> impl FnOnce(E) -> ItemFailure {
    move |error| ItemFailure::Step {
        step,
        error: error.into(),
    }
}

/// Single-flight sync job runner
pub struct SyncOrchestrator {
    store: Arc<dyn JobStore>,
    metadata: Arc<dyn MetadataClient>,
    channels: Arc<dyn ChannelRepository>,
    items: Arc<dyn ItemRepository>,
    comments: Arc<CommentSync>,
    downloads: Arc<DownloadCoordinator>,
    hub: ProgressHub,
    clock: Arc<dyn Clock>,
    sync_comments: bool,
    active: Arc<Mutex<Option<ActiveJob>>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator backed by the archive database
    ///
    /// # Arguments
    ///
    /// * `pool` - Migrated archive database pool
    /// * `metadata` - Remote catalog client
    /// * `fetcher` - Media downloader
    /// * `hub` - Progress hub shared with observers
    /// * `config` - Retry, buffering and comment settings
    pub fn new(
        pool: SqlitePool,
        metadata: Arc<dyn MetadataClient>,
        fetcher: Arc<dyn MediaFetcher>,
        hub: ProgressHub,
        config: &ArchiveConfig,
    ) -> Self {
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(pool.clone()));
        let comments = CommentSync::new(
            Arc::clone(&metadata),
            Arc::new(SqliteCommentRepository::new(pool.clone())),
        );
        let downloads = DownloadCoordinator::new(
            fetcher,
            Arc::clone(&store),
            hub.clone(),
            DownloadSettings::from(config),
        );

        Self {
            store,
            metadata,
            channels: Arc::new(SqliteChannelRepository::new(pool.clone())),
            items: Arc::new(SqliteItemRepository::new(pool)),
            comments: Arc::new(comments),
            downloads: Arc::new(downloads),
            hub,
            clock: Arc::new(SystemClock),
            sync_comments: config.sync_comments,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the time source used for time-window filters
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    /// Start a new job for a registered channel
    ///
    /// Returns as soon as the job is persisted; the phases run on a
    /// background task.
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`] if a job is active
    /// - [`SyncError::NotFound`] if the channel is not in the catalog
    #[instrument(skip(self), fields(kind = %kind, time_filter = %time_filter))]
    pub async fn start(
        &self,
        kind: JobKind,
        time_filter: TimeFilter,
        channel_ref: &str,
    ) -> Result<SyncJobId> {
        let mut slot = self.active.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(SyncError::AlreadyRunning {
                job_id: active.job_id.to_string(),
            });
        }

        let channel = self
            .channels
            .find_by_external_id(channel_ref)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity: "Channel".to_string(),
                id: channel_ref.to_string(),
            })?;

        let job = SyncJob::new(kind, time_filter, channel_ref).start()?;
        self.store.create_job(&job).await?;

        info!(job_id = %job.id, channel = %channel_ref, "Starting {} sync", kind);
        Ok(self.launch(&mut slot, job, channel.id, false))
    }

    /// Continue a job left `running` by a previous process
    ///
    /// # Errors
    ///
    /// - [`SyncError::AlreadyRunning`] if another job is active
    /// - [`SyncError::JobNotFound`] if the job does not exist
    /// - [`SyncError::InvalidStateTransition`] if the job is not `running`
    /// - [`SyncError::NotFound`] if its channel has left the catalog; the job
    ///   is marked `failed`
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn resume(&self, job_id: SyncJobId) -> Result<()> {
        let mut slot = self.active.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(SyncError::AlreadyRunning {
                job_id: active.job_id.to_string(),
            });
        }

        let job = self
            .store
            .find_job(&job_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })?;

        if job.status != SyncStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: job.status.as_str().to_string(),
                to: "resume".to_string(),
                reason: "Only running jobs can be resumed".to_string(),
            });
        }

        let channel = match self.channels.find_by_external_id(&job.channel_ref).await? {
            Some(channel) => channel,
            None => {
                let error = SyncError::NotFound {
                    entity: "Channel".to_string(),
                    id: job.channel_ref.clone(),
                };
                let failed = job.fail(error.to_string())?;
                self.store.update_job_status(&failed).await?;
                return Err(error);
            }
        };

        info!(
            processed = job.processed_items,
            marker = ?job.resume_marker,
            "Resuming sync"
        );
        self.launch(&mut slot, job, channel.id, true);
        Ok(())
    }

    /// Request cooperative cancellation of the active job
    ///
    /// Returns the id of the job that was asked to stop, or `None` when
    /// nothing is running.
    pub async fn stop(&self) -> Option<SyncJobId> {
        let slot = self.active.lock().await;
        let active = slot.as_ref()?;
        active.cancellation_token.cancel();
        info!(job_id = %active.job_id, "Cancellation requested");
        Some(active.job_id)
    }

    /// Current progress projection; never touches storage
    pub fn current_status(&self) -> ProgressSnapshot {
        self.hub.snapshot()
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn active_job_id(&self) -> Option<SyncJobId> {
        self.active.lock().await.as_ref().map(|active| active.job_id)
    }

    /// Wait for the active job's task to finish
    pub async fn wait_for_completion(&self) {
        let handle = {
            let mut slot = self.active.lock().await;
            slot.as_mut().and_then(|active| active.handle.take())
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Sync task ended abnormally");
            }
        }
    }

    /// Clone for background task (avoids Arc<Arc<...>>)
    fn clone_for_task(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            metadata: Arc::clone(&self.metadata),
            channels: Arc::clone(&self.channels),
            items: Arc::clone(&self.items),
            comments: Arc::clone(&self.comments),
            downloads: Arc::clone(&self.downloads),
            hub: self.hub.clone(),
            clock: Arc::clone(&self.clock),
            sync_comments: self.sync_comments,
            active: Arc::clone(&self.active),
        }
    }

    fn launch(
        &self,
        slot: &mut Option<ActiveJob>,
        job: SyncJob,
        channel_id: String,
        resumed: bool,
    ) -> SyncJobId {
        let job_id = job.id;
        let cancellation_token = CancellationToken::new();

        let mut snapshot = ProgressSnapshot::started(job_id.to_string(), job.kind.as_str());
        snapshot.total_items = job.total_items;
        snapshot.processed_items = job.processed_items;
        snapshot.failed_items = job.failed_items;
        snapshot.percent_complete = job.percent_complete();
        self.hub.update_snapshot(|current| *current = snapshot);

        let orchestrator = self.clone_for_task();
        let token = cancellation_token.clone();
        let handle = tokio::spawn(async move {
            orchestrator.run_job(job, channel_id, resumed, token).await;
        });

        *slot = Some(ActiveJob {
            job_id,
            cancellation_token,
            handle: Some(handle),
        });

        job_id
    }

    // ========================================================================
    // Phase Sequence
    // ========================================================================

    #[instrument(skip_all, fields(job_id = %job.id, kind = %job.kind))]
    async fn run_job(
        &self,
        mut job: SyncJob,
        channel_id: String,
        resumed: bool,
        token: CancellationToken,
    ) {
        let job_id = job.id;
        let started = Instant::now();
        let mut totals = ItemStats::default();

        let result = self
            .execute(&mut job, &channel_id, resumed, &token, &mut totals)
            .await;

        let event = match result {
            Ok(()) => match self.finalize(job, token.is_cancelled(), started, totals).await {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "Could not persist the end of the sync job");
                    ArchiveEvent::SyncError {
                        job_id: job_id.to_string(),
                        error: e.to_string(),
                    }
                }
            },
            Err(e) => self.fail_job(job, e).await,
        };

        self.release(job_id, event).await;
    }

    /// Free the slot, then publish the terminal event before unlocking
    ///
    /// Observers only see the event once `start` would accept a new job.
    async fn release(&self, job_id: SyncJobId, event: ArchiveEvent) {
        let mut slot = self.active.lock().await;
        if slot.as_ref().map(|active| active.job_id) == Some(job_id) {
            *slot = None;
        }
        self.hub.publish(event);
    }

    async fn execute(
        &self,
        job: &mut SyncJob,
        channel_id: &str,
        resumed: bool,
        token: &CancellationToken,
        totals: &mut ItemStats,
    ) -> Result<()> {
        self.refresh_channel(job).await?;
        if token.is_cancelled() {
            return Ok(());
        }

        let candidates = match self.enumerate(job, channel_id, resumed, token).await? {
            Some(candidates) => candidates,
            None => return Ok(()),
        };

        job.set_total(candidates.len() as u64)?;
        self.store.update_job_counters(job).await?;
        info!(candidates = candidates.len(), "Enumeration finished");

        for summary in &candidates {
            if token.is_cancelled() {
                info!(processed = job.processed_items, "Stopping before next item");
                break;
            }

            self.publish_progress(job, SyncPhase::Items, Some(summary.title.clone()));

            let failed = match self.process_item(job, channel_id, summary).await {
                Ok(stats) => {
                    totals.bytes_stored += stats.bytes_stored;
                    totals.comments_synced += stats.comments_synced;
                    false
                }
                Err(ItemFailure::Logged) => true,
                Err(ItemFailure::Step { step, error }) => {
                    if error.is_fatal() {
                        return Err(error);
                    }
                    warn!(item = %summary.external_id, error = %error, "Item failed");
                    let record = ErrorRecord::new(
                        job.id,
                        Some(summary.external_id.as_str()),
                        ErrorCategory::for_step(step, &error),
                        error.to_string(),
                    );
                    self.store.append_error_record(&record).await?;
                    true
                }
            };

            job.record_item(&summary.external_id, failed)?;
            self.store
                .record_item_outcome(job, &summary.external_id, failed)
                .await?;
        }

        self.publish_progress(job, SyncPhase::Finalize, None);
        Ok(())
    }

    /// Phase 1: refresh channel statistics
    async fn refresh_channel(&self, job: &SyncJob) -> Result<()> {
        self.publish_progress(job, SyncPhase::RefreshChannel, None);

        let refreshed = match self.metadata.fetch_channel(&job.channel_ref).await {
            Ok(info) => self
                .channels
                .upsert(&Channel::from_remote(&info))
                .await
                .map(|_| ())
                .map_err(SyncError::from),
            Err(e) => Err(SyncError::from(e)),
        };

        if let Err(e) = refreshed {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(error = %e, "Channel refresh failed, continuing");
            let record = ErrorRecord::new(
                job.id,
                None,
                ErrorCategory::for_step(ErrorCategory::Metadata, &e),
                format!("Channel refresh failed: {}", e),
            );
            self.store.append_error_record(&record).await?;
        }

        Ok(())
    }

    /// Phase 2: list candidates; `None` when cancelled mid-way
    async fn enumerate(
        &self,
        job: &SyncJob,
        channel_id: &str,
        resumed: bool,
        token: &CancellationToken,
    ) -> Result<Option<Vec<ItemSummary>>> {
        self.publish_progress(job, SyncPhase::Enumerate, None);

        let published_after = job.time_filter.published_after(self.clock.now());
        let mut listed: Vec<ItemSummary> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            if token.is_cancelled() {
                return Ok(None);
            }

            let page = self
                .metadata
                .list_items(&job.channel_ref, published_after, page_token.as_deref())
                .await?;
            debug!(count = page.items.len(), "Listed item page");

            listed.extend(
                page.items
                    .into_iter()
                    .filter(|item| seen.insert(item.external_id.clone())),
            );

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        if job.kind.skips_downloaded() {
            let downloaded = self.items.downloaded_external_ids(channel_id).await?;
            listed.retain(|item| !downloaded.contains(&item.external_id));
        }

        if resumed {
            let processed = self.store.processed_items_for_job(&job.id).await?;
            listed.retain(|item| !processed.contains(&item.external_id));
        }

        Ok(Some(listed))
    }

    /// Phase 3 body for one candidate
    #[instrument(skip_all, fields(item = %summary.external_id))]
    async fn process_item(
        &self,
        job: &SyncJob,
        channel_id: &str,
        summary: &ItemSummary,
    ) -> std::result::Result<ItemStats, ItemFailure> {
        let mut stats = ItemStats::default();

        let details = self
            .metadata
            .fetch_item_details(std::slice::from_ref(&summary.external_id))
            .await
            .map_err(at_step(ErrorCategory::Metadata))?
            .into_iter()
            .find(|details| details.external_id == summary.external_id);

        let details = match details {
            Some(details) => details,
            None => {
                self.items
                    .mark_unavailable(&summary.external_id)
                    .await
                    .map_err(at_step(ErrorCategory::Metadata))?;
                return Err(ItemFailure::Step {
                    step: ErrorCategory::NotFound,
                    error: SyncError::NotFound {
                        entity: "Item".to_string(),
                        id: summary.external_id.clone(),
                    },
                });
            }
        };

        let item = self
            .items
            .upsert_metadata(&Item::from_details(channel_id, &details))
            .await
            .map_err(at_step(ErrorCategory::Metadata))?;

        if job.kind.downloads_media() && !item.is_downloaded {
            stats.bytes_stored = self.download_with_retry(job, &item).await?;
        }

        let wants_comments = match job.kind {
            JobKind::CommentsOnly => true,
            kind => kind.syncs_comments() && self.sync_comments,
        };
        if wants_comments {
            stats.comments_synced = self
                .comments
                .sync_item(&item.id, &item.external_id)
                .await
                .map_err(at_step(ErrorCategory::Comments))?;
        }

        Ok(stats)
    }

    /// Drive the download coordinator until success or the retry ceiling
    async fn download_with_retry(
        &self,
        job: &SyncJob,
        item: &Item,
    ) -> std::result::Result<u64, ItemFailure> {
        loop {
            let result = self
                .downloads
                .download(job.id, &item.external_id, Some(item.title.as_str()))
                .await
                .map_err(at_step(ErrorCategory::Download))?;

            match result {
                DownloadResult::Success {
                    local_path,
                    thumbnail_path,
                    byte_size,
                    quality_label,
                } => {
                    let thumbnail = thumbnail_path.map(|p| p.to_string_lossy().into_owned());
                    self.items
                        .mark_downloaded(
                            &item.external_id,
                            &local_path.to_string_lossy(),
                            thumbnail.as_deref(),
                            byte_size as i64,
                            &quality_label,
                        )
                        .await
                        .map_err(at_step(ErrorCategory::Download))?;
                    return Ok(byte_size);
                }
                DownloadResult::Failure {
                    message,
                    retryable: true,
                    retry_after,
                } => {
                    let record = ErrorRecord::new(
                        job.id,
                        Some(item.external_id.as_str()),
                        ErrorCategory::Download,
                        format!("Download attempt failed: {}", message),
                    );
                    self.store
                        .append_error_record(&record)
                        .await
                        .map_err(at_step(ErrorCategory::Download))?;
                    tokio::time::sleep(retry_after).await;
                }
                DownloadResult::Failure { .. } => return Err(ItemFailure::Logged),
            }
        }
    }

    // ========================================================================
    // Terminal States
    // ========================================================================

    async fn finalize(
        &self,
        job: SyncJob,
        cancelled: bool,
        started: Instant,
        totals: ItemStats,
    ) -> Result<ArchiveEvent> {
        let job = if cancelled { job.cancel()? } else { job.complete()? };
        self.store.update_job_status(&job).await?;

        let duration_secs = started.elapsed().as_secs();
        let history = SyncHistory {
            job_id: job.id,
            items_synced: job.processed_items,
            comments_synced: totals.comments_synced,
            bytes_stored: totals.bytes_stored,
            duration_secs,
            completed_at: job.completed_at.unwrap_or_else(|| self.clock.unix_timestamp()),
        };
        self.store.record_history(&history).await?;

        let event = if cancelled {
            info!(processed = job.processed_items, "Sync cancelled");
            ArchiveEvent::SyncCancelled {
                job_id: job.id.to_string(),
            }
        } else {
            info!(
                processed = job.processed_items,
                failed = job.failed_items,
                duration_secs,
                "Sync completed"
            );
            ArchiveEvent::SyncCompleted {
                job_id: job.id.to_string(),
                total_synced: job.processed_items,
                failed: job.failed_items,
                duration_secs,
            }
        };

        Ok(event)
    }

    /// Record the cause and persist `failed`; storage errors here are only logged
    async fn fail_job(&self, job: SyncJob, cause: SyncError) -> ArchiveEvent {
        error!(error = %cause, "Sync failed");
        let message = cause.to_string();

        let record = ErrorRecord::new(job.id, None, ErrorCategory::Orchestration, message.clone());
        if let Err(e) = self.store.append_error_record(&record).await {
            error!(error = %e, "Could not log the sync failure");
        }

        let job_id = job.id;
        let persisted = match job.fail(message.clone()) {
            Ok(failed) => self.store.update_job_status(&failed).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            error!(error = %e, "Could not persist the failed status");
        }

        ArchiveEvent::SyncError {
            job_id: job_id.to_string(),
            error: message,
        }
    }

    fn publish_progress(&self, job: &SyncJob, phase: SyncPhase, current_item: Option<String>) {
        self.hub.publish(ArchiveEvent::SyncProgress(SyncProgress {
            job_id: job.id.to_string(),
            phase,
            total: job.total_items,
            processed: job.processed_items,
            failed: job.failed_items,
            current_item,
            percent_complete: job.percent_complete(),
        }));
    }
}
