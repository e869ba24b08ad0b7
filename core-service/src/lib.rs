//! Archive service façade and startup bootstrap.
//!
//! This crate wires host-provided bridge implementations (metadata client,
//! media fetcher, clock) together with the archive database into one
//! [`ArchiveService`]. It owns the sync orchestrator, the progress hub and the
//! auto-sync trigger, and exposes the control surface a host application
//! (HTTP layer, CLI, desktop shell) drives.
//!
//! ```rust,ignore
//! use core_service::{ArchiveDependencies, ArchiveService};
//!
//! let service = ArchiveService::new(config, ArchiveDependencies::new(client, fetcher)).await?;
//! service.bootstrap().await?;
//!
//! service.register_channel("UC123").await?;
//! let job_id = service.start_sync(None, TimeFilter::None, "UC123").await?;
//! ```

pub mod error;

pub use error::{Result, ServiceError};

use std::sync::Arc;

use bridge_traits::{
    media::MediaFetcher,
    metadata::MetadataClient,
    time::{Clock, SystemClock},
};
use chrono::{DateTime, Utc};
use core_library::{
    create_pool,
    models::{Channel, StorageStats},
    repositories::{
        ChannelRepository, ItemRepository, Page, PageRequest, SqliteChannelRepository,
        SqliteItemRepository,
    },
    DatabaseConfig,
};
use core_runtime::{
    config::ArchiveConfig,
    events::{ProgressHub, ProgressSnapshot, Subscription},
};
use core_sync::{
    AutoSyncSettings, AutoSyncTrigger, ErrorRecord, JobKind, JobLauncher, JobStore, QueueItem,
    SyncError, SyncHistory, SyncJob, SyncJobId, SyncOrchestrator, TimeFilter,
};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Aggregated handle to the bridge implementations the service requires.
#[derive(Clone)]
pub struct ArchiveDependencies {
    pub metadata: Arc<dyn MetadataClient>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub clock: Arc<dyn Clock>,
}

impl ArchiveDependencies {
    /// Construct a dependency bundle using the system clock.
    pub fn new(metadata: Arc<dyn MetadataClient>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            metadata,
            fetcher,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Dashboard view combining live progress with stored statistics
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOverview {
    pub status: ProgressSnapshot,
    pub last_sync: Option<SyncHistory>,
    pub next_auto_sync: Option<DateTime<Utc>>,
    pub queue_length: u64,
    pub error_count: u64,
    pub storage: StorageStats,
}

/// What [`ArchiveService::bootstrap`] found and re-armed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapReport {
    pub resumed_job: Option<SyncJobId>,
    pub next_auto_sync: Option<DateTime<Utc>>,
}

/// Primary façade exposed to host applications.
pub struct ArchiveService {
    config: ArchiveConfig,
    metadata: Arc<dyn MetadataClient>,
    orchestrator: Arc<SyncOrchestrator>,
    trigger: AutoSyncTrigger,
    store: Arc<dyn JobStore>,
    channels: Arc<dyn ChannelRepository>,
    items: Arc<dyn ItemRepository>,
    hub: ProgressHub,
}

impl ArchiveService {
    /// Open (and migrate) the archive database named by `config`, then wire
    /// the service.
    pub async fn new(config: ArchiveConfig, deps: ArchiveDependencies) -> Result<Self> {
        let pool = create_pool(DatabaseConfig::new(&config.database_path))
            .await
            .map_err(|e| ServiceError::InitializationFailed(e.to_string()))?;
        Self::with_pool(pool, config, deps)
    }

    /// Wire the service around an existing, migrated pool.
    pub fn with_pool(
        pool: SqlitePool,
        config: ArchiveConfig,
        deps: ArchiveDependencies,
    ) -> Result<Self> {
        config.validate()?;

        let hub = ProgressHub::new(config.hub_capacity);
        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                pool.clone(),
                Arc::clone(&deps.metadata),
                deps.fetcher,
                hub.clone(),
                &config,
            )
            .with_clock(Arc::clone(&deps.clock)),
        );
        let launcher: Arc<dyn JobLauncher> = orchestrator.clone();
        let trigger = AutoSyncTrigger::with_clock(launcher, deps.clock);

        Ok(Self {
            store: orchestrator.store(),
            channels: Arc::new(SqliteChannelRepository::new(pool.clone())),
            items: Arc::new(SqliteItemRepository::new(pool)),
            metadata: deps.metadata,
            orchestrator,
            trigger,
            hub,
            config,
        })
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Resume an interrupted job and re-arm auto-sync from stored settings.
    ///
    /// Call once per process start, before accepting control requests.
    pub async fn bootstrap(&self) -> Result<BootstrapReport> {
        let mut report = BootstrapReport::default();

        if let Some(job) = self.store.find_running_job().await? {
            info!(job_id = %job.id, processed = job.processed_items, "Found interrupted job");
            match self.orchestrator.resume(job.id).await {
                Ok(()) => report.resumed_job = Some(job.id),
                Err(e) => warn!(job_id = %job.id, error = %e, "Could not resume job"),
            }
        }

        let settings = match self.store.load_settings().await? {
            Some(settings) => settings,
            None => AutoSyncSettings::from_defaults(&self.config.auto_sync, self.default_kind()?),
        };

        match self.trigger.configure(settings) {
            Ok(()) => report.next_auto_sync = self.trigger.next_run_time(),
            Err(e) => warn!(error = %e, "Stored auto-sync settings ignored"),
        }

        Ok(report)
    }

    /// Fetch a channel's metadata and add it to the catalog.
    pub async fn register_channel(&self, channel_ref: &str) -> Result<Channel> {
        let info = self
            .metadata
            .fetch_channel(channel_ref)
            .await
            .map_err(SyncError::from)?;
        let channel = self.channels.upsert(&Channel::from_remote(&info)).await?;
        info!(channel = %channel.external_id, title = %channel.title, "Channel registered");
        Ok(channel)
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.channels.list().await?)
    }

    /// Start a job; `kind` falls back to the configured default.
    pub async fn start_sync(
        &self,
        kind: Option<JobKind>,
        time_filter: TimeFilter,
        channel_ref: &str,
    ) -> Result<SyncJobId> {
        let kind = match kind {
            Some(kind) => kind,
            None => self.default_kind()?,
        };
        Ok(self.orchestrator.start(kind, time_filter, channel_ref).await?)
    }

    /// Ask the running job to stop. `None` when nothing was running.
    pub async fn stop_sync(&self) -> Option<SyncJobId> {
        self.orchestrator.stop().await
    }

    pub fn status(&self) -> ProgressSnapshot {
        self.orchestrator.current_status()
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub async fn overview(&self) -> Result<ArchiveOverview> {
        Ok(ArchiveOverview {
            status: self.status(),
            last_sync: self.store.latest_history().await?,
            next_auto_sync: self.trigger.next_run_time(),
            queue_length: self.store.queued_count().await?,
            error_count: self.store.count_error_records().await?,
            storage: self.items.storage_stats().await?,
        })
    }

    pub async fn list_jobs(&self, limit: u32) -> Result<Vec<SyncJob>> {
        Ok(self.store.list_jobs(limit).await?)
    }

    /// Error log, newest first
    pub async fn list_errors(&self, page_request: PageRequest) -> Result<Page<ErrorRecord>> {
        Ok(self.store.list_error_records(page_request).await?)
    }

    /// Queue of `job_id`, or of the active (else most recent) job
    pub async fn list_queue(&self, job_id: Option<SyncJobId>) -> Result<Vec<QueueItem>> {
        let job_id = match job_id {
            Some(id) => Some(id),
            None => match self.orchestrator.active_job_id().await {
                Some(id) => Some(id),
                None => self.store.list_jobs(1).await?.first().map(|job| job.id),
            },
        };

        match job_id {
            Some(id) => Ok(self.store.list_queue_items(&id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Persist and apply a new auto-sync schedule.
    ///
    /// Returns the next run time, `None` when disabled.
    pub async fn configure_auto_sync(
        &self,
        settings: AutoSyncSettings,
    ) -> Result<Option<DateTime<Utc>>> {
        settings.validate()?;
        self.store.save_settings(&settings).await?;
        self.trigger.configure(settings)?;
        Ok(self.trigger.next_run_time())
    }

    pub fn auto_sync_settings(&self) -> AutoSyncSettings {
        self.trigger.settings()
    }

    pub fn next_auto_sync(&self) -> Option<DateTime<Utc>> {
        self.trigger.next_run_time()
    }

    /// Disarm auto-sync, stop the active job and wait for it to settle.
    pub async fn shutdown(&self) {
        self.trigger.shutdown();
        if self.orchestrator.stop().await.is_some() {
            self.orchestrator.wait_for_completion().await;
        }
        info!("Archive service shut down");
    }

    /// Wait for the active job, if any, to reach a terminal state.
    pub async fn wait_for_idle(&self) {
        self.orchestrator.wait_for_completion().await;
    }

    fn default_kind(&self) -> Result<JobKind> {
        Ok(self.config.default_job_kind.parse::<JobKind>()?)
    }
}
