//! Integration tests for the archive service façade
//!
//! These tests cover the control surface end to end:
//! - Channel registration and default job kind
//! - Overview, error log and queue listings after a run
//! - Auto-sync configuration persistence
//! - Startup bootstrap resuming an interrupted job

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::media::{MediaDownload, MediaFetcher, ProgressSink, TransferProgress};
use bridge_traits::metadata::{
    ChannelInfo, CommentPage, ItemDetails, ItemPage, ItemSummary, MetadataClient,
};
use bridge_traits::time::FixedClock;
use chrono::{NaiveTime, TimeZone, Utc};
use core_library::create_test_pool;
use core_library::repositories::PageRequest;
use core_runtime::config::ArchiveConfig;
use core_service::{ArchiveDependencies, ArchiveService, ServiceError};
use core_sync::{
    AutoSyncSettings, JobKind, JobStore, QueueStatus, SqliteJobStore, SyncError, SyncJob,
    SyncStatus, TimeFilter,
};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Mock Implementations
// ============================================================================

/// Single-page catalog; item `broken` never downloads
struct MockPlatform {
    items: Vec<&'static str>,
}

#[async_trait]
impl MetadataClient for MockPlatform {
    async fn fetch_channel(&self, channel_ref: &str) -> BridgeResult<ChannelInfo> {
        if channel_ref != "UC123" {
            return Err(BridgeError::NotFound(channel_ref.to_string()));
        }
        Ok(ChannelInfo {
            external_id: channel_ref.to_string(),
            title: "Archive".to_string(),
            description: Some("Everything, forever".to_string()),
            custom_url: Some("@archive".to_string()),
            subscriber_count: Some(42),
            item_count: Some(self.items.len() as i64),
            view_count: Some(1000),
            avatar_url: None,
            banner_url: None,
        })
    }

    async fn list_items(
        &self,
        _channel_ref: &str,
        _published_after: Option<chrono::DateTime<Utc>>,
        _page_token: Option<&str>,
    ) -> BridgeResult<ItemPage> {
        Ok(ItemPage {
            items: self
                .items
                .iter()
                .map(|id| ItemSummary {
                    external_id: id.to_string(),
                    title: id.to_uppercase(),
                    published_at: None,
                })
                .collect(),
            next_page_token: None,
        })
    }

    async fn fetch_item_details(&self, ids: &[String]) -> BridgeResult<Vec<ItemDetails>> {
        Ok(ids
            .iter()
            .map(|id| ItemDetails {
                external_id: id.clone(),
                title: id.to_uppercase(),
                description: None,
                published_at: None,
                duration_secs: Some(60),
                view_count: None,
                like_count: None,
                comment_count: Some(0),
                thumbnail_url: None,
            })
            .collect())
    }

    async fn list_comments(
        &self,
        _item_id: &str,
        _page_token: Option<&str>,
    ) -> BridgeResult<CommentPage> {
        Ok(CommentPage::default())
    }
}

struct MockDownloader;

#[async_trait]
impl MediaFetcher for MockDownloader {
    async fn download(
        &self,
        item_id: &str,
        sink: Arc<dyn ProgressSink>,
    ) -> BridgeResult<MediaDownload> {
        if item_id == "broken" {
            return Err(BridgeError::OperationFailed("HTTP 403".to_string()));
        }
        sink.report(TransferProgress::new(4096, Some(4096)));
        Ok(MediaDownload {
            local_path: PathBuf::from(format!("/archive/videos/{}/video.mp4", item_id)),
            thumbnail_path: None,
            byte_size: 4096,
            height: Some(1080),
        })
    }
}

fn config() -> ArchiveConfig {
    ArchiveConfig::builder()
        .database_path(":memory:")
        .storage_path("/archive")
        .retry_ceiling(2)
        .initial_backoff_ms(1)
        .build()
        .unwrap()
}

fn service(pool: SqlitePool, items: Vec<&'static str>) -> ArchiveService {
    let deps = ArchiveDependencies::new(Arc::new(MockPlatform { items }), Arc::new(MockDownloader))
        .with_clock(Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap(),
        )));
    ArchiveService::with_pool(pool, config(), deps).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_register_and_sync_with_default_kind() {
    let pool = create_test_pool().await.unwrap();
    let service = service(pool, vec!["a", "b", "broken"]);

    let channel = service.register_channel("UC123").await.unwrap();
    assert_eq!(channel.subscriber_count, Some(42));
    assert_eq!(service.list_channels().await.unwrap().len(), 1);

    let job_id = service
        .start_sync(None, TimeFilter::None, "UC123")
        .await
        .unwrap();
    service.wait_for_idle().await;

    let jobs = service.list_jobs(5).await.unwrap();
    assert_eq!(jobs[0].id, job_id);
    assert_eq!(jobs[0].kind, JobKind::Incremental);
    assert_eq!(jobs[0].status, SyncStatus::Completed);
    assert_eq!(jobs[0].failed_items, 1);

    let overview = service.overview().await.unwrap();
    assert!(overview.status.is_idle());
    assert_eq!(overview.last_sync.unwrap().items_synced, 3);
    assert_eq!(overview.queue_length, 0);
    assert_eq!(overview.error_count, 2);
    assert_eq!(overview.storage.downloaded_items, 2);
    assert_eq!(overview.storage.bytes_stored, 8192);
    assert!(overview.next_auto_sync.is_none());

    let page = service.list_errors(PageRequest::new(0, 1)).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert!(page.items[0].message.starts_with("Giving up"));

    let queue = service.list_queue(None).await.unwrap();
    assert_eq!(queue.len(), 3);
    assert_eq!(
        queue.iter().filter(|q| q.status == QueueStatus::Failed).count(),
        1
    );

    let json = serde_json::to_value(&overview.status).unwrap();
    assert_eq!(json["state"], "idle");
}

#[tokio::test]
async fn test_register_unknown_channel() {
    let pool = create_test_pool().await.unwrap();
    let service = service(pool, vec![]);

    let result = service.register_channel("UC-missing").await;
    assert!(matches!(
        result,
        Err(ServiceError::Sync(SyncError::Bridge(BridgeError::NotFound(_))))
    ));

    let result = service.start_sync(Some(JobKind::Full), TimeFilter::None, "UC-missing").await;
    assert!(matches!(result, Err(ServiceError::Sync(SyncError::NotFound { .. }))));
}

#[tokio::test]
async fn test_configure_auto_sync_persists_and_disables() {
    let pool = create_test_pool().await.unwrap();
    let service = service(pool.clone(), vec![]);

    let settings = AutoSyncSettings {
        enabled: true,
        time_of_day: NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
        kind: JobKind::Incremental,
        channel_ref: Some("UC123".to_string()),
    };
    let next = service.configure_auto_sync(settings.clone()).await.unwrap();
    assert_eq!(next, Some(Utc.with_ymd_and_hms(2024, 3, 11, 3, 0, 0).unwrap()));
    assert_eq!(service.next_auto_sync(), next);

    let store = SqliteJobStore::new(pool);
    assert_eq!(store.load_settings().await.unwrap(), Some(settings.clone()));

    let disabled = AutoSyncSettings {
        enabled: false,
        ..settings
    };
    assert_eq!(service.configure_auto_sync(disabled.clone()).await.unwrap(), None);
    assert_eq!(service.next_auto_sync(), None);
    assert_eq!(store.load_settings().await.unwrap(), Some(disabled));

    let invalid = AutoSyncSettings {
        enabled: true,
        channel_ref: None,
        ..AutoSyncSettings::default()
    };
    assert!(matches!(
        service.configure_auto_sync(invalid).await,
        Err(ServiceError::Sync(SyncError::InvalidSchedule(_)))
    ));
}

#[tokio::test]
async fn test_bootstrap_resumes_and_rearms() {
    let pool = create_test_pool().await.unwrap();

    // State left behind by a previous process
    {
        let previous = service(pool.clone(), vec!["a", "b"]);
        previous.register_channel("UC123").await.unwrap();
        previous
            .configure_auto_sync(AutoSyncSettings {
                enabled: true,
                time_of_day: NaiveTime::from_hms_opt(22, 30, 0).unwrap(),
                kind: JobKind::Full,
                channel_ref: Some("UC123".to_string()),
            })
            .await
            .unwrap();
        previous.shutdown().await;
    }
    let store = SqliteJobStore::new(pool.clone());
    let interrupted = SyncJob::new(JobKind::Full, TimeFilter::None, "UC123")
        .start()
        .unwrap();
    store.create_job(&interrupted).await.unwrap();

    let service = service(pool, vec!["a", "b"]);
    let report = service.bootstrap().await.unwrap();

    assert_eq!(report.resumed_job, Some(interrupted.id));
    assert_eq!(
        report.next_auto_sync,
        Some(Utc.with_ymd_and_hms(2024, 3, 10, 22, 30, 0).unwrap())
    );

    service.wait_for_idle().await;
    let job = store.find_job(&interrupted.id).await.unwrap().unwrap();
    assert_eq!(job.status, SyncStatus::Completed);
    assert_eq!(job.processed_items, 2);
    assert_eq!(service.auto_sync_settings().kind, JobKind::Full);
}

#[tokio::test]
async fn test_bootstrap_on_fresh_database() {
    let pool = create_test_pool().await.unwrap();
    let service = service(pool, vec![]);

    let report = service.bootstrap().await.unwrap();
    assert_eq!(report.resumed_job, None);
    assert_eq!(report.next_auto_sync, None);
    assert!(service.stop_sync().await.is_none());
}
