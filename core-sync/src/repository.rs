//! # Job Store
//!
//! Durable storage for sync jobs, download queue items, the error log, run
//! history and auto-sync settings.
//!
//! ## Overview
//!
//! The orchestrator only talks to storage through [`JobStore`]. The SQLite
//! implementation enforces two invariants on its own:
//!
//! - at most one `running` job (partial unique index on `sync_jobs.status`)
//! - terminal jobs are never overwritten
//!
//! Queue items are upserted by `(job_id, item_external_id)`, so replaying an
//! item after a restart is safe.

use crate::job::{ErrorCategory, ErrorRecord, JobKind, SyncHistory, SyncJob, SyncJobId, SyncStatus};
use crate::queue::{QueueItem, QueueItemId, QueueStatus};
use crate::scheduler::AutoSyncSettings;
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::NaiveTime;
use core_library::repositories::{Page, PageRequest};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashSet;

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence interface used by the sync engine
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyRunning`] if the job is `running` and
    /// another running job is already stored.
    async fn create_job(&self, job: &SyncJob) -> Result<()>;

    /// Persist a status transition together with the job's counters
    ///
    /// # Errors
    ///
    /// - [`SyncError::JobNotFound`] if no row exists
    /// - [`SyncError::InvalidStateTransition`] if the stored job is terminal
    async fn update_job_status(&self, job: &SyncJob) -> Result<()>;

    /// Persist counters and the resume marker of a running job
    async fn update_job_counters(&self, job: &SyncJob) -> Result<()>;

    /// Mark one item processed under a job and persist the job's counters,
    /// atomically
    ///
    /// Recording the same item twice keeps the first outcome.
    async fn record_item_outcome(
        &self,
        job: &SyncJob,
        item_external_id: &str,
        failed: bool,
    ) -> Result<()>;

    /// The job left in `running` status, if any
    async fn find_running_job(&self) -> Result<Option<SyncJob>>;

    /// Append to the error log, returning the assigned record id
    async fn append_error_record(&self, record: &ErrorRecord) -> Result<i64>;

    /// Insert or replace the queue item for `(job_id, item_external_id)`
    async fn upsert_queue_item(&self, item: &QueueItem) -> Result<()>;

    async fn find_job(&self, id: &SyncJobId) -> Result<Option<SyncJob>>;

    /// Most recent jobs first
    async fn list_jobs(&self, limit: u32) -> Result<Vec<SyncJob>>;

    async fn find_queue_item(
        &self,
        job_id: &SyncJobId,
        item_external_id: &str,
    ) -> Result<Option<QueueItem>>;

    /// External ids already processed under a job, failed ones included
    async fn processed_items_for_job(&self, job_id: &SyncJobId) -> Result<HashSet<String>>;

    async fn list_queue_items(&self, job_id: &SyncJobId) -> Result<Vec<QueueItem>>;

    /// Items waiting for or in the middle of a download, across all jobs
    async fn queued_count(&self) -> Result<u64>;

    /// Error log, newest first
    async fn list_error_records(&self, page_request: PageRequest) -> Result<Page<ErrorRecord>>;

    /// Error log entries of one job, oldest first
    async fn list_job_errors(&self, job_id: &SyncJobId) -> Result<Vec<ErrorRecord>>;

    async fn count_error_records(&self) -> Result<u64>;

    async fn record_history(&self, history: &SyncHistory) -> Result<()>;

    async fn latest_history(&self) -> Result<Option<SyncHistory>>;

    async fn load_settings(&self) -> Result<Option<AutoSyncSettings>>;

    async fn save_settings(&self, settings: &AutoSyncSettings) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`JobStore`]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> SyncError {
    SyncError::Database(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Counters and resume marker of a running job
async fn write_counters(conn: &mut SqliteConnection, job: &SyncJob) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE sync_jobs SET
            total_items = ?,
            processed_items = ?,
            failed_items = ?,
            resume_marker = ?
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(job.total_items as i64)
    .bind(job.processed_items as i64)
    .bind(job.failed_items as i64)
    .bind(&job.resume_marker)
    .bind(job.id.as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;

    if result.rows_affected() == 0 {
        return Err(SyncError::JobNotFound {
            job_id: job.id.to_string(),
        });
    }

    Ok(())
}

const JOB_COLUMNS: &str = "id, kind, channel_ref, time_filter, status, total_items, \
    processed_items, failed_items, resume_marker, error_message, created_at, \
    started_at, completed_at";

const QUEUE_COLUMNS: &str = "id, job_id, item_external_id, title, status, progress, \
    rate_label, eta_label, retry_count, max_retries, error_message, created_at, \
    started_at, completed_at";

/// Database row representation of a sync job
#[derive(Debug, FromRow)]
struct SyncJobRow {
    id: String,
    kind: String,
    channel_ref: String,
    time_filter: String,
    status: String,
    total_items: i64,
    processed_items: i64,
    failed_items: i64,
    resume_marker: Option<String>,
    error_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = SyncError;

    fn try_from(row: SyncJobRow) -> Result<Self> {
        Ok(SyncJob {
            id: SyncJobId::from_string(&row.id)?,
            kind: row.kind.parse()?,
            channel_ref: row.channel_ref,
            time_filter: row.time_filter.parse()?,
            status: row.status.parse()?,
            total_items: row.total_items.max(0) as u64,
            processed_items: row.processed_items.max(0) as u64,
            failed_items: row.failed_items.max(0) as u64,
            resume_marker: row.resume_marker,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct QueueItemRow {
    id: String,
    job_id: String,
    item_external_id: String,
    title: Option<String>,
    status: String,
    progress: f64,
    rate_label: Option<String>,
    eta_label: Option<String>,
    retry_count: i64,
    max_retries: i64,
    error_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = SyncError;

    fn try_from(row: QueueItemRow) -> Result<Self> {
        let status: QueueStatus = row.status.parse()?;
        Ok(QueueItem {
            id: QueueItemId::from_string(&row.id)?,
            job_id: SyncJobId::from_string(&row.job_id)?,
            item_external_id: row.item_external_id,
            title: row.title,
            status,
            progress: row.progress,
            rate_label: row.rate_label,
            eta_label: row.eta_label,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ErrorRecordRow {
    id: i64,
    job_id: Option<String>,
    item_external_id: Option<String>,
    category: String,
    message: String,
    created_at: i64,
}

impl TryFrom<ErrorRecordRow> for ErrorRecord {
    type Error = SyncError;

    fn try_from(row: ErrorRecordRow) -> Result<Self> {
        Ok(ErrorRecord {
            id: row.id,
            job_id: row.job_id.as_deref().map(SyncJobId::from_string).transpose()?,
            item_external_id: row.item_external_id,
            category: row.category.parse::<ErrorCategory>()?,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncHistoryRow {
    job_id: Option<String>,
    items_synced: i64,
    comments_synced: i64,
    bytes_stored: i64,
    duration_secs: i64,
    completed_at: i64,
}

impl TryFrom<SyncHistoryRow> for SyncHistory {
    type Error = SyncError;

    fn try_from(row: SyncHistoryRow) -> Result<Self> {
        let job_id = row
            .job_id
            .ok_or_else(|| SyncError::Database("History row lost its job".to_string()))?;
        Ok(SyncHistory {
            job_id: SyncJobId::from_string(&job_id)?,
            items_synced: row.items_synced.max(0) as u64,
            comments_synced: row.comments_synced.max(0) as u64,
            bytes_stored: row.bytes_stored.max(0) as u64,
            duration_secs: row.duration_secs.max(0) as u64,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SettingsRow {
    auto_sync_enabled: bool,
    auto_sync_time: String,
    auto_sync_kind: String,
    channel_ref: Option<String>,
}

impl TryFrom<SettingsRow> for AutoSyncSettings {
    type Error = SyncError;

    fn try_from(row: SettingsRow) -> Result<Self> {
        let time_of_day = NaiveTime::parse_from_str(&row.auto_sync_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&row.auto_sync_time, "%H:%M:%S"))
            .map_err(|_| SyncError::InvalidSchedule(row.auto_sync_time.clone()))?;

        Ok(AutoSyncSettings {
            enabled: row.auto_sync_enabled,
            time_of_day,
            kind: row.auto_sync_kind.parse::<JobKind>()?,
            channel_ref: row.channel_ref,
        })
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create_job(&self, job: &SyncJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, kind, channel_ref, time_filter, status,
                total_items, processed_items, failed_items,
                resume_marker, error_message, created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.kind.as_str())
        .bind(&job.channel_ref)
        .bind(job.time_filter.as_str())
        .bind(job.status.as_str())
        .bind(job.total_items as i64)
        .bind(job.processed_items as i64)
        .bind(job.failed_items as i64)
        .bind(&job.resume_marker)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) && job.status == SyncStatus::Running {
                SyncError::AlreadyRunning {
                    job_id: job.id.to_string(),
                }
            } else {
                db_error(e)
            }
        })?;

        Ok(())
    }

    async fn update_job_status(&self, job: &SyncJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = ?,
                total_items = ?,
                processed_items = ?,
                failed_items = ?,
                resume_marker = ?,
                error_message = ?,
                started_at = ?,
                completed_at = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.total_items as i64)
        .bind(job.processed_items as i64)
        .bind(job.failed_items as i64)
        .bind(&job.resume_marker)
        .bind(&job.error_message)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.find_job(&job.id).await? {
            None => Err(SyncError::JobNotFound {
                job_id: job.id.to_string(),
            }),
            Some(stored) => Err(SyncError::InvalidStateTransition {
                from: stored.status.as_str().to_string(),
                to: job.status.as_str().to_string(),
                reason: "Stored job is already terminal".to_string(),
            }),
        }
    }

    async fn update_job_counters(&self, job: &SyncJob) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(db_error)?;
        write_counters(&mut conn, job).await
    }

    async fn record_item_outcome(
        &self,
        job: &SyncJob,
        item_external_id: &str,
        failed: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO job_items (job_id, item_external_id, failed, processed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(job_id, item_external_id) DO NOTHING
            "#,
        )
        .bind(job.id.as_str())
        .bind(item_external_id)
        .bind(failed)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        write_counters(&mut tx, job).await?;
        tx.commit().await.map_err(db_error)
    }

    async fn find_running_job(&self) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(&format!(
            "SELECT {} FROM sync_jobs WHERE status = 'running' LIMIT 1",
            JOB_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(SyncJob::try_from).transpose()
    }

    async fn append_error_record(&self, record: &ErrorRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO error_records (job_id, item_external_id, category, message, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.job_id.map(|id| id.as_str()))
        .bind(&record.item_external_id)
        .bind(record.category.as_str())
        .bind(&record.message)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn upsert_queue_item(&self, item: &QueueItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_items (
                id, job_id, item_external_id, title, status, progress,
                rate_label, eta_label, retry_count, max_retries, error_message,
                created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id, item_external_id) DO UPDATE SET
                title = COALESCE(excluded.title, queue_items.title),
                status = excluded.status,
                progress = excluded.progress,
                rate_label = excluded.rate_label,
                eta_label = excluded.eta_label,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                error_message = excluded.error_message,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at
            "#,
        )
        .bind(item.id.as_str())
        .bind(item.job_id.as_str())
        .bind(&item.item_external_id)
        .bind(&item.title)
        .bind(item.status.as_str())
        .bind(item.progress)
        .bind(&item.rate_label)
        .bind(&item.eta_label)
        .bind(item.retry_count as i64)
        .bind(item.max_retries as i64)
        .bind(&item.error_message)
        .bind(item.created_at)
        .bind(item.started_at)
        .bind(item.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn find_job(&self, id: &SyncJobId) -> Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(&format!(
            "SELECT {} FROM sync_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(SyncJob::try_from).transpose()
    }

    async fn list_jobs(&self, limit: u32) -> Result<Vec<SyncJob>> {
        let rows = sqlx::query_as::<_, SyncJobRow>(&format!(
            "SELECT {} FROM sync_jobs ORDER BY created_at DESC, rowid DESC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(SyncJob::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn find_queue_item(
        &self,
        job_id: &SyncJobId,
        item_external_id: &str,
    ) -> Result<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueItemRow>(&format!(
            "SELECT {} FROM queue_items WHERE job_id = ? AND item_external_id = ?",
            QUEUE_COLUMNS
        ))
        .bind(job_id.as_str())
        .bind(item_external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(QueueItem::try_from).transpose()
    }

    async fn processed_items_for_job(&self, job_id: &SyncJobId) -> Result<HashSet<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT item_external_id FROM job_items WHERE job_id = ?",
        )
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(ids.into_iter().collect())
    }

    async fn list_queue_items(&self, job_id: &SyncJobId) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueItemRow>(&format!(
            "SELECT {} FROM queue_items WHERE job_id = ? ORDER BY created_at ASC, rowid ASC",
            QUEUE_COLUMNS
        ))
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(QueueItem::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn queued_count(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM queue_items WHERE status IN ('queued', 'downloading')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(count.max(0) as u64)
    }

    async fn list_error_records(&self, page_request: PageRequest) -> Result<Page<ErrorRecord>> {
        let total = self.count_error_records().await?;

        let rows = sqlx::query_as::<_, ErrorRecordRow>(
            r#"
            SELECT id, job_id, item_external_id, category, message, created_at
            FROM error_records
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let records = rows
            .into_iter()
            .map(ErrorRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(records, total, page_request))
    }

    async fn list_job_errors(&self, job_id: &SyncJobId) -> Result<Vec<ErrorRecord>> {
        let rows = sqlx::query_as::<_, ErrorRecordRow>(
            r#"
            SELECT id, job_id, item_external_id, category, message, created_at
            FROM error_records
            WHERE job_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(job_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter()
            .map(ErrorRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn count_error_records(&self) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM error_records")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(count.max(0) as u64)
    }

    async fn record_history(&self, history: &SyncHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_history (
                job_id, items_synced, comments_synced, bytes_stored, duration_secs, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(history.job_id.as_str())
        .bind(history.items_synced as i64)
        .bind(history.comments_synced as i64)
        .bind(history.bytes_stored as i64)
        .bind(history.duration_secs as i64)
        .bind(history.completed_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn latest_history(&self) -> Result<Option<SyncHistory>> {
        let row = sqlx::query_as::<_, SyncHistoryRow>(
            r#"
            SELECT job_id, items_synced, comments_synced, bytes_stored, duration_secs, completed_at
            FROM sync_history
            WHERE job_id IS NOT NULL
            ORDER BY completed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(SyncHistory::try_from).transpose()
    }

    async fn load_settings(&self) -> Result<Option<AutoSyncSettings>> {
        let row = sqlx::query_as::<_, SettingsRow>(
            r#"
            SELECT auto_sync_enabled, auto_sync_time, auto_sync_kind, channel_ref
            FROM sync_settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(AutoSyncSettings::try_from).transpose()
    }

    async fn save_settings(&self, settings: &AutoSyncSettings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_settings (
                id, auto_sync_enabled, auto_sync_time, auto_sync_kind, channel_ref, updated_at
            ) VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                auto_sync_enabled = excluded.auto_sync_enabled,
                auto_sync_time = excluded.auto_sync_time,
                auto_sync_kind = excluded.auto_sync_kind,
                channel_ref = excluded.channel_ref,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.enabled)
        .bind(settings.time_of_day.format("%H:%M").to_string())
        .bind(settings.kind.as_str())
        .bind(&settings.channel_ref)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
