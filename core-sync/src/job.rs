//! # Sync Job State Machine
//!
//! Lifecycle of a channel sync run with validated state transitions.
//!
//! ## Overview
//!
//! A [`SyncJob`] records one run of the orchestrator against a channel: what
//! kind of run it is, which publish window it covers, how far it got and how
//! it ended. Jobs are persisted through the [`JobStore`](crate::JobStore) so a
//! run interrupted by a restart can be picked up from its resume marker.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//!     └──────→ Cancelled
//! ```
//!
//! Completed, failed and cancelled jobs are terminal and never change again.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{JobKind, SyncJob, TimeFilter};
//!
//! let job = SyncJob::new(JobKind::Incremental, TimeFilter::Week, "UC123");
//! let mut job = job.start()?;
//!
//! job.set_total(2)?;
//! job.record_item("vid-1", false)?;
//! job.record_item("vid-2", true)?;
//!
//! let job = job.complete()?;
//! assert_eq!(job.failed_items, 1);
//! ```

use crate::{Result, SyncError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncJobId(Uuid);

impl SyncJobId {
    /// Create a new random sync job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a sync job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidJobId(e.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SyncJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SyncJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SyncStatus {
    /// Completed, failed and cancelled jobs never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
            SyncStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncStatus::Pending),
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            "cancelled" => Ok(SyncStatus::Cancelled),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Job Kind & Time Window
// ============================================================================

/// What a sync run does for each candidate item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Metadata, media and comments for every candidate
    Full,
    /// Like `Full`, but items already downloaded are not candidates
    #[default]
    Incremental,
    MetadataOnly,
    CommentsOnly,
}

impl JobKind {
    pub fn downloads_media(&self) -> bool {
        matches!(self, JobKind::Full | JobKind::Incremental)
    }

    pub fn syncs_comments(&self) -> bool {
        matches!(
            self,
            JobKind::Full | JobKind::Incremental | JobKind::CommentsOnly
        )
    }

    /// Whether downloaded items are dropped from the candidate list
    pub fn skips_downloaded(&self) -> bool {
        matches!(self, JobKind::Incremental)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Full => "full",
            JobKind::Incremental => "incremental",
            JobKind::MetadataOnly => "metadata_only",
            JobKind::CommentsOnly => "comments_only",
        }
    }
}

impl FromStr for JobKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "full" => Ok(JobKind::Full),
            "incremental" => Ok(JobKind::Incremental),
            "metadata_only" => Ok(JobKind::MetadataOnly),
            "comments_only" => Ok(JobKind::CommentsOnly),
            _ => Err(SyncError::InvalidJobKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publish-date window applied while enumerating a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    #[default]
    None,
    Week,
    Month,
    Year,
}

impl TimeFilter {
    /// Lower bound on the publish date relative to `now`
    pub fn published_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            TimeFilter::None => return None,
            TimeFilter::Week => 7,
            TimeFilter::Month => 30,
            TimeFilter::Year => 365,
        };
        Some(now - Duration::days(days))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::None => "none",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
        }
    }
}

impl FromStr for TimeFilter {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(TimeFilter::None),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            _ => Err(SyncError::InvalidTimeFilter(s.to_string())),
        }
    }
}

impl std::fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

/// A sync run with state machine semantics
///
/// Transitions consume the job and hand back the new state, so a job that
/// failed validation is never left half-updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: SyncJobId,
    pub kind: JobKind,
    /// Platform identifier of the channel being archived
    pub channel_ref: String,
    pub time_filter: TimeFilter,
    pub status: SyncStatus,
    /// Candidates selected by enumeration (including ones finished before a resume)
    pub total_items: u64,
    /// Items finished, successfully or not
    pub processed_items: u64,
    pub failed_items: u64,
    /// External id of the last fully processed item
    pub resume_marker: Option<String>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl SyncJob {
    /// Create a new sync job in pending state
    pub fn new(kind: JobKind, time_filter: TimeFilter, channel_ref: impl Into<String>) -> Self {
        Self {
            id: SyncJobId::new(),
            kind,
            channel_ref: channel_ref.into(),
            time_filter,
            status: SyncStatus::Pending,
            total_items: 0,
            processed_items: 0,
            failed_items: 0,
            resume_marker: None,
            error_message: None,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Start the sync job
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Pending` state
    pub fn start(mut self) -> Result<Self> {
        self.validate_transition(SyncStatus::Running)?;
        self.status = SyncStatus::Running;
        self.started_at = Some(current_timestamp());
        Ok(self)
    }

    /// Record the number of candidates found by enumeration
    ///
    /// Items already processed before a resume are counted in addition to
    /// `remaining`.
    pub fn set_total(&mut self, remaining: u64) -> Result<()> {
        self.ensure_running("set_total")?;
        self.total_items = self.processed_items + remaining;
        Ok(())
    }

    /// Advance counters after an item finished, successfully or not
    pub fn record_item(&mut self, external_id: &str, failed: bool) -> Result<()> {
        self.ensure_running("record_item")?;
        self.processed_items += 1;
        if failed {
            self.failed_items += 1;
        }
        self.resume_marker = Some(external_id.to_string());
        Ok(())
    }

    /// Mark the job as completed
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Running` state
    pub fn complete(mut self) -> Result<Self> {
        self.validate_transition(SyncStatus::Completed)?;
        self.status = SyncStatus::Completed;
        self.completed_at = Some(current_timestamp());
        Ok(self)
    }

    /// Mark the job as failed with the captured error
    pub fn fail(mut self, error_message: impl Into<String>) -> Result<Self> {
        self.validate_transition(SyncStatus::Failed)?;
        self.status = SyncStatus::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(current_timestamp());
        Ok(self)
    }

    /// Mark the job as cancelled
    pub fn cancel(mut self) -> Result<Self> {
        self.validate_transition(SyncStatus::Cancelled)?;
        self.status = SyncStatus::Cancelled;
        self.completed_at = Some(current_timestamp());
        Ok(self)
    }

    /// Percentage of candidates processed, 0 when nothing was enumerated
    pub fn percent_complete(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        ((self.processed_items as f64 / self.total_items as f64) * 100.0).min(100.0)
    }

    /// Elapsed run time once the job has reached a terminal state
    pub fn duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).max(0)),
            _ => None,
        }
    }

    fn ensure_running(&self, operation: &str) -> Result<()> {
        if self.status != SyncStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: operation.to_string(),
                reason: "Job must be running".to_string(),
            });
        }
        Ok(())
    }

    fn validate_transition(&self, to: SyncStatus) -> Result<()> {
        let valid = match (self.status, to) {
            (SyncStatus::Pending, SyncStatus::Running)
            | (SyncStatus::Pending, SyncStatus::Cancelled)
            | (SyncStatus::Pending, SyncStatus::Failed) => true,
            (SyncStatus::Running, SyncStatus::Completed)
            | (SyncStatus::Running, SyncStatus::Failed)
            | (SyncStatus::Running, SyncStatus::Cancelled) => true,
            _ => false,
        };

        if valid {
            return Ok(());
        }

        let reason = if self.status.is_terminal() {
            format!("Job is already {}", self.status)
        } else {
            format!("Cannot move a {} job to {}", self.status, to)
        };

        Err(SyncError::InvalidStateTransition {
            from: self.status.as_str().to_string(),
            to: to.as_str().to_string(),
            reason,
        })
    }
}

// ============================================================================
// Error Log & History
// ============================================================================

/// Classification of an entry in the error log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Download,
    Metadata,
    Comments,
    RateLimited,
    NotFound,
    Orchestration,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Download => "download",
            ErrorCategory::Metadata => "metadata",
            ErrorCategory::Comments => "comments",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Orchestration => "orchestration",
        }
    }

    /// Category for an error raised while working on one step of an item
    ///
    /// Rate limits and missing upstream content are reported as such
    /// regardless of the step that hit them.
    pub fn for_step(step: ErrorCategory, error: &SyncError) -> ErrorCategory {
        match error {
            SyncError::Bridge(e) if e.category() == "rate_limited" => ErrorCategory::RateLimited,
            SyncError::Bridge(e) if e.category() == "not_found" => ErrorCategory::NotFound,
            SyncError::NotFound { .. } => ErrorCategory::NotFound,
            _ => step,
        }
    }
}

impl FromStr for ErrorCategory {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "download" => Ok(ErrorCategory::Download),
            "metadata" => Ok(ErrorCategory::Metadata),
            "comments" => Ok(ErrorCategory::Comments),
            "rate_limited" => Ok(ErrorCategory::RateLimited),
            "not_found" => Ok(ErrorCategory::NotFound),
            "orchestration" => Ok(ErrorCategory::Orchestration),
            other => Err(SyncError::Database(format!(
                "Unknown error category: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only error log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Assigned by the store; 0 until appended
    pub id: i64,
    /// `None` once the owning job has been deleted
    pub job_id: Option<SyncJobId>,
    pub item_external_id: Option<String>,
    pub category: ErrorCategory,
    pub message: String,
    pub created_at: i64,
}

impl ErrorRecord {
    pub fn new(
        job_id: SyncJobId,
        item_external_id: Option<&str>,
        category: ErrorCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            job_id: Some(job_id),
            item_external_id: item_external_id.map(str::to_string),
            category,
            message: message.into(),
            created_at: current_timestamp(),
        }
    }
}

/// Statistics of a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistory {
    pub job_id: SyncJobId,
    pub items_synced: u64,
    pub comments_synced: u64,
    pub bytes_stored: u64,
    pub duration_secs: u64,
    pub completed_at: i64,
}

pub(crate) fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

// ============================================================================
// Tests
// ============================================================================
