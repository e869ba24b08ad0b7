//! # Download Queue Items
//!
//! Per-item download lifecycle records.
//!
//! A [`QueueItem`] exists for every item a job selected for media download.
//! It is keyed by `(job_id, item_external_id)`, so re-downloading the same
//! item under the same job supersedes the earlier record instead of adding a
//! second one.
//!
//! ## Retry Logic
//!
//! Each failed attempt increments `retry_count`. While the count is below
//! `max_retries` the item goes back to `queued`; once it reaches the ceiling
//! the item is `failed` for good. The delay before the next attempt doubles
//! with every failure:
//!
//! ```text
//! delay = initial_backoff_ms * 2^retry_count
//! ```

use crate::error::{Result, SyncError};
use crate::job::{current_timestamp, SyncJobId};
use bridge_traits::TransferProgress;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Default number of download attempts per item
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Type-safe queue item identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidJobId(e.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Download status of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Downloading)
    }
}

impl FromStr for QueueStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(SyncError::InvalidQueueStatus(s.to_string())),
        }
    }
}

/// Download lifecycle of one item within one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub job_id: SyncJobId,
    pub item_external_id: String,
    pub title: Option<String>,
    pub status: QueueStatus,
    /// Completed fraction in `[0, 1]`
    pub progress: f64,
    pub rate_label: Option<String>,
    pub eta_label: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl QueueItem {
    pub fn new(job_id: SyncJobId, item_external_id: impl Into<String>) -> Self {
        Self {
            id: QueueItemId::new(),
            job_id,
            item_external_id: item_external_id.into(),
            title: None,
            status: QueueStatus::Queued,
            progress: 0.0,
            rate_label: None,
            eta_label: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            error_message: None,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the next attempt
    pub fn next_retry_delay(&self, initial_backoff_ms: u64) -> Duration {
        let factor = 2u64.saturating_pow(self.retry_count);
        Duration::from_millis(initial_backoff_ms.saturating_mul(factor))
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Begin (or re-begin) a transfer attempt
    pub fn start_download(&mut self) {
        self.status = QueueStatus::Downloading;
        self.progress = 0.0;
        self.rate_label = None;
        self.eta_label = None;
        self.started_at = Some(current_timestamp());
        self.completed_at = None;
    }

    /// Fold raw transfer progress into the record
    pub fn update_progress(&mut self, progress: &TransferProgress) {
        self.progress = progress.fraction();
        if progress.rate_label.is_some() {
            self.rate_label = progress.rate_label.clone();
        }
        if progress.eta_label.is_some() {
            self.eta_label = progress.eta_label.clone();
        }
    }

    pub fn complete(&mut self) {
        self.status = QueueStatus::Completed;
        self.progress = 1.0;
        self.eta_label = None;
        self.error_message = None;
        self.completed_at = Some(current_timestamp());
    }

    /// Record a failed attempt
    ///
    /// Returns `true` when the item may be attempted again.
    pub fn fail(&mut self, error_message: impl Into<String>) -> bool {
        self.retry_count += 1;
        self.error_message = Some(error_message.into());
        self.rate_label = None;
        self.eta_label = None;

        if self.can_retry() {
            self.status = QueueStatus::Queued;
            true
        } else {
            self.status = QueueStatus::Failed;
            self.completed_at = Some(current_timestamp());
            false
        }
    }

    pub fn cancel(&mut self) {
        if !self.status.is_terminal() {
            self.status = QueueStatus::Cancelled;
            self.completed_at = Some(current_timestamp());
        }
    }
}
