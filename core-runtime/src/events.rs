//! # Progress Hub
//!
//! Live progress fan-out for the archive sync engine.
//!
//! ## Overview
//!
//! The hub consists of:
//! - **Event Types**: [`ArchiveEvent`], the JSON-shaped messages pushed to observers
//! - **ProgressSnapshot**: the current status projection, folded from every event
//! - **ProgressHub**: subscriber registry plus snapshot owner
//! - **Subscription**: a subscriber's handle and receive side
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   publish   ┌──────────────────────┐  try_send   ┌────────────┐
//! │ Orchestrator ├────────────>│                      ├────────────>│ Subscriber │
//! └──────────────┘             │     ProgressHub      │             └────────────┘
//!                              │  snapshot + senders  │  try_send   ┌────────────┐
//! ┌──────────────┐   publish   │   (one std Mutex)    ├────────────>│ Subscriber │
//! │ Download     ├────────────>│                      │             └────────────┘
//! │ Coordinator  │             └──────────┬───────────┘
//! └──────────────┘                        │ snapshot()
//!                                         v
//!                                   status queries
//! ```
//!
//! Every subscriber owns a bounded queue. Publishing attempts one
//! non-blocking delivery per subscriber; a subscriber whose queue is full or
//! whose receiver was dropped is removed on the spot. The publisher never sees
//! an error and never waits.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ArchiveEvent, ProgressHub};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let hub = ProgressHub::new(16);
//! let mut subscription = hub.subscribe();
//!
//! hub.publish(ArchiveEvent::SyncCancelled {
//!     job_id: "job-1".to_string(),
//! });
//!
//! let event = subscription.recv().await;
//! assert!(matches!(event, Some(ArchiveEvent::SyncCancelled { .. })));
//! # }
//! ```
//!
//! ## Wire Format
//!
//! Events serialize as `{"type": "<kind>", "data": {...}}` where kind is one of
//! `sync_progress`, `download_progress`, `sync_completed`, `sync_cancelled`,
//! `sync_error`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

// ============================================================================
// Event Types
// ============================================================================

/// Phase of a running sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    RefreshChannel,
    Enumerate,
    Items,
    Finalize,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::RefreshChannel => "refresh_channel",
            SyncPhase::Enumerate => "enumerate",
            SyncPhase::Items => "items",
            SyncPhase::Finalize => "finalize",
        }
    }
}

/// State of a single media transfer as shown to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Queued,
    Downloading,
    /// Bytes are in, post-processing (muxing, thumbnail) is running
    Processing,
    Completed,
    Failed,
}

impl TransferState {
    /// Whether the transfer should disappear from the in-flight map
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TransferState::Queued | TransferState::Completed | TransferState::Failed
        )
    }
}

/// Per-item sync progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub job_id: String,
    pub phase: SyncPhase,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    /// Title or external id of the item being processed
    pub current_item: Option<String>,
    /// 0-100
    pub percent_complete: f64,
}

impl SyncProgress {
    /// Percentage of `processed` over `total`, 0 when nothing was enumerated.
    pub fn percent(processed: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            (processed as f64 / total as f64 * 100.0).min(100.0)
        }
    }
}

/// Byte-level transfer progress for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub job_id: String,
    pub item_id: String,
    pub title: Option<String>,
    /// 0-100
    pub progress: f64,
    pub rate: Option<String>,
    pub eta: Option<String>,
    pub status: TransferState,
}

/// Events pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ArchiveEvent {
    SyncProgress(SyncProgress),
    DownloadProgress(DownloadProgress),
    SyncCompleted {
        job_id: String,
        total_synced: u64,
        failed: u64,
        duration_secs: u64,
    },
    SyncCancelled {
        job_id: String,
    },
    SyncError {
        job_id: String,
        error: String,
    },
}

impl ArchiveEvent {
    pub fn job_id(&self) -> &str {
        match self {
            ArchiveEvent::SyncProgress(p) => &p.job_id,
            ArchiveEvent::DownloadProgress(p) => &p.job_id,
            ArchiveEvent::SyncCompleted { job_id, .. }
            | ArchiveEvent::SyncCancelled { job_id }
            | ArchiveEvent::SyncError { job_id, .. } => job_id,
        }
    }

    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiveEvent::SyncProgress(_) => "sync_progress",
            ArchiveEvent::DownloadProgress(_) => "download_progress",
            ArchiveEvent::SyncCompleted { .. } => "sync_completed",
            ArchiveEvent::SyncCancelled { .. } => "sync_cancelled",
            ArchiveEvent::SyncError { .. } => "sync_error",
        }
    }
}

// ============================================================================
// Progress Snapshot
// ============================================================================

/// Coarse activity indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    #[default]
    Idle,
    Syncing,
    Downloading,
}

/// Point-in-time projection of the active job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub state: ActivityState,
    pub job_id: Option<String>,
    pub job_kind: Option<String>,
    pub job_status: Option<String>,
    pub phase: Option<SyncPhase>,
    pub total_items: u64,
    pub processed_items: u64,
    pub failed_items: u64,
    pub current_item: Option<String>,
    pub percent_complete: f64,
    /// Present only when the job ended `failed`
    pub error: Option<String>,
    /// In-flight transfers keyed by item external id
    pub downloads: BTreeMap<String, DownloadProgress>,
}

impl ProgressSnapshot {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.state == ActivityState::Idle
    }

    /// Snapshot for a job that has just been accepted
    pub fn started(job_id: impl Into<String>, job_kind: impl Into<String>) -> Self {
        Self {
            state: ActivityState::Syncing,
            job_id: Some(job_id.into()),
            job_kind: Some(job_kind.into()),
            job_status: Some("running".to_string()),
            phase: Some(SyncPhase::RefreshChannel),
            ..Self::default()
        }
    }

    fn refresh_state(&mut self) {
        if self.job_status.as_deref() != Some("running") {
            self.state = ActivityState::Idle;
        } else if self.downloads.is_empty() {
            self.state = ActivityState::Syncing;
        } else {
            self.state = ActivityState::Downloading;
        }
    }

    /// Fold one event into the snapshot.
    pub fn apply(&mut self, event: &ArchiveEvent) {
        match event {
            ArchiveEvent::SyncProgress(progress) => {
                if self.job_id.as_deref() != Some(progress.job_id.as_str()) {
                    self.job_id = Some(progress.job_id.clone());
                    self.downloads.clear();
                }
                self.job_status = Some("running".to_string());
                self.phase = Some(progress.phase);
                self.total_items = progress.total;
                self.processed_items = progress.processed;
                self.failed_items = progress.failed;
                self.current_item = progress.current_item.clone();
                self.percent_complete = progress.percent_complete;
                self.error = None;
            }
            ArchiveEvent::DownloadProgress(progress) => {
                if progress.status.is_settled() {
                    self.downloads.remove(&progress.item_id);
                } else {
                    self.downloads
                        .insert(progress.item_id.clone(), progress.clone());
                }
            }
            ArchiveEvent::SyncCompleted { .. } | ArchiveEvent::SyncCancelled { .. } => {
                *self = ProgressSnapshot::idle();
            }
            ArchiveEvent::SyncError { job_id, error } => {
                self.job_id = Some(job_id.clone());
                self.job_status = Some("failed".to_string());
                self.error = Some(error.clone());
                self.current_item = None;
                self.downloads.clear();
            }
        }
        self.refresh_state();
    }
}

// ============================================================================
// Progress Hub
// ============================================================================

/// Identifier of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receive side of a subscription.
///
/// Dropping it is equivalent to unsubscribing; the hub notices on the next
/// publish.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<ArchiveEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. `None` once the hub dropped this subscriber.
    pub async fn recv(&mut self) -> Option<ArchiveEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<ArchiveEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<ArchiveEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<SubscriptionId, mpsc::Sender<ArchiveEvent>>,
    snapshot: ProgressSnapshot,
}

/// Multi-subscriber progress broadcaster and snapshot owner.
///
/// Cheap to clone; clones share the same subscriber set and snapshot.
#[derive(Clone)]
pub struct ProgressHub {
    state: Arc<Mutex<HubState>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl ProgressHub {
    /// Create a hub whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // A panic while holding the lock cannot leave the map half-written in
        // a way readers care about, so recover the guard.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.lock().subscribers.insert(id, sender);
        debug!(subscription = %id, "Progress subscriber added");
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().subscribers.remove(&id).is_some()
    }

    /// Fold `event` into the snapshot and fan it out.
    ///
    /// Never blocks and never fails. Subscribers that cannot take the event
    /// right now are dropped.
    pub fn publish(&self, event: ArchiveEvent) {
        let mut state = self.lock();
        state.snapshot.apply(&event);

        let before = state.subscribers.len();
        state
            .subscribers
            .retain(|_, sender| sender.try_send(event.clone()).is_ok());
        let removed = before - state.subscribers.len();

        if removed > 0 {
            debug!(
                removed,
                remaining = state.subscribers.len(),
                kind = event.kind(),
                "Dropped unresponsive progress subscribers"
            );
        }
    }

    /// Point-in-time copy of the current snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.lock().snapshot.clone()
    }

    /// Mutate the snapshot without broadcasting anything.
    pub fn update_snapshot<F>(&self, f: F)
    where
        F: FnOnce(&mut ProgressSnapshot),
    {
        let mut state = self.lock();
        f(&mut state.snapshot);
    }

    /// Reset the snapshot to idle
    pub fn reset(&self) {
        self.lock().snapshot = ProgressSnapshot::idle();
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl fmt::Debug for ProgressHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHub")
            .field("subscriber_count", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(job: &str, processed: u64, total: u64) -> ArchiveEvent {
        ArchiveEvent::SyncProgress(SyncProgress {
            job_id: job.to_string(),
            phase: SyncPhase::Items,
            total,
            processed,
            failed: 0,
            current_item: Some(format!("item-{}", processed)),
            percent_complete: SyncProgress::percent(processed, total),
        })
    }

    fn download(job: &str, item: &str, status: TransferState) -> ArchiveEvent {
        ArchiveEvent::DownloadProgress(DownloadProgress {
            job_id: job.to_string(),
            item_id: item.to_string(),
            title: None,
            progress: 50.0,
            rate: Some("1.0MiB/s".to_string()),
            eta: Some("00:05".to_string()),
            status,
        })
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = ProgressHub::new(4);
        hub.publish(progress("job-1", 1, 3));
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.snapshot().processed_items, 1);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let hub = ProgressHub::new(4);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(progress("job-1", 1, 2));

        assert_eq!(first.recv().await, Some(progress("job-1", 1, 2)));
        assert_eq!(second.recv().await, Some(progress("job-1", 1, 2)));
    }

    #[tokio::test]
    async fn test_full_subscriber_is_removed_others_still_receive() {
        let hub = ProgressHub::new(1);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.publish(progress("job-1", 1, 3));
        // Fast subscriber keeps up, slow one never reads.
        assert!(fast.recv().await.is_some());

        hub.publish(progress("job-1", 2, 3));
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(fast.recv().await, Some(progress("job-1", 2, 3)));

        // The slow subscriber still holds its first event, then sees closure.
        assert_eq!(slow.recv().await, Some(progress("job-1", 1, 3)));
        assert_eq!(slow.recv().await, None);
    }

    #[test]
    fn test_dropped_receiver_is_removed() {
        let hub = ProgressHub::new(4);
        let dropped = hub.subscribe();
        let mut kept = hub.subscribe();
        drop(dropped);

        hub.publish(progress("job-1", 1, 1));

        assert_eq!(hub.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_unsubscribe() {
        let hub = ProgressHub::new(4);
        let sub = hub.subscribe();
        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_snapshot_tracks_downloads() {
        let hub = ProgressHub::new(4);
        hub.update_snapshot(|s| *s = ProgressSnapshot::started("job-1", "full"));

        hub.publish(download("job-1", "abc", TransferState::Downloading));
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.state, ActivityState::Downloading);
        assert!(snapshot.downloads.contains_key("abc"));

        hub.publish(download("job-1", "abc", TransferState::Completed));
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.state, ActivityState::Syncing);
        assert!(snapshot.downloads.is_empty());
    }

    #[test]
    fn test_snapshot_resets_on_completion() {
        let hub = ProgressHub::new(4);
        hub.publish(progress("job-1", 3, 3));
        hub.publish(ArchiveEvent::SyncCompleted {
            job_id: "job-1".to_string(),
            total_synced: 3,
            failed: 0,
            duration_secs: 1,
        });

        assert!(hub.snapshot().is_idle());
        assert_eq!(hub.snapshot(), ProgressSnapshot::idle());
    }

    #[test]
    fn test_snapshot_keeps_error_text() {
        let hub = ProgressHub::new(4);
        hub.publish(progress("job-1", 1, 3));
        hub.publish(ArchiveEvent::SyncError {
            job_id: "job-1".to_string(),
            error: "API key rejected".to_string(),
        });

        let snapshot = hub.snapshot();
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.job_status.as_deref(), Some("failed"));
        assert_eq!(snapshot.error.as_deref(), Some("API key rejected"));
    }

    #[test]
    fn test_wire_format() {
        let event = ArchiveEvent::SyncCancelled {
            job_id: "job-9".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sync_cancelled");
        assert_eq!(json["data"]["job_id"], "job-9");

        let json = serde_json::to_value(download("job-9", "abc", TransferState::Processing)).unwrap();
        assert_eq!(json["type"], "download_progress");
        assert_eq!(json["data"]["status"], "processing");
    }

    #[test]
    fn test_percent() {
        assert_eq!(SyncProgress::percent(0, 0), 0.0);
        assert_eq!(SyncProgress::percent(1, 4), 25.0);
        assert_eq!(SyncProgress::percent(5, 4), 100.0);
    }
}
