//! # Sync Orchestration Engine
//!
//! Archives a channel's catalog: items, media, and comment threads.
//!
//! ## Overview
//!
//! This crate manages the lifecycle of archive jobs, including:
//! - Enumerating a channel's items via `MetadataClient`, page by page
//! - Upserting item metadata into the catalog
//! - Downloading media with retry and backoff via `MediaFetcher`
//! - Syncing two-level comment threads
//! - Resuming a job interrupted by a process restart
//!
//! ## Components
//!
//! - **Job State Machine** (`job`): Sync job lifecycle with validated state transitions
//! - **Queue Items** (`queue`): Per-item download records with retry bookkeeping
//! - **Job Store** (`repository`): Durable jobs, queue items, error log, history and settings
//! - **Download Coordinator** (`download`): One item's transfer, progress and retry outcome
//! - **Comment Sync** (`comments`): Paginated comment thread upsert
//! - **Sync Orchestrator** (`orchestrator`): Single-flight phase runner with cancel and resume
//! - **Auto-Sync Trigger** (`scheduler`): Daily job launcher

pub mod comments;
pub mod download;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod queue;
pub mod repository;
pub mod scheduler;

pub use comments::CommentSync;
pub use download::{DownloadCoordinator, DownloadResult, DownloadSettings};
pub use error::{Result, SyncError};
pub use job::{
    ErrorCategory, ErrorRecord, JobKind, SyncHistory, SyncJob, SyncJobId, SyncStatus, TimeFilter,
};
pub use orchestrator::SyncOrchestrator;
pub use queue::{QueueItem, QueueItemId, QueueStatus};
pub use repository::{JobStore, SqliteJobStore};
pub use scheduler::{next_occurrence, AutoSyncSettings, AutoSyncTrigger, JobLauncher};
