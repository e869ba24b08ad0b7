//! # Host Bridge Traits
//!
//! External collaborator contracts consumed by the archive sync engine.
//!
//! ## Overview
//!
//! The engine never talks to the remote platform directly. Every capability
//! that leaves the process is expressed as a trait here and injected by the
//! host:
//!
//! ### Remote catalog
//! - [`MetadataClient`](metadata::MetadataClient) - Paginated channel, item and comment listings
//!
//! ### Media transfer
//! - [`MediaFetcher`](media::MediaFetcher) - Single-item downloader emitting byte progress
//! - [`ProgressSink`](media::ProgressSink) - Receiver for that progress
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map platform failures onto the closest variant so the engine can
//! tell a rate limit (skip and continue) from a rejected key (abort the run):
//!
//! ```ignore
//! match response.status() {
//!     403 if body.contains("quotaExceeded") => Err(BridgeError::RateLimited(body)),
//!     403 | 401 => Err(BridgeError::Unauthorized(body)),
//!     404 => Err(BridgeError::NotFound(id.to_string())),
//!     _ => Err(BridgeError::OperationFailed(body)),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across the orchestrator task and the download workers.

pub mod error;
pub mod media;
pub mod metadata;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use media::{MediaDownload, MediaFetcher, ProgressSink, TransferProgress};
pub use metadata::{
    ChannelInfo, CommentPage, CommentThread, ItemDetails, ItemPage, ItemSummary, MetadataClient,
    RemoteComment,
};
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
