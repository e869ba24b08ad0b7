//! Media Transfer Abstractions
//!
//! A [`MediaFetcher`] downloads a single item's media to local storage and
//! reports byte-level progress through a [`ProgressSink`] while it runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

/// Raw transfer progress reported by a media fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub bytes_downloaded: u64,
    /// Total size, when the remote end advertised one
    pub bytes_total: Option<u64>,
    /// Display string for the instantaneous transfer rate (e.g. "2.4MiB/s")
    pub rate_label: Option<String>,
    /// Display string for the remaining time (e.g. "00:12")
    pub eta_label: Option<String>,
}

impl TransferProgress {
    pub fn new(bytes_downloaded: u64, bytes_total: Option<u64>) -> Self {
        Self {
            bytes_downloaded,
            bytes_total,
            rate_label: None,
            eta_label: None,
        }
    }

    pub fn with_labels(mut self, rate: impl Into<String>, eta: impl Into<String>) -> Self {
        self.rate_label = Some(rate.into());
        self.eta_label = Some(eta.into());
        self
    }

    /// Completed fraction in `[0, 1]`; zero when the total is unknown.
    pub fn fraction(&self) -> f64 {
        match self.bytes_total {
            Some(total) if total > 0 => {
                (self.bytes_downloaded as f64 / total as f64).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }
}

/// Receiver for transfer progress.
///
/// Called from whatever execution context the fetcher runs on, so
/// implementations must only hand the event off and return.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: TransferProgress);
}

/// Successful media transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDownload {
    pub local_path: PathBuf,
    /// Thumbnail stored next to the media, if the fetcher saved one
    pub thumbnail_path: Option<PathBuf>,
    pub byte_size: u64,
    /// Vertical resolution of the stored stream, when known
    pub height: Option<u32>,
}

impl MediaDownload {
    /// Quality label such as `"1080p"`, or `"unknown"`.
    pub fn quality_label(&self) -> String {
        match self.height {
            Some(h) => format!("{}p", h),
            None => "unknown".to_string(),
        }
    }
}

/// Media-fetch client trait
///
/// Implementations typically shell out to an external downloader or stream
/// over HTTP. The sync engine runs each call on its own task, so a fetcher
/// may take as long as the transfer needs.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::media::{MediaFetcher, ProgressSink, TransferProgress};
///
/// struct PrintSink;
///
/// impl ProgressSink for PrintSink {
///     fn report(&self, p: TransferProgress) {
///         println!("{:.0}%", p.fraction() * 100.0);
///     }
/// }
///
/// let outcome = fetcher.download("abc123", Arc::new(PrintSink)).await?;
/// ```
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the media for `item_id`, reporting progress to `sink`
    async fn download(&self, item_id: &str, sink: Arc<dyn ProgressSink>) -> Result<MediaDownload>;
}
