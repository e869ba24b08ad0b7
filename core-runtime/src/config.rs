//! # Archive Configuration Module
//!
//! Provides configuration management for the channel archive engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! [`ArchiveConfig`]. `build()` fills defaults and validates the result, so an
//! invalid configuration fails at startup rather than halfway through a sync.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::ArchiveConfig;
//!
//! let config = ArchiveConfig::builder()
//!     .database_path("/data/archive.db")
//!     .storage_path("/storage")
//!     .retry_ceiling(5)
//!     .auto_sync_time("04:30")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.retry_ceiling, 5);
//! assert_eq!(
//!     config.item_media_path("abc123"),
//!     std::path::PathBuf::from("/storage/videos/abc123/video.mp4")
//! );
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::ArchiveConfig;
//!
//! // Missing storage path
//! let config = ArchiveConfig::builder()
//!     .database_path("/data/archive.db")
//!     .build()
//!     .expect("Should fail - storage path is required");
//! ```

use crate::error::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Job kinds accepted as `default_job_kind`
pub const JOB_KIND_NAMES: &[&str] = &["full", "incremental", "metadata_only", "comments_only"];

/// Auto-sync settings applied when nothing has been persisted yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSyncDefaults {
    pub enabled: bool,
    /// Daily trigger time, UTC
    pub time_of_day: NaiveTime,
}

impl Default for AutoSyncDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            time_of_day: NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Root directory for downloaded media
    pub storage_path: PathBuf,

    /// Highest quality the media fetcher should request (e.g. "1080p")
    pub max_quality: String,

    /// Download attempts per item before it is marked failed
    pub retry_ceiling: u32,

    /// First retry delay; doubles with every attempt
    pub initial_backoff_ms: u64,

    /// Per-subscriber queue depth in the progress hub
    pub hub_capacity: usize,

    /// Depth of the worker-to-coordinator progress channel
    pub progress_channel_capacity: usize,

    /// Kind used by auto-sync and by callers that don't pick one
    pub default_job_kind: String,

    /// Whether full and incremental runs also fetch comments
    pub sync_comments: bool,

    /// Auto-sync settings used until the user saves their own
    pub auto_sync: AutoSyncDefaults,
}

impl ArchiveConfig {
    /// Creates a new builder for constructing an `ArchiveConfig`.
    pub fn builder() -> ArchiveConfigBuilder {
        ArchiveConfigBuilder::default()
    }

    /// Location of an item's stored media file
    pub fn item_media_path(&self, item_external_id: &str) -> PathBuf {
        self.item_dir(item_external_id).join("video.mp4")
    }

    /// Directory holding everything stored for one item
    pub fn item_dir(&self, item_external_id: &str) -> PathBuf {
        self.storage_path.join("videos").join(item_external_id)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.storage_path.as_os_str().is_empty() {
            return Err(Error::Config("Storage path cannot be empty".to_string()));
        }

        if self.retry_ceiling == 0 {
            return Err(Error::Config(
                "Retry ceiling must allow at least one attempt".to_string(),
            ));
        }

        if self.hub_capacity == 0 || self.progress_channel_capacity == 0 {
            return Err(Error::Config(
                "Channel capacities must be greater than 0".to_string(),
            ));
        }

        if !JOB_KIND_NAMES.contains(&self.default_job_kind.as_str()) {
            return Err(Error::Config(format!(
                "Unknown default job kind '{}'. Expected one of: {}",
                self.default_job_kind,
                JOB_KIND_NAMES.join(", ")
            )));
        }

        if !is_quality_label(&self.max_quality) {
            return Err(Error::Config(format!(
                "Invalid max quality '{}'. Expected a label like 1080p",
                self.max_quality
            )));
        }

        Ok(())
    }
}

fn is_quality_label(label: &str) -> bool {
    label
        .strip_suffix('p')
        .map(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Parse "HH:MM" (or "HH:MM:SS") into a time of day
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| Error::Config(format!("Invalid time of day '{}'. Use HH:MM", value)))
}

/// Builder for constructing [`ArchiveConfig`] instances.
#[derive(Debug, Default)]
pub struct ArchiveConfigBuilder {
    database_path: Option<PathBuf>,
    storage_path: Option<PathBuf>,
    max_quality: Option<String>,
    retry_ceiling: Option<u32>,
    initial_backoff_ms: Option<u64>,
    hub_capacity: Option<usize>,
    progress_channel_capacity: Option<usize>,
    default_job_kind: Option<String>,
    sync_comments: Option<bool>,
    auto_sync_enabled: Option<bool>,
    auto_sync_time: Option<String>,
}

impl ArchiveConfigBuilder {
    /// Sets the SQLite database path.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the media storage root.
    pub fn storage_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.storage_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn max_quality(mut self, quality: impl Into<String>) -> Self {
        self.max_quality = Some(quality.into());
        self
    }

    pub fn retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = Some(ceiling);
        self
    }

    pub fn initial_backoff_ms(mut self, millis: u64) -> Self {
        self.initial_backoff_ms = Some(millis);
        self
    }

    pub fn hub_capacity(mut self, capacity: usize) -> Self {
        self.hub_capacity = Some(capacity);
        self
    }

    pub fn progress_channel_capacity(mut self, capacity: usize) -> Self {
        self.progress_channel_capacity = Some(capacity);
        self
    }

    pub fn default_job_kind(mut self, kind: impl Into<String>) -> Self {
        self.default_job_kind = Some(kind.into());
        self
    }

    pub fn sync_comments(mut self, enabled: bool) -> Self {
        self.sync_comments = Some(enabled);
        self
    }

    pub fn auto_sync_enabled(mut self, enabled: bool) -> Self {
        self.auto_sync_enabled = Some(enabled);
        self
    }

    /// Daily auto-sync time as "HH:MM"
    pub fn auto_sync_time(mut self, time: impl Into<String>) -> Self {
        self.auto_sync_time = Some(time.into());
        self
    }

    /// Builds the final `ArchiveConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required path is missing or any value
    /// fails validation.
    pub fn build(self) -> Result<ArchiveConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let storage_path = self.storage_path.ok_or_else(|| {
            Error::Config("Storage path is required. Use .storage_path() to set it.".to_string())
        })?;

        let mut auto_sync = AutoSyncDefaults::default();
        if let Some(enabled) = self.auto_sync_enabled {
            auto_sync.enabled = enabled;
        }
        if let Some(time) = self.auto_sync_time {
            auto_sync.time_of_day = parse_time_of_day(&time)?;
        }

        let config = ArchiveConfig {
            database_path,
            storage_path,
            max_quality: self.max_quality.unwrap_or_else(|| "1080p".to_string()),
            retry_ceiling: self.retry_ceiling.unwrap_or(3),
            initial_backoff_ms: self.initial_backoff_ms.unwrap_or(100),
            hub_capacity: self.hub_capacity.unwrap_or(64),
            progress_channel_capacity: self.progress_channel_capacity.unwrap_or(32),
            default_job_kind: self
                .default_job_kind
                .unwrap_or_else(|| "incremental".to_string()),
            sync_comments: self.sync_comments.unwrap_or(true),
            auto_sync,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ArchiveConfigBuilder {
        ArchiveConfig::builder()
            .database_path("/tmp/archive.db")
            .storage_path("/tmp/storage")
    }

    #[test]
    fn test_defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.max_quality, "1080p");
        assert_eq!(config.retry_ceiling, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.default_job_kind, "incremental");
        assert!(config.sync_comments);
        assert!(!config.auto_sync.enabled);
        assert_eq!(
            config.auto_sync.time_of_day,
            NaiveTime::from_hms_opt(3, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_database_path() {
        let result = ArchiveConfig::builder().storage_path("/tmp/storage").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Database path")));
    }

    #[test]
    fn test_missing_storage_path() {
        let result = ArchiveConfig::builder().database_path("/tmp/a.db").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("Storage path")));
    }

    #[test]
    fn test_zero_retry_ceiling_rejected() {
        assert!(base().retry_ceiling(0).build().is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(base().hub_capacity(0).build().is_err());
        assert!(base().progress_channel_capacity(0).build().is_err());
    }

    #[test]
    fn test_unknown_job_kind_rejected() {
        let result = base().default_job_kind("everything").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("everything")));
    }

    #[test]
    fn test_quality_validation() {
        assert!(base().max_quality("720p").build().is_ok());
        assert!(base().max_quality("best").build().is_err());
        assert!(base().max_quality("p").build().is_err());
    }

    #[test]
    fn test_auto_sync_time_parsing() {
        let config = base().auto_sync_enabled(true).auto_sync_time("22:15").build().unwrap();
        assert!(config.auto_sync.enabled);
        assert_eq!(
            config.auto_sync.time_of_day,
            NaiveTime::from_hms_opt(22, 15, 0).unwrap()
        );

        assert!(base().auto_sync_time("25:00").build().is_err());
        assert!(parse_time_of_day("07:05:30").is_ok());
    }

    #[test]
    fn test_item_paths() {
        let config = base().build().unwrap();
        assert_eq!(
            config.item_media_path("abc"),
            PathBuf::from("/tmp/storage/videos/abc/video.mp4")
        );
    }
}
