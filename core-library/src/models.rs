//! Domain models for the local archive catalog
//!
//! Every entity carries two identities: a local UUID `id` used for foreign
//! keys, and the platform's `external_id` used for upserts.

use bridge_traits::metadata::{ChannelInfo, ItemDetails, RemoteComment};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// Domain Models
// =============================================================================

/// Archived channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Channel {
    /// Unique identifier
    pub id: String,
    /// Platform channel identifier
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub custom_url: Option<String>,

    // Statistics
    pub subscriber_count: Option<i64>,
    pub item_count: Option<i64>,
    pub view_count: Option<i64>,

    // Branding
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,

    // Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Channel {
    /// Create a new channel with only its identity filled in
    pub fn new(external_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.into(),
            title: title.into(),
            description: None,
            custom_url: None,
            subscriber_count: None,
            item_count: None,
            view_count: None,
            avatar_url: None,
            banner_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a channel record from remote metadata
    pub fn from_remote(info: &ChannelInfo) -> Self {
        Self {
            description: info.description.clone(),
            custom_url: info.custom_url.clone(),
            subscriber_count: info.subscriber_count,
            item_count: info.item_count,
            view_count: info.view_count,
            avatar_url: info.avatar_url.clone(),
            banner_url: info.banner_url.clone(),
            ..Self::new(info.external_id.clone(), info.title.clone())
        }
    }

    /// Validate channel data
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("Channel external id cannot be empty".to_string());
        }

        if self.title.trim().is_empty() {
            return Err("Channel title cannot be empty".to_string());
        }

        Ok(())
    }
}

/// One archived content item (a video)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Item {
    /// Unique identifier
    pub id: String,
    /// Platform item identifier
    pub external_id: String,
    /// Owning channel
    pub channel_id: String,

    // Metadata
    pub title: String,
    pub description: Option<String>,
    /// Publish time, Unix seconds
    pub published_at: Option<i64>,
    pub duration_secs: Option<i64>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub thumbnail_url: Option<String>,

    // Local media
    pub local_path: Option<String>,
    pub thumbnail_local_path: Option<String>,
    pub byte_size: Option<i64>,
    pub quality_label: Option<String>,
    pub is_downloaded: bool,
    /// Cleared when the platform reports the item gone
    pub is_available: bool,

    // Timestamps
    pub metadata_updated_at: Option<i64>,
    pub downloaded_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    /// Create a new, not yet downloaded item
    pub fn new(
        channel_id: impl Into<String>,
        external_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: external_id.into(),
            channel_id: channel_id.into(),
            title: title.into(),
            description: None,
            published_at: None,
            duration_secs: None,
            view_count: None,
            like_count: None,
            comment_count: None,
            thumbnail_url: None,
            local_path: None,
            thumbnail_local_path: None,
            byte_size: None,
            quality_label: None,
            is_downloaded: false,
            is_available: true,
            metadata_updated_at: None,
            downloaded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build an item record from authoritative remote details
    pub fn from_details(channel_id: impl Into<String>, details: &ItemDetails) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            description: details.description.clone(),
            published_at: details.published_at.map(|t| t.timestamp()),
            duration_secs: details.duration_secs,
            view_count: details.view_count,
            like_count: details.like_count,
            comment_count: details.comment_count,
            thumbnail_url: details.thumbnail_url.clone(),
            metadata_updated_at: Some(now),
            ..Self::new(channel_id, details.external_id.clone(), details.title.clone())
        }
    }

    /// Validate item data
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("Item external id cannot be empty".to_string());
        }

        if let Some(duration) = self.duration_secs {
            if duration < 0 {
                return Err("Item duration cannot be negative".to_string());
            }
        }

        if self.is_downloaded && self.local_path.is_none() {
            return Err("Downloaded item must have a local path".to_string());
        }

        Ok(())
    }
}

/// Comment or reply on an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    /// Unique identifier
    pub id: String,
    /// Platform comment identifier
    pub external_id: String,
    /// Item this comment belongs to
    pub item_id: String,
    /// Local id of the parent comment, for replies
    pub parent_id: Option<String>,
    pub author: String,
    pub author_channel_id: Option<String>,
    pub text: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub published_at: Option<i64>,
    pub is_top_level: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Comment {
    /// Build a comment record from the remote shape
    pub fn from_remote(
        item_id: impl Into<String>,
        parent_id: Option<String>,
        remote: &RemoteComment,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: remote.external_id.clone(),
            item_id: item_id.into(),
            is_top_level: parent_id.is_none(),
            parent_id,
            author: remote.author.clone(),
            author_channel_id: remote.author_channel_id.clone(),
            text: remote.text.clone(),
            like_count: remote.like_count,
            reply_count: remote.reply_count,
            published_at: remote.published_at.map(|t| t.timestamp()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate comment data
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("Comment external id cannot be empty".to_string());
        }

        if self.is_top_level == self.parent_id.is_some() {
            return Err("Top-level comments cannot have a parent and replies must".to_string());
        }

        if self.like_count < 0 || self.reply_count < 0 {
            return Err("Comment counters cannot be negative".to_string());
        }

        Ok(())
    }
}

/// Aggregate storage figures for the overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_items: i64,
    pub downloaded_items: i64,
    pub bytes_stored: i64,
}
