//! Remote Catalog Metadata Abstractions
//!
//! Describes the paginated remote collection the sync engine reads channel,
//! item and comment metadata from. Implementations wrap a platform data API
//! (quota-limited, key-authenticated) and translate its failures into
//! [`BridgeError`](crate::error::BridgeError) variants the engine can classify.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Channel-level metadata as reported by the remote platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub custom_url: Option<String>,
    pub subscriber_count: Option<i64>,
    pub item_count: Option<i64>,
    pub view_count: Option<i64>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
}

/// Lightweight item entry returned while enumerating a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub external_id: String,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// One page of a channel's item listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPage {
    pub items: Vec<ItemSummary>,
    /// Token for the following page, `None` on the last page
    pub next_page_token: Option<String>,
}

/// Authoritative per-item metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Duration in seconds
    pub duration_secs: Option<i64>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub thumbnail_url: Option<String>,
}

/// A single comment or reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteComment {
    pub external_id: String,
    /// External id of the comment this one replies to.
    ///
    /// Unset for top-level comments. For replies the engine falls back to
    /// the thread's top-level comment when this is absent.
    pub parent_external_id: Option<String>,
    pub author: String,
    pub author_channel_id: Option<String>,
    pub text: String,
    pub like_count: i64,
    pub reply_count: i64,
    pub published_at: Option<DateTime<Utc>>,
}

/// A top-level comment together with its flat reply list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentThread {
    pub comment: RemoteComment,
    pub replies: Vec<RemoteComment>,
}

/// One page of an item's comment threads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentPage {
    pub threads: Vec<CommentThread>,
    pub next_page_token: Option<String>,
}

/// Metadata-fetch client trait
///
/// Every call may fail with:
/// - [`BridgeError::RateLimited`](crate::error::BridgeError::RateLimited) when the quota is exhausted
/// - [`BridgeError::Unauthorized`](crate::error::BridgeError::Unauthorized) or
///   [`BridgeError::Configuration`](crate::error::BridgeError::Configuration) when the key is missing or rejected
/// - [`BridgeError::NotFound`](crate::error::BridgeError::NotFound) when the resource is gone
///
/// Timeouts are the implementation's responsibility and surface as
/// [`BridgeError::Timeout`](crate::error::BridgeError::Timeout).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::metadata::MetadataClient;
///
/// async fn count_items(client: &dyn MetadataClient, channel: &str) -> Result<usize> {
///     let mut total = 0;
///     let mut token = None;
///     loop {
///         let page = client.list_items(channel, None, token.as_deref()).await?;
///         total += page.items.len();
///         match page.next_page_token {
///             Some(next) => token = Some(next),
///             None => break,
///         }
///     }
///     Ok(total)
/// }
/// ```
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Fetch current channel statistics and branding
    async fn fetch_channel(&self, channel_ref: &str) -> Result<ChannelInfo>;

    /// List one page of a channel's items, newest first
    ///
    /// # Arguments
    ///
    /// * `channel_ref` - External channel identifier
    /// * `published_after` - Only return items published after this instant
    /// * `page_token` - Token from the previous page, `None` for the first page
    async fn list_items(
        &self,
        channel_ref: &str,
        published_after: Option<DateTime<Utc>>,
        page_token: Option<&str>,
    ) -> Result<ItemPage>;

    /// Fetch authoritative details for a batch of items
    ///
    /// Items that no longer exist upstream are omitted from the result.
    async fn fetch_item_details(&self, ids: &[String]) -> Result<Vec<ItemDetails>>;

    /// List one page of comment threads for an item
    async fn list_comments(&self, item_id: &str, page_token: Option<&str>) -> Result<CommentPage>;
}
