//! # Comment Sync
//!
//! Pages through an item's remote comment threads and upserts them into the
//! catalog.
//!
//! Threads are two levels deep: a top-level comment and a flat reply list.
//! A reply naming its own parent is attached to that parent when the parent
//! is known locally, otherwise to the thread's top-level comment.

use crate::Result;
use bridge_traits::metadata::{CommentThread, MetadataClient};
use core_library::models::Comment;
use core_library::repositories::CommentRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Upserts remote comment threads for catalog items
pub struct CommentSync {
    metadata: Arc<dyn MetadataClient>,
    comments: Arc<dyn CommentRepository>,
}

impl CommentSync {
    pub fn new(metadata: Arc<dyn MetadataClient>, comments: Arc<dyn CommentRepository>) -> Self {
        Self { metadata, comments }
    }

    /// Sync every comment page of one item
    ///
    /// `item_id` is the local catalog id, `item_external_id` the platform id
    /// used to list comments. Returns the number of comments and replies
    /// written.
    #[instrument(skip(self), fields(item = %item_external_id))]
    pub async fn sync_item(&self, item_id: &str, item_external_id: &str) -> Result<u64> {
        let mut written = 0u64;
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .metadata
                .list_comments(item_external_id, page_token.as_deref())
                .await?;

            for thread in &page.threads {
                written += self.upsert_thread(item_id, thread).await?;
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(written, "Comment sync finished");
        Ok(written)
    }

    async fn upsert_thread(&self, item_id: &str, thread: &CommentThread) -> Result<u64> {
        let root = self
            .comments
            .upsert(&Comment::from_remote(item_id, None, &thread.comment))
            .await?;

        // external id -> local id for everything seen in this thread
        let mut known: HashMap<String, String> = HashMap::new();
        known.insert(root.external_id.clone(), root.id.clone());
        let mut written = 1u64;

        for reply in &thread.replies {
            let parent_id = match reply.parent_external_id.as_deref() {
                Some(parent) if parent != root.external_id => {
                    self.resolve_parent(parent, &known).await?
                }
                _ => None,
            }
            .unwrap_or_else(|| root.id.clone());

            let stored = self
                .comments
                .upsert(&Comment::from_remote(item_id, Some(parent_id), reply))
                .await?;
            known.insert(stored.external_id, stored.id);
            written += 1;
        }

        Ok(written)
    }

    async fn resolve_parent(
        &self,
        parent_external_id: &str,
        known: &HashMap<String, String>,
    ) -> Result<Option<String>> {
        if let Some(id) = known.get(parent_external_id) {
            return Ok(Some(id.clone()));
        }

        Ok(self
            .comments
            .find_by_external_id(parent_external_id)
            .await?
            .map(|comment| comment.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::metadata::{
        ChannelInfo, CommentPage, ItemDetails, ItemPage, RemoteComment,
    };
    use chrono::{DateTime, Utc};
    use core_library::create_test_pool;
    use core_library::models::{Channel, Item};
    use core_library::repositories::{
        ChannelRepository, ItemRepository, SqliteChannelRepository, SqliteCommentRepository,
        SqliteItemRepository,
    };

    fn remote(id: &str, parent: Option<&str>, text: &str) -> RemoteComment {
        RemoteComment {
            external_id: id.to_string(),
            parent_external_id: parent.map(str::to_string),
            author: "viewer".to_string(),
            author_channel_id: None,
            text: text.to_string(),
            like_count: 0,
            reply_count: 0,
            published_at: None,
        }
    }

    /// Serves two pages of comments for any item
    struct PagedComments;

    #[async_trait]
    impl MetadataClient for PagedComments {
        async fn fetch_channel(&self, channel_ref: &str) -> BridgeResult<ChannelInfo> {
            Err(BridgeError::NotFound(channel_ref.to_string()))
        }

        async fn list_items(
            &self,
            _channel_ref: &str,
            _published_after: Option<DateTime<Utc>>,
            _page_token: Option<&str>,
        ) -> BridgeResult<ItemPage> {
            Ok(ItemPage::default())
        }

        async fn fetch_item_details(&self, _ids: &[String]) -> BridgeResult<Vec<ItemDetails>> {
            Ok(Vec::new())
        }

        async fn list_comments(
            &self,
            _item_id: &str,
            page_token: Option<&str>,
        ) -> BridgeResult<CommentPage> {
            match page_token {
                None => Ok(CommentPage {
                    threads: vec![CommentThread {
                        comment: remote("c1", None, "first!"),
                        replies: vec![
                            remote("r1", Some("c1"), "reply to c1"),
                            remote("r2", Some("r1"), "reply to r1"),
                            remote("r3", Some("ghost"), "parent unknown"),
                        ],
                    }],
                    next_page_token: Some("p2".to_string()),
                }),
                Some(_) => Ok(CommentPage {
                    threads: vec![CommentThread {
                        comment: remote("c2", None, "second"),
                        replies: vec![],
                    }],
                    next_page_token: None,
                }),
            }
        }
    }

    async fn setup() -> (CommentSync, Arc<SqliteCommentRepository>, Item) {
        let pool = create_test_pool().await.unwrap();
        let channel = SqliteChannelRepository::new(pool.clone())
            .upsert(&Channel::new("UC123", "Archive"))
            .await
            .unwrap();
        let item = SqliteItemRepository::new(pool.clone())
            .upsert_metadata(&Item::new(&channel.id, "vid-1", "First"))
            .await
            .unwrap();
        let repo = Arc::new(SqliteCommentRepository::new(pool));
        let sync = CommentSync::new(Arc::new(PagedComments), repo.clone());
        (sync, repo, item)
    }

    #[tokio::test]
    async fn test_pages_and_reply_parents() {
        let (sync, repo, item) = setup().await;

        let written = sync.sync_item(&item.id, &item.external_id).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(repo.count_for_item(&item.id).await.unwrap(), 5);

        let c1 = repo.find_by_external_id("c1").await.unwrap().unwrap();
        let r1 = repo.find_by_external_id("r1").await.unwrap().unwrap();
        let r2 = repo.find_by_external_id("r2").await.unwrap().unwrap();
        let r3 = repo.find_by_external_id("r3").await.unwrap().unwrap();

        assert!(c1.is_top_level);
        assert_eq!(r1.parent_id.as_deref(), Some(c1.id.as_str()));
        // Attached to the immediate parent, not flattened
        assert_eq!(r2.parent_id.as_deref(), Some(r1.id.as_str()));
        assert_eq!(r3.parent_id.as_deref(), Some(c1.id.as_str()));
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let (sync, repo, item) = setup().await;

        sync.sync_item(&item.id, &item.external_id).await.unwrap();
        sync.sync_item(&item.id, &item.external_id).await.unwrap();

        assert_eq!(repo.count_for_item(&item.id).await.unwrap(), 5);
    }
}
