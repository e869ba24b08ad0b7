//! Item repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::{Item, StorageStats};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};
use std::collections::HashSet;

/// Item repository interface for data access operations
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Find an item by its platform identifier
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Item>>;

    /// Insert an unseen item or merge metadata into an existing one
    ///
    /// Only the mutable metadata (title, description, counts, thumbnail,
    /// duration, publish time, metadata timestamp) is merged. Download state
    /// on an existing row is left untouched. Returns the stored row.
    async fn upsert_metadata(&self, item: &Item) -> Result<Item>;

    /// Record a completed media download
    async fn mark_downloaded(
        &self,
        external_id: &str,
        local_path: &str,
        thumbnail_path: Option<&str>,
        byte_size: i64,
        quality_label: &str,
    ) -> Result<()>;

    /// Flag an item as no longer available upstream
    async fn mark_unavailable(&self, external_id: &str) -> Result<()>;

    /// External ids of every downloaded item in a channel
    async fn downloaded_external_ids(&self, channel_id: &str) -> Result<HashSet<String>>;

    /// Query a channel's items, newest first
    async fn query_by_channel(
        &self,
        channel_id: &str,
        page_request: PageRequest,
    ) -> Result<Page<Item>>;

    /// Item counts and stored bytes across the whole catalog
    async fn storage_stats(&self) -> Result<StorageStats>;
}

/// SQLite implementation of ItemRepository
pub struct SqliteItemRepository {
    pool: SqlitePool,
}

impl SqliteItemRepository {
    /// Create a new SqliteItemRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Item>> {
        let item = query_as::<_, Item>("SELECT * FROM items WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn upsert_metadata(&self, item: &Item) -> Result<Item> {
        item.validate().map_err(|e| LibraryError::InvalidInput {
            field: "Item".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO items (
                id, external_id, channel_id, title, description, published_at,
                duration_secs, view_count, like_count, comment_count, thumbnail_url,
                local_path, thumbnail_local_path, byte_size, quality_label, is_downloaded,
                is_available, metadata_updated_at, downloaded_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                published_at = COALESCE(excluded.published_at, items.published_at),
                duration_secs = COALESCE(excluded.duration_secs, items.duration_secs),
                view_count = excluded.view_count,
                like_count = excluded.like_count,
                comment_count = excluded.comment_count,
                thumbnail_url = COALESCE(excluded.thumbnail_url, items.thumbnail_url),
                is_available = 1,
                metadata_updated_at = excluded.metadata_updated_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.id)
        .bind(&item.external_id)
        .bind(&item.channel_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.published_at)
        .bind(item.duration_secs)
        .bind(item.view_count)
        .bind(item.like_count)
        .bind(item.comment_count)
        .bind(&item.thumbnail_url)
        .bind(&item.local_path)
        .bind(&item.thumbnail_local_path)
        .bind(item.byte_size)
        .bind(&item.quality_label)
        .bind(item.is_downloaded)
        .bind(item.is_available)
        .bind(item.metadata_updated_at)
        .bind(item.downloaded_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_by_external_id(&item.external_id)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Item".to_string(),
                id: item.external_id.clone(),
            })
    }

    async fn mark_downloaded(
        &self,
        external_id: &str,
        local_path: &str,
        thumbnail_path: Option<&str>,
        byte_size: i64,
        quality_label: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = query(
            r#"
            UPDATE items
            SET local_path = ?,
                thumbnail_local_path = COALESCE(?, thumbnail_local_path),
                byte_size = ?, quality_label = ?, is_downloaded = 1,
                downloaded_at = ?, updated_at = ?
            WHERE external_id = ?
            "#,
        )
        .bind(local_path)
        .bind(thumbnail_path)
        .bind(byte_size)
        .bind(quality_label)
        .bind(now)
        .bind(now)
        .bind(external_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Item".to_string(),
                id: external_id.to_string(),
            });
        }

        Ok(())
    }

    async fn mark_unavailable(&self, external_id: &str) -> Result<()> {
        query("UPDATE items SET is_available = 0, updated_at = ? WHERE external_id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(external_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn downloaded_external_ids(&self, channel_id: &str) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            query_as("SELECT external_id FROM items WHERE channel_id = ? AND is_downloaded = 1")
                .bind(channel_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn query_by_channel(
        &self,
        channel_id: &str,
        page_request: PageRequest,
    ) -> Result<Page<Item>> {
        let total: i64 = query_as("SELECT COUNT(*) FROM items WHERE channel_id = ?")
            .bind(channel_id)
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        let items = query_as::<_, Item>(
            r#"
            SELECT * FROM items
            WHERE channel_id = ?
            ORDER BY published_at DESC, created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(channel_id)
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(items, total as u64, page_request))
    }

    async fn storage_stats(&self) -> Result<StorageStats> {
        let (total_items, downloaded_items, bytes_stored): (i64, i64, i64) = query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN is_downloaded = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_downloaded = 1 THEN byte_size ELSE 0 END), 0)
            FROM items
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StorageStats {
            total_items,
            downloaded_items,
            bytes_stored,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Channel;
    use crate::repositories::{ChannelRepository, SqliteChannelRepository};

    async fn setup() -> (SqliteItemRepository, Channel) {
        let pool = create_test_pool().await.unwrap();
        let channel = SqliteChannelRepository::new(pool.clone())
            .upsert(&Channel::new("UC123", "Archive"))
            .await
            .unwrap();
        (SqliteItemRepository::new(pool), channel)
    }

    #[tokio::test]
    async fn test_upsert_merges_metadata_and_keeps_download_state() {
        let (repo, channel) = setup().await;

        let mut item = Item::new(&channel.id, "vid-1", "Original");
        item.view_count = Some(5);
        let stored = repo.upsert_metadata(&item).await.unwrap();
        repo.mark_downloaded(
            "vid-1",
            "/storage/videos/vid-1/video.mp4",
            Some("/storage/videos/vid-1/thumbnail.jpg"),
            1024,
            "720p",
        )
        .await
        .unwrap();

        let mut update = Item::new(&channel.id, "vid-1", "Retitled");
        update.view_count = Some(50);
        let merged = repo.upsert_metadata(&update).await.unwrap();

        assert_eq!(merged.id, stored.id);
        assert_eq!(merged.title, "Retitled");
        assert_eq!(merged.view_count, Some(50));
        assert!(merged.is_downloaded);
        assert_eq!(merged.byte_size, Some(1024));
        assert_eq!(merged.quality_label.as_deref(), Some("720p"));
        assert_eq!(
            merged.thumbnail_local_path.as_deref(),
            Some("/storage/videos/vid-1/thumbnail.jpg")
        );
    }

    #[tokio::test]
    async fn test_downloaded_external_ids() {
        let (repo, channel) = setup().await;

        for id in ["a", "b", "c"] {
            repo.upsert_metadata(&Item::new(&channel.id, id, id)).await.unwrap();
        }
        repo.mark_downloaded("b", "/s/b", None, 10, "1080p").await.unwrap();

        let downloaded = repo.downloaded_external_ids(&channel.id).await.unwrap();
        assert_eq!(downloaded.len(), 1);
        assert!(downloaded.contains("b"));
    }

    #[tokio::test]
    async fn test_mark_downloaded_unknown_item() {
        let (repo, _) = setup().await;
        let result = repo.mark_downloaded("ghost", "/s/ghost", None, 1, "unknown").await;
        assert!(matches!(result, Err(LibraryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_storage_stats_and_paging() {
        let (repo, channel) = setup().await;

        for id in ["a", "b", "c"] {
            repo.upsert_metadata(&Item::new(&channel.id, id, id)).await.unwrap();
        }
        repo.mark_downloaded("a", "/s/a", None, 100, "1080p").await.unwrap();
        repo.mark_downloaded("c", "/s/c", None, 50, "480p").await.unwrap();
        repo.mark_unavailable("b").await.unwrap();

        let stats = repo.storage_stats().await.unwrap();
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.downloaded_items, 2);
        assert_eq!(stats.bytes_stored, 150);

        let page = repo
            .query_by_channel(&channel.id, PageRequest::new(0, 2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
        assert!(page.has_next());

        let b = repo.find_by_external_id("b").await.unwrap().unwrap();
        assert!(!b.is_available);
    }
}
