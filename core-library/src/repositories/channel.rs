//! Channel repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Channel;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Channel repository interface for data access operations
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Find a channel by its local ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Channel>>;

    /// Find a channel by its platform identifier
    ///
    /// # Returns
    /// - `Ok(Some(channel))` if found
    /// - `Ok(None)` if the channel has never been registered
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Channel>>;

    /// Insert or refresh a channel keyed by `external_id`
    ///
    /// Existing rows keep their local `id` and `created_at`; every other
    /// column is overwritten. Returns the stored row.
    async fn upsert(&self, channel: &Channel) -> Result<Channel>;

    /// List all registered channels
    async fn list(&self) -> Result<Vec<Channel>>;
}

/// SQLite implementation of ChannelRepository
pub struct SqliteChannelRepository {
    pool: SqlitePool,
}

impl SqliteChannelRepository {
    /// Create a new SqliteChannelRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelRepository for SqliteChannelRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Channel>> {
        let channel = query_as::<_, Channel>("SELECT * FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(channel)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Channel>> {
        let channel = query_as::<_, Channel>("SELECT * FROM channels WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(channel)
    }

    async fn upsert(&self, channel: &Channel) -> Result<Channel> {
        channel.validate().map_err(|e| LibraryError::InvalidInput {
            field: "Channel".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO channels (
                id, external_id, title, description, custom_url,
                subscriber_count, item_count, view_count, avatar_url, banner_url,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                custom_url = excluded.custom_url,
                subscriber_count = excluded.subscriber_count,
                item_count = excluded.item_count,
                view_count = excluded.view_count,
                avatar_url = excluded.avatar_url,
                banner_url = excluded.banner_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&channel.id)
        .bind(&channel.external_id)
        .bind(&channel.title)
        .bind(&channel.description)
        .bind(&channel.custom_url)
        .bind(channel.subscriber_count)
        .bind(channel.item_count)
        .bind(channel.view_count)
        .bind(&channel.avatar_url)
        .bind(&channel.banner_url)
        .bind(channel.created_at)
        .bind(channel.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_by_external_id(&channel.external_id)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Channel".to_string(),
                id: channel.external_id.clone(),
            })
    }

    async fn list(&self) -> Result<Vec<Channel>> {
        let channels = query_as::<_, Channel>("SELECT * FROM channels ORDER BY title ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(channels)
    }
}
