//! Comment repository trait and implementation

use crate::error::{LibraryError, Result};
use crate::models::Comment;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Comment repository interface for data access operations
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Find a comment by its platform identifier
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Comment>>;

    /// Insert a new comment or refresh an existing one
    ///
    /// Existing rows only have text, like count and reply count refreshed;
    /// their parent and item links are never rewritten. Returns the stored row.
    async fn upsert(&self, comment: &Comment) -> Result<Comment>;

    /// Number of comments (including replies) stored for an item
    async fn count_for_item(&self, item_id: &str) -> Result<i64>;

    /// Direct replies to a comment, oldest first
    async fn replies_to(&self, parent_id: &str) -> Result<Vec<Comment>>;
}

/// SQLite implementation of CommentRepository
pub struct SqliteCommentRepository {
    pool: SqlitePool,
}

impl SqliteCommentRepository {
    /// Create a new SqliteCommentRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentRepository for SqliteCommentRepository {
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Comment>> {
        let comment = query_as::<_, Comment>("SELECT * FROM comments WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comment)
    }

    async fn upsert(&self, comment: &Comment) -> Result<Comment> {
        comment.validate().map_err(|e| LibraryError::InvalidInput {
            field: "Comment".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO comments (
                id, external_id, item_id, parent_id, author, author_channel_id,
                text, like_count, reply_count, published_at, is_top_level,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                text = excluded.text,
                like_count = excluded.like_count,
                reply_count = excluded.reply_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.external_id)
        .bind(&comment.item_id)
        .bind(&comment.parent_id)
        .bind(&comment.author)
        .bind(&comment.author_channel_id)
        .bind(&comment.text)
        .bind(comment.like_count)
        .bind(comment.reply_count)
        .bind(comment.published_at)
        .bind(comment.is_top_level)
        .bind(comment.created_at)
        .bind(comment.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_by_external_id(&comment.external_id)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Comment".to_string(),
                id: comment.external_id.clone(),
            })
    }

    async fn count_for_item(&self, item_id: &str) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM comments WHERE item_id = ?")
            .bind(item_id)
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn replies_to(&self, parent_id: &str) -> Result<Vec<Comment>> {
        let replies = query_as::<_, Comment>(
            "SELECT * FROM comments WHERE parent_id = ? ORDER BY published_at ASC, created_at ASC",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Channel, Item};
    use crate::repositories::{
        ChannelRepository, ItemRepository, SqliteChannelRepository, SqliteItemRepository,
    };
    use bridge_traits::metadata::RemoteComment;

    fn remote(id: &str, text: &str, likes: i64) -> RemoteComment {
        RemoteComment {
            external_id: id.to_string(),
            parent_external_id: None,
            author: "viewer".to_string(),
            author_channel_id: None,
            text: text.to_string(),
            like_count: likes,
            reply_count: 0,
            published_at: None,
        }
    }

    async fn setup() -> (SqliteCommentRepository, Item) {
        let pool = create_test_pool().await.unwrap();
        let channel = SqliteChannelRepository::new(pool.clone())
            .upsert(&Channel::new("UC123", "Archive"))
            .await
            .unwrap();
        let item = SqliteItemRepository::new(pool.clone())
            .upsert_metadata(&Item::new(&channel.id, "vid-1", "First"))
            .await
            .unwrap();
        (SqliteCommentRepository::new(pool), item)
    }

    #[tokio::test]
    async fn test_upsert_refreshes_mutable_fields() {
        let (repo, item) = setup().await;

        let first = repo
            .upsert(&Comment::from_remote(&item.id, None, &remote("c1", "hello", 1)))
            .await
            .unwrap();
        let second = repo
            .upsert(&Comment::from_remote(&item.id, None, &remote("c1", "hello (edited)", 9)))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.text, "hello (edited)");
        assert_eq!(second.like_count, 9);
        assert_eq!(repo.count_for_item(&item.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replies_link_to_parent() {
        let (repo, item) = setup().await;

        let parent = repo
            .upsert(&Comment::from_remote(&item.id, None, &remote("c1", "top", 0)))
            .await
            .unwrap();
        repo.upsert(&Comment::from_remote(
            &item.id,
            Some(parent.id.clone()),
            &remote("r1", "reply", 0),
        ))
        .await
        .unwrap();

        let replies = repo.replies_to(&parent.id).await.unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].external_id, "r1");
        assert!(!replies[0].is_top_level);
        assert_eq!(repo.count_for_item(&item.id).await.unwrap(), 2);
    }
}
