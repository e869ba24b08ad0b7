//! # Repository Pattern Implementation
//!
//! Repository traits and SQLite implementations for the archive catalog.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - Writes coming from the sync engine are upserts keyed by the platform's
//!   external id, so replaying a partially finished run is harmless
//! - Pagination is supported via the `Page<T>` wrapper
//!
//! ## Available Repositories
//!
//! - `ChannelRepository` - Archived channels and their statistics
//! - `ItemRepository` - Items with metadata and local download state
//! - `CommentRepository` - Two-level comment threads per item

pub mod channel;
pub mod comment;
pub mod item;
pub mod pagination;

pub use channel::{ChannelRepository, SqliteChannelRepository};
pub use comment::{CommentRepository, SqliteCommentRepository};
pub use item::{ItemRepository, SqliteItemRepository};
pub use pagination::{Page, PageRequest};
