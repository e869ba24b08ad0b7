//! # Archive Catalog Module
//!
//! Owns the archive database and provides repository patterns for data access.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite connection pooling and schema migrations
//! - Repositories for channels, items and comments
//! - Pagination helpers shared with the sync job store

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
