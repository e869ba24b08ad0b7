use thiserror::Error;

/// Catalog storage failures
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity_type} not in catalog: {id}")]
    NotFound { entity_type: String, id: String },

    /// A row failed model validation before it was written
    #[error("Rejected {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
