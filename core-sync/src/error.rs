use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("A sync job is already running: {job_id}")]
    AlreadyRunning { job_id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Sync job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Remote platform error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Catalog error: {0}")]
    Library(#[from] LibraryError),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid sync status: {0}")]
    InvalidStatus(String),

    #[error("Invalid job kind: {0}")]
    InvalidJobKind(String),

    #[error("Invalid time filter: {0}")]
    InvalidTimeFilter(String),

    #[error("Invalid queue status: {0}")]
    InvalidQueueStatus(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether this error must abort the whole run rather than one item.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Bridge(e) => e.is_fatal(),
            SyncError::Database(_) | SyncError::Internal(_) => true,
            SyncError::Library(LibraryError::Database(_))
            | SyncError::Library(LibraryError::Migration(_)) => true,
            _ => false,
        }
    }

    /// Category label used in the error log
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Bridge(e) => e.category(),
            SyncError::Library(_) | SyncError::Database(_) => "storage",
            SyncError::Cancelled => "cancelled",
            _ => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
