use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Rate limited by remote platform: {0}")]
    RateLimited(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bridge misconfigured: {0}")]
    Configuration(String),

    #[error("Remote resource not found: {0}")]
    NotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this failure should abort a whole sync run.
    ///
    /// Authorization and configuration problems will fail identically for
    /// every subsequent call, so continuing past them only produces noise.
    /// Everything else is scoped to the call that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Unauthorized(_) | BridgeError::Configuration(_) | BridgeError::NotAvailable(_)
        )
    }

    /// Short category label used when the failure is written to the error log.
    pub fn category(&self) -> &'static str {
        match self {
            BridgeError::RateLimited(_) => "rate_limited",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::Timeout(_) => "timeout",
            BridgeError::Unauthorized(_) => "unauthorized",
            BridgeError::Configuration(_) | BridgeError::NotAvailable(_) => "configuration",
            BridgeError::OperationFailed(_) | BridgeError::Io(_) => "operation_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
