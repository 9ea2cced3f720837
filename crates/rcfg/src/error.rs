//! Error types for the distribution service.

use std::time::Duration;

use rcfg_store::StoreError;
use rcfg_uptane::UptaneError;
use thiserror::Error;

/// Errors from fetching an update bundle.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend unreachable or the exchange failed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with something that is not an update bundle.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

/// Errors that can occur in service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Verification or cache failure inside the trust chain.
    #[error("uptane error: {0}")]
    Uptane(#[from] UptaneError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A trusted target path does not have the config path shape.
    #[error("invalid config path: {0}")]
    InvalidConfigPath(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
