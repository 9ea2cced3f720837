//! Error types for trust chain verification.

use rcfg_core::{CoreError, VerificationError};
use rcfg_store::StoreError;
use thiserror::Error;

/// Errors returned by [`UptaneClient`](crate::UptaneClient).
#[derive(Debug, Error)]
pub enum UptaneError {
    /// The bundle failed verification. Nothing was committed.
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The requested path or document is not currently trusted.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("decode error: {0}")]
    Decode(#[from] CoreError),
}

/// Result type for verifier operations.
pub type Result<T> = std::result::Result<T, UptaneError>;
