//! Error types for rcfg core.

use thiserror::Error;

use crate::crypto::HashAlgorithm;
use crate::metadata::{Repository, Role};

/// Core errors: key material and document decoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("expected {expected:?} metadata, got {got:?}")]
    WrongMetadataType { expected: Role, got: Role },

    #[error("invalid config path: {0}")]
    InvalidConfigPath(String),
}

/// Reasons a metadata bundle is refused.
///
/// Any of these aborts an update as a whole; nothing from the offending
/// bundle becomes trusted.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("{repo}: malformed {role:?} metadata: {reason}")]
    Malformed {
        repo: Repository,
        role: Role,
        reason: String,
    },

    #[error("{repo}: {role:?} signature threshold not met ({valid}/{threshold} valid signatures)")]
    ThresholdNotMet {
        repo: Repository,
        role: Role,
        valid: usize,
        threshold: u32,
    },

    #[error("{repo}: root metadata declares no usable {role:?} role")]
    MissingRole { repo: Repository, role: Role },

    #[error("{repo}: root key id {key_id} does not match its key")]
    KeyIdMismatch { repo: Repository, key_id: String },

    #[error("{repo}: no trusted root metadata")]
    NoTrustedRoot { repo: Repository },

    #[error("{repo}: root version {got} does not follow trusted version {trusted}")]
    RootVersionGap {
        repo: Repository,
        trusted: u64,
        got: u64,
    },

    #[error("{repo}: {role:?} version rollback from {trusted} to {got}")]
    Rollback {
        repo: Repository,
        role: Role,
        trusted: u64,
        got: u64,
    },

    #[error("{repo}: {role:?} version {version} re-signed with different content")]
    VersionReused {
        repo: Repository,
        role: Role,
        version: u64,
    },

    #[error("{repo}: {role:?} metadata expired at {expires}")]
    Expired {
        repo: Repository,
        role: Role,
        expires: i64,
    },

    #[error("{repo}: snapshot does not describe targets metadata: {reason}")]
    SnapshotMismatch { repo: Repository, reason: String },

    #[error("target {path}: length {actual} does not match declared {declared}")]
    LengthMismatch {
        path: String,
        declared: u64,
        actual: u64,
    },

    #[error("target {path}: {algorithm} digest does not match")]
    HashMismatch {
        path: String,
        algorithm: HashAlgorithm,
    },

    #[error("target {path}: no hashes declared")]
    NoHashes { path: String },

    #[error("target {path}: no {algorithm} digest declared")]
    MissingDigest {
        path: String,
        algorithm: HashAlgorithm,
    },

    #[error("target {path}: no target file available")]
    MissingTargetFile { path: String },

    #[error("director target {path} not found in config repository")]
    MissingInConfig { path: String },

    #[error("director target {path} has length {director} but config repository has {config}")]
    CrossRepoLength {
        path: String,
        director: u64,
        config: u64,
    },

    #[error("director target {path}: {algorithm} digest differs from config repository")]
    CrossRepoHash {
        path: String,
        algorithm: HashAlgorithm,
    },

    #[error("director target {path} is outside org prefix {prefix}")]
    OrgPrefix { path: String, prefix: String },
}
