//! # rcfg core
//!
//! Pure primitives for the remote configuration client: signed metadata
//! documents, keys and digests, and the checks that decide whether a
//! document may be trusted.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Signed`] - A metadata document with its signatures
//! - [`RootMeta`], [`SnapshotMeta`], [`TargetsMeta`] - The three roles
//! - [`TargetDescriptor`] - Length and digests of a target file
//! - [`Product`], [`Client`], [`ConfigPath`] - Consumer-facing identifiers
//! - [`UpdateBundle`] - Metadata and target files fetched from the backend
//!
//! ## Signing
//!
//! Signatures cover the canonical JSON of the `signed` value. See the
//! [`canonical`] module.

pub mod bundle;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod metadata;
pub mod types;
pub mod validation;

pub use bundle::{RepositoryMetas, TargetFile, UpdateBundle};
pub use canonical::canonical_bytes;
pub use crypto::{Digest, Ed25519PublicKey, Ed25519Signature, HashAlgorithm, KeyId, Keypair};
pub use error::{CoreError, VerificationError};
pub use metadata::{
    Hashes, KeySignature, MetaFile, Metadata, Repository, Role, RoleKeys, RootMeta, Signed,
    SnapshotMeta, TargetDescriptor, TargetsMeta, BLOB_KEY_ALGORITHM, TARGETS_META_NAME,
};
pub use types::{now_millis, org_prefix, Client, ConfigPath, Product};
pub use validation::{
    check_not_expired, verify_hashes, verify_role_signatures, verify_same_target,
    verify_target_content,
};
