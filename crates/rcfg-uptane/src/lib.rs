//! # rcfg uptane
//!
//! Verification of remote configuration against two independently signed
//! repositories.
//!
//! ## Overview
//!
//! The **config** repository lists every configuration that exists. The
//! **director** repository decides which of those this client receives.
//! A target is only trusted when both repositories describe it identically
//! and it lives under the client's organisation prefix.
//!
//! Each repository follows the usual chain of trust:
//!
//! - Root metadata names the keys and thresholds for every role. The first
//!   root is trusted on first use; each later root must be signed by both
//!   the previous and its own root keys.
//! - Snapshot metadata pins the exact targets document.
//! - Targets metadata lists paths with their length and digests.
//!
//! ## Key Types
//!
//! - [`UptaneClient`] - Applies update bundles and serves trusted reads
//! - [`TrustState`] - Versions and targets currently trusted
//! - [`RepositoryState`] - Per-repository versions, persisted as CBOR
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rcfg_store::MemoryStore;
//! use rcfg_uptane::UptaneClient;
//!
//! let client = UptaneClient::open(MemoryStore::new(), "us1/2/", 2).await?;
//! client.update(&bundle).await?;
//! let rules = client.target_file("2/APM_SAMPLING/cfg-1/rules").await?;
//! ```
//!
//! ## Design Notes
//!
//! Updates are all-or-nothing. Target blobs are cached under their SHA-256
//! before verification; everything else is written in a single store batch
//! after every check has passed, and blobs no longer referenced are pruned
//! afterwards.

pub mod client;
pub mod error;
mod layout;
mod repository;
pub mod state;

pub use client::{RawMeta, TrustedConfigs, TrustedFile, UptaneClient};
pub use error::{Result, UptaneError};
pub use state::{RepositoryState, TrustState};
