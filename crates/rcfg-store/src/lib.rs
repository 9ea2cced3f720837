//! # rcfg store
//!
//! Durable key/value storage for the remote configuration cache. Provides a
//! trait-based interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The trust-chain verifier persists metadata documents, repository state
//! and target blobs through the [`KvStore`] trait, so it never depends on a
//! particular backend. The primary implementation is [`SqliteStore`], with
//! [`MemoryStore`] for testing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rcfg_store::{KvStore, SqliteStore, WriteBatch};
//!
//! async fn example() {
//!     let store = SqliteStore::open("remote-config.db").unwrap();
//!
//!     let mut batch = WriteBatch::new();
//!     batch.put("datadoghq.com/2/director/state", vec![1, 2, 3]);
//!     store.apply(batch).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic batches**: `apply` commits every write or none
//! - **Opaque values**: the store never interprets bytes
//! - **Prefix listing**: used to prune blobs no longer referenced

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KvStore, WriteBatch, WriteOp};
