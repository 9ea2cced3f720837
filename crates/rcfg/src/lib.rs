//! # rcfg
//!
//! Remote configuration client: fetches signed configuration from an
//! untrusted backend, verifies it, and serves it to local consumers.
//!
//! ## Overview
//!
//! - **Trust chain**: Every bundle is checked against two independently
//!   signed repositories before anything in it is used (see
//!   [`uptane`]).
//! - **Clients**: Local consumers announce themselves and the products they
//!   want; the service asks the backend on behalf of every active client.
//! - **Pull API**: Consumers poll with [`DistributionService::get_configs_for`]
//!   and verify what they receive themselves.
//! - **Subscribers**: Optional in-process callbacks notified after each
//!   successful refresh.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rcfg::backend::memory::StaticBackend;
//! use rcfg::store::SqliteStore;
//! use rcfg::{Client, ClientGetConfigsRequest, DistributionService, ServiceConfig};
//!
//! async fn example() -> rcfg::Result<()> {
//!     let store = SqliteStore::open("rcfg.db")?;
//!     let config = ServiceConfig {
//!         org_id: 2,
//!         datacenter: "us1".into(),
//!         ..Default::default()
//!     };
//!     let service = Arc::new(DistributionService::new(config, store, StaticBackend::new()).await?);
//!
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let refresh_loop = service.start(shutdown_rx);
//!
//!     let response = service
//!         .get_configs_for(&ClientGetConfigsRequest {
//!             client: Client::new("tracer-1", ["APM_SAMPLING"]),
//!             acknowledged_root_version: 0,
//!         })
//!         .await?;
//!     println!("{} config files", response.config_files.len());
//!
//!     let _ = shutdown_tx.send(true);
//!     let _ = refresh_loop.await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `rcfg::core` - Metadata, keys, digests and identifiers
//! - `rcfg::store` - Key-value storage abstraction and SQLite
//! - `rcfg::uptane` - Trust chain verification

pub mod backend;
pub mod clients;
pub mod config;
pub mod error;
pub mod messages;
pub mod service;
pub mod subscribers;

// Re-export component crates
pub use rcfg_core as core;
pub use rcfg_store as store;
pub use rcfg_uptane as uptane;

// Re-export main types for convenience
pub use backend::{Backend, RetryingBackend};
pub use clients::ClientTracker;
pub use config::{RetryPolicy, ServiceConfig};
pub use error::{BackendError, Result, ServiceError};
pub use messages::{
    ClientGetConfigsRequest, ClientGetConfigsResponse, ConfigFile, ConfigUpdate,
    LatestConfigsRequest,
};
pub use service::DistributionService;
pub use subscribers::{SubscriberCallback, SubscriberId, SubscriptionRecord};

// Re-export commonly used core types
pub use rcfg_core::{Client, Product, UpdateBundle};
pub use rcfg_uptane::{RawMeta, TrustState};
