//! # rcfg Testkit
//!
//! Testing utilities for rcfg.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Signed config and director repositories that can publish
//!   targets, rotate root keys and produce update bundles
//! - **Generators**: Proptest strategies for products and clients
//!
//! ## Test Fixtures
//!
//! ```rust
//! use rcfg_testkit::Scenario;
//!
//! let mut scenario = Scenario::new(2);
//! let bundle = scenario.publish(&[("2/APM_SAMPLING/cfg-1/rules", "{}")]);
//! assert_eq!(bundle.target_files.len(), 1);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use rcfg_testkit::generators::client;
//!
//! proptest! {
//!     #[test]
//!     fn clients_have_ids(c in client()) {
//!         prop_assert!(!c.id.is_empty());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{descriptors, RepoFixture, Scenario, FAR_FUTURE};
