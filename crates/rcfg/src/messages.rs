//! Messages exchanged with the backend and with downstream clients.

use std::collections::BTreeSet;

use bytes::Bytes;
use rcfg_core::{Client, Product};
use rcfg_uptane::{RawMeta, TrustState};
use serde::{Deserialize, Serialize};

/// What the service tells the backend when asking for updates.
///
/// All-zero versions ask for a full bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestConfigsRequest {
    pub config_root_version: u64,
    pub config_snapshot_version: u64,
    pub config_targets_version: u64,
    pub director_root_version: u64,
    pub director_snapshot_version: u64,
    pub director_targets_version: u64,
    pub active_clients: Vec<Client>,
    /// Products already confirmed by an earlier successful fetch.
    pub products: BTreeSet<Product>,
    /// Products requested for the first time.
    pub new_products: BTreeSet<Product>,
}

impl LatestConfigsRequest {
    pub fn new(
        previous: &TrustState,
        active_clients: Vec<Client>,
        products: BTreeSet<Product>,
        new_products: BTreeSet<Product>,
    ) -> Self {
        Self {
            config_root_version: previous.config_root_version,
            config_snapshot_version: previous.config_snapshot_version,
            config_targets_version: previous.config_targets_version,
            director_root_version: previous.director_root_version,
            director_snapshot_version: previous.director_snapshot_version,
            director_targets_version: previous.director_targets_version,
            active_clients,
            products,
            new_products,
        }
    }
}

/// A client polling for its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientGetConfigsRequest {
    pub client: Client,
    /// Latest director root version the client has verified.
    pub acknowledged_root_version: u64,
}

/// A trusted configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub path: String,
    pub raw: Bytes,
}

/// Everything a client needs to verify and apply its configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientGetConfigsResponse {
    /// Director roots the client has not acknowledged yet, oldest first.
    pub roots: Vec<RawMeta>,
    /// Current director targets document.
    pub targets: RawMeta,
    /// Trusted files for the client's products.
    pub config_files: Vec<ConfigFile>,
}

/// Pushed to subscribers after a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    /// Director targets version this update reflects.
    pub targets_version: u64,
    pub config_files: Vec<ConfigFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_wire_encoding() {
        let response = ClientGetConfigsResponse {
            roots: vec![RawMeta {
                version: 2,
                raw: b"{\"signed\":{}}".to_vec(),
            }],
            targets: RawMeta {
                version: 5,
                raw: b"{}".to_vec(),
            },
            config_files: vec![ConfigFile {
                path: "2/APM_SAMPLING/cfg/rules".into(),
                raw: Bytes::from_static(b"rate: 0.5"),
            }],
        };

        let json = serde_json::to_vec(&response).unwrap();
        let decoded: ClientGetConfigsResponse = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, response);
    }
}
