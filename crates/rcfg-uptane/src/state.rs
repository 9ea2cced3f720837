//! Version bookkeeping for both repositories.

use std::collections::BTreeMap;

use rcfg_core::TargetDescriptor;
use rcfg_store::StoreError;
use serde::{Deserialize, Serialize};

/// Trusted versions of one repository's documents.
///
/// Zero means "nothing trusted yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryState {
    pub root_version: u64,
    pub snapshot_version: u64,
    pub targets_version: u64,
}

impl RepositoryState {
    /// Encode as CBOR for persistence.
    pub fn to_cbor(&self) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a persisted record.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, StoreError> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}

/// A consistent view of everything the verifier currently trusts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustState {
    pub config_root_version: u64,
    pub config_snapshot_version: u64,
    pub config_targets_version: u64,
    pub director_root_version: u64,
    pub director_snapshot_version: u64,
    pub director_targets_version: u64,
    /// Director target index.
    pub targets: BTreeMap<String, TargetDescriptor>,
}

impl TrustState {
    pub(crate) fn new(
        config: RepositoryState,
        director: RepositoryState,
        targets: BTreeMap<String, TargetDescriptor>,
    ) -> Self {
        Self {
            config_root_version: config.root_version,
            config_snapshot_version: config.snapshot_version,
            config_targets_version: config.targets_version,
            director_root_version: director.root_version,
            director_snapshot_version: director.snapshot_version,
            director_targets_version: director.targets_version,
            targets,
        }
    }

    /// True when no update has ever been accepted.
    pub fn is_empty(&self) -> bool {
        self.config_root_version == 0 && self.director_root_version == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_state_cbor() {
        let state = RepositoryState {
            root_version: 3,
            snapshot_version: 10,
            targets_version: 9,
        };
        let decoded = RepositoryState::from_cbor(&state.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_garbage_state_is_invalid_data() {
        let err = RepositoryState::from_cbor(b"\xff\x00garbage").unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));
    }

    #[test]
    fn test_default_trust_state_is_empty() {
        assert!(TrustState::default().is_empty());
    }
}
