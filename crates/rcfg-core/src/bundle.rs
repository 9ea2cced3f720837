//! Update bundles as delivered by the backend.

use serde::{Deserialize, Serialize};

/// Raw signed documents of one repository.
///
/// `roots` lists every root version the backend thinks the client may be
/// missing, oldest first. Documents are kept as received so they can be
/// handed on to downstream consumers byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetas {
    #[serde(default)]
    pub roots: Vec<Vec<u8>>,
    pub snapshot: Vec<u8>,
    pub targets: Vec<u8>,
}

/// Content of a target file, addressed by its path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFile {
    pub path: String,
    pub raw: Vec<u8>,
}

impl TargetFile {
    pub fn new(path: impl Into<String>, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            raw: raw.into(),
        }
    }
}

/// Metadata for both repositories plus the target files they reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBundle {
    pub config: RepositoryMetas,
    pub director: RepositoryMetas,
    #[serde(default)]
    pub target_files: Vec<TargetFile>,
}
