//! Signed metadata documents for the config and director repositories.
//!
//! Three roles are modelled: root (trusted keys and thresholds), snapshot
//! (pins the targets document) and targets (lists target files). Each
//! document travels as a [`Signed`] envelope whose signatures cover the
//! canonical encoding of the `signed` value.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_bytes;
use crate::crypto::{Digest, Ed25519PublicKey, Ed25519Signature, HashAlgorithm, KeyId, Keypair};
use crate::error::CoreError;

/// Name under which the snapshot pins the targets document.
pub const TARGETS_META_NAME: &str = "targets.json";

/// Digest that addresses target blobs in the cache.
pub const BLOB_KEY_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// Digests of a file, keyed by algorithm.
pub type Hashes = BTreeMap<HashAlgorithm, Digest>;

/// Metadata role, also used as the `_type` tag of each document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Root,
    Snapshot,
    Targets,
}

/// The two repositories of the trust chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repository {
    /// Independently signed superset of all configuration.
    Config,
    /// Decides which targets this client receives.
    Director,
}

impl Repository {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Director => "director",
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys allowed to sign for a role, and how many must agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: BTreeSet<KeyId>,
    pub threshold: u32,
}

/// Root metadata: the key set and thresholds of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMeta {
    #[serde(rename = "_type")]
    pub meta_type: Role,
    pub version: u64,
    /// Expiry as Unix milliseconds.
    pub expires: i64,
    pub keys: BTreeMap<KeyId, Ed25519PublicKey>,
    pub roles: BTreeMap<Role, RoleKeys>,
}

impl RootMeta {
    /// Resolve the public keys delegated to `role`.
    ///
    /// Key ids listed for the role but absent from `keys` are skipped.
    pub fn role_keys(&self, role: Role) -> Option<(u32, Vec<(&KeyId, &Ed25519PublicKey)>)> {
        let role_keys = self.roles.get(&role)?;
        let keys = role_keys
            .keyids
            .iter()
            .filter_map(|id| self.keys.get_key_value(id))
            .collect();
        Some((role_keys.threshold, keys))
    }

    /// First key id whose value is not the id of its key, if any.
    pub fn mismatched_key_id(&self) -> Option<&KeyId> {
        self.keys
            .iter()
            .find(|(id, key)| **id != key.key_id())
            .map(|(id, _)| id)
    }
}

/// Version, length and hashes of a metadata file pinned by the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u64,
    pub length: u64,
    pub hashes: Hashes,
}

/// Snapshot metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    #[serde(rename = "_type")]
    pub meta_type: Role,
    pub version: u64,
    pub expires: i64,
    pub meta: BTreeMap<String, MetaFile>,
}

/// A target file as declared in targets metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub length: u64,
    pub hashes: Hashes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl TargetDescriptor {
    /// Describe `content`, declaring a digest for every algorithm in `algorithms`.
    pub fn for_content(content: &[u8], algorithms: &[HashAlgorithm]) -> Self {
        let hashes = algorithms
            .iter()
            .map(|&alg| (alg, Digest::compute(alg, content)))
            .collect();
        Self {
            length: content.len() as u64,
            hashes,
            custom: None,
        }
    }

    /// The digest used to address this target's blob.
    pub fn blob_digest(&self) -> Option<&Digest> {
        self.hashes.get(&BLOB_KEY_ALGORITHM)
    }
}

/// Targets metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsMeta {
    #[serde(rename = "_type")]
    pub meta_type: Role,
    pub version: u64,
    pub expires: i64,
    pub targets: BTreeMap<String, TargetDescriptor>,
}

/// Common view over the three document kinds.
pub trait Metadata: Serialize + DeserializeOwned {
    const ROLE: Role;

    fn meta_type(&self) -> Role;
    fn version(&self) -> u64;
    fn expires(&self) -> i64;
}

macro_rules! impl_metadata {
    ($ty:ty, $role:expr) => {
        impl Metadata for $ty {
            const ROLE: Role = $role;

            fn meta_type(&self) -> Role {
                self.meta_type
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn expires(&self) -> i64 {
                self.expires
            }
        }
    };
}

impl_metadata!(RootMeta, Role::Root);
impl_metadata!(SnapshotMeta, Role::Snapshot);
impl_metadata!(TargetsMeta, Role::Targets);

/// One signature in a [`Signed`] envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySignature {
    pub keyid: KeyId,
    pub sig: Ed25519Signature,
}

/// A metadata document together with its signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signed: T,
    pub signatures: Vec<KeySignature>,
}

impl<T: Metadata> Signed<T> {
    /// Parse a raw document, checking that its `_type` matches `T`.
    pub fn from_slice(raw: &[u8]) -> Result<Self, CoreError> {
        let doc: Self =
            serde_json::from_slice(raw).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        if doc.signed.meta_type() != T::ROLE {
            return Err(CoreError::WrongMetadataType {
                expected: T::ROLE,
                got: doc.signed.meta_type(),
            });
        }
        Ok(doc)
    }

    /// Sign `signed` with every key in `keys`.
    pub fn sign(signed: T, keys: &[&Keypair]) -> Result<Self, CoreError> {
        let message = canonical_bytes(&signed)?;
        let signatures = keys
            .iter()
            .map(|kp| KeySignature {
                keyid: kp.key_id(),
                sig: kp.sign(&message),
            })
            .collect();
        Ok(Self { signed, signatures })
    }

    /// The bytes covered by the signatures.
    pub fn signed_bytes(&self) -> Result<Vec<u8>, CoreError> {
        canonical_bytes(&self.signed)
    }

    /// Encode the whole envelope as it travels on the wire.
    pub fn to_vec(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    pub fn version(&self) -> u64 {
        self.signed.version()
    }
}
