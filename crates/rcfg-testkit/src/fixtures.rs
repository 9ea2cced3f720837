//! Test fixtures and helpers.
//!
//! Signed repositories with deterministic keys, so bundles built in
//! different tests (or on different runs) are byte-identical.

use std::collections::BTreeMap;

use rcfg_core::{
    Digest, HashAlgorithm, Keypair, MetaFile, Metadata, RepositoryMetas, Role, RoleKeys,
    RootMeta, Signed, SnapshotMeta, TargetDescriptor, TargetFile, TargetsMeta, UpdateBundle,
    TARGETS_META_NAME,
};

/// Expiry used by every fixture document: 2100-01-01.
pub const FAR_FUTURE: i64 = 4_102_444_800_000;

const ROOT_THRESHOLD: u32 = 2;

fn key(seed: u8, index: u8) -> Keypair {
    let mut bytes = [seed; 32];
    bytes[0] = index;
    Keypair::from_seed(&bytes)
}

fn root_key_set(seed: u8) -> Vec<Keypair> {
    vec![key(seed, 0), key(seed, 1)]
}

fn sign<T: Metadata>(meta: T, keys: &[&Keypair]) -> Vec<u8> {
    Signed::sign(meta, keys)
        .and_then(|signed| signed.to_vec())
        .expect("fixture metadata encodes")
}

/// Describe `files` with SHA-256 and SHA-512 digests.
pub fn descriptors(files: &[(&str, &str)]) -> BTreeMap<String, TargetDescriptor> {
    files
        .iter()
        .map(|(path, content)| {
            let mut descriptor = TargetDescriptor::for_content(
                content.as_bytes(),
                &[HashAlgorithm::Sha256, HashAlgorithm::Sha512],
            );
            descriptor.custom = Some(serde_json::json!({ "v": 1 }));
            (path.to_string(), descriptor)
        })
        .collect()
}

/// One signed repository: root history plus the current snapshot and
/// targets.
///
/// Root keys are a pair with threshold 2. Snapshot and targets are signed
/// by one key each, and those keys survive root rotation.
pub struct RepoFixture {
    root_keys: Vec<Keypair>,
    snapshot_key: Keypair,
    targets_key: Keypair,
    roots: Vec<Vec<u8>>,
    snapshot_version: u64,
    targets_version: u64,
    targets: BTreeMap<String, TargetDescriptor>,
    /// Expiry (Unix ms) of documents signed from now on.
    pub expires: i64,
}

impl RepoFixture {
    /// Create a repository whose keys derive from `seed`, with root v1.
    pub fn new(seed: u8) -> Self {
        let mut fixture = Self {
            root_keys: root_key_set(seed),
            snapshot_key: key(seed, 2),
            targets_key: key(seed, 3),
            roots: Vec::new(),
            snapshot_version: 0,
            targets_version: 0,
            targets: BTreeMap::new(),
            expires: FAR_FUTURE,
        };
        let signers: Vec<&Keypair> = fixture.root_keys.iter().collect();
        let root = sign(fixture.root_meta(1, &fixture.root_keys), &signers);
        fixture.roots.push(root);
        fixture
    }

    fn root_meta(&self, version: u64, root_keys: &[Keypair]) -> RootMeta {
        let mut keys = BTreeMap::new();
        for kp in root_keys.iter().chain([&self.snapshot_key, &self.targets_key]) {
            keys.insert(kp.key_id(), kp.public_key());
        }

        let mut roles = BTreeMap::new();
        roles.insert(
            Role::Root,
            RoleKeys {
                keyids: root_keys.iter().map(Keypair::key_id).collect(),
                threshold: ROOT_THRESHOLD,
            },
        );
        roles.insert(
            Role::Snapshot,
            RoleKeys {
                keyids: [self.snapshot_key.key_id()].into_iter().collect(),
                threshold: 1,
            },
        );
        roles.insert(
            Role::Targets,
            RoleKeys {
                keyids: [self.targets_key.key_id()].into_iter().collect(),
                threshold: 1,
            },
        );

        RootMeta {
            meta_type: Role::Root,
            version,
            expires: self.expires,
            keys,
            roles,
        }
    }

    /// Latest root version.
    pub fn root_version(&self) -> u64 {
        self.roots.len() as u64
    }

    /// Every root version, oldest first.
    pub fn roots(&self) -> &[Vec<u8>] {
        &self.roots
    }

    /// Raw root document at `version`.
    pub fn root(&self, version: u64) -> &[u8] {
        &self.roots[(version - 1) as usize]
    }

    /// The current root at `version`, signed by arbitrary keys.
    pub fn root_signed_with(&self, version: u64, signers: &[&Keypair]) -> Vec<u8> {
        sign(self.root_meta(version, &self.root_keys), signers)
    }

    /// Append a root that hands the root role to keys derived from `seed`,
    /// signed by both the outgoing and incoming keys.
    pub fn rotate_root(&mut self, seed: u8) {
        let new_keys = root_key_set(seed);
        let meta = self.root_meta(self.root_version() + 1, &new_keys);
        let signers: Vec<&Keypair> = self.root_keys.iter().chain(&new_keys).collect();
        self.roots.push(sign(meta, &signers));
        self.root_keys = new_keys;
    }

    /// A rotated root signed only by the incoming keys. Not recorded.
    pub fn rotated_root_without_old_signatures(&self, seed: u8) -> Vec<u8> {
        let new_keys = root_key_set(seed);
        let meta = self.root_meta(self.root_version() + 1, &new_keys);
        let signers: Vec<&Keypair> = new_keys.iter().collect();
        sign(meta, &signers)
    }

    /// Publish a new snapshot and targets version listing `targets`.
    pub fn publish(&mut self, targets: BTreeMap<String, TargetDescriptor>) -> RepositoryMetas {
        self.snapshot_version += 1;
        self.targets_version += 1;
        self.targets = targets;
        self.current()
    }

    /// The latest published documents, signed again.
    pub fn current(&self) -> RepositoryMetas {
        self.metas_at(
            self.snapshot_version,
            self.targets_version,
            self.targets.clone(),
        )
    }

    /// Sign arbitrary snapshot and targets versions without recording them.
    pub fn metas_at(
        &self,
        snapshot_version: u64,
        targets_version: u64,
        targets: BTreeMap<String, TargetDescriptor>,
    ) -> RepositoryMetas {
        self.metas_with_pin(snapshot_version, targets_version, targets, |_| {})
    }

    /// Like [`metas_at`](Self::metas_at), letting `pin` alter the snapshot's
    /// `targets.json` entry before the snapshot is signed.
    pub fn metas_with_pin(
        &self,
        snapshot_version: u64,
        targets_version: u64,
        targets: BTreeMap<String, TargetDescriptor>,
        pin: impl FnOnce(&mut MetaFile),
    ) -> RepositoryMetas {
        let targets_raw = sign(
            TargetsMeta {
                meta_type: Role::Targets,
                version: targets_version,
                expires: self.expires,
                targets,
            },
            &[&self.targets_key],
        );

        let mut hashes = BTreeMap::new();
        hashes.insert(
            HashAlgorithm::Sha256,
            Digest::compute(HashAlgorithm::Sha256, &targets_raw),
        );
        let mut pinned = MetaFile {
            version: targets_version,
            length: targets_raw.len() as u64,
            hashes,
        };
        pin(&mut pinned);
        let mut meta = BTreeMap::new();
        meta.insert(TARGETS_META_NAME.to_string(), pinned);
        let snapshot_raw = sign(
            SnapshotMeta {
                meta_type: Role::Snapshot,
                version: snapshot_version,
                expires: self.expires,
                meta,
            },
            &[&self.snapshot_key],
        );

        RepositoryMetas {
            roots: self.roots.clone(),
            snapshot: snapshot_raw,
            targets: targets_raw,
        }
    }
}

/// A config and a director repository for one organisation.
pub struct Scenario {
    pub org_id: u64,
    pub config: RepoFixture,
    pub director: RepoFixture,
}

impl Scenario {
    pub fn new(org_id: u64) -> Self {
        Self {
            org_id,
            config: RepoFixture::new(10),
            director: RepoFixture::new(20),
        }
    }

    /// Publish `files` in both repositories and ship their content.
    pub fn publish(&mut self, files: &[(&str, &str)]) -> UpdateBundle {
        self.publish_split(files, files)
    }

    /// Publish different target lists in each repository. Content is
    /// shipped for the director's files.
    pub fn publish_split(
        &mut self,
        config_files: &[(&str, &str)],
        director_files: &[(&str, &str)],
    ) -> UpdateBundle {
        UpdateBundle {
            config: self.config.publish(descriptors(config_files)),
            director: self.director.publish(descriptors(director_files)),
            target_files: director_files
                .iter()
                .map(|(path, content)| TargetFile::new(*path, content.as_bytes()))
                .collect(),
        }
    }

    /// A bundle of the latest documents of both repositories, with content
    /// for `files`.
    pub fn current(&self, files: &[(&str, &str)]) -> UpdateBundle {
        UpdateBundle {
            config: self.config.current(),
            director: self.director.current(),
            target_files: files
                .iter()
                .map(|(path, content)| TargetFile::new(*path, content.as_bytes()))
                .collect(),
        }
    }
}
