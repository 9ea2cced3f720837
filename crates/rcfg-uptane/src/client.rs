//! The verifying client.
//!
//! [`UptaneClient`] owns the trusted state of both repositories and the
//! target blob cache. All operations take a single async lock, so an update
//! is never observed half applied.

use std::collections::BTreeMap;

use bytes::Bytes;
use rcfg_core::{
    now_millis, org_prefix, verify_same_target, verify_target_content, CoreError, Digest,
    Repository, TargetDescriptor, TargetFile, UpdateBundle, VerificationError, BLOB_KEY_ALGORITHM,
};
use rcfg_store::{KvStore, StoreError, WriteBatch};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Result, UptaneError};
use crate::layout::StoreLayout;
use crate::repository::{RepositoryUpdate, TrustedRepository};
use crate::state::{RepositoryState, TrustState};

/// A trusted target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedFile {
    pub path: String,
    pub raw: Bytes,
}

/// A raw signed document and its version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMeta {
    pub version: u64,
    pub raw: Vec<u8>,
}

/// What a downstream consumer needs to verify and apply configuration on
/// its own, read as one consistent view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedConfigs {
    /// Director roots newer than the acknowledged version, oldest first.
    pub roots: Vec<RawMeta>,
    /// Director targets document. Version 0 and empty when nothing is
    /// trusted yet.
    pub targets: RawMeta,
    pub files: Vec<TrustedFile>,
}

struct Inner {
    config: TrustedRepository,
    director: TrustedRepository,
}

impl Inner {
    fn trust_state(&self) -> TrustState {
        TrustState::new(
            self.config.state(),
            self.director.state(),
            self.director.target_index(),
        )
    }
}

/// Verifies update bundles against the config and director repositories and
/// caches the result in a [`KvStore`].
pub struct UptaneClient<S: KvStore> {
    store: S,
    org_id: u64,
    layout: StoreLayout,
    inner: Mutex<Inner>,
}

impl<S: KvStore> UptaneClient<S> {
    /// Open a client over `store`, reloading whatever was persisted under
    /// `cache_key`.
    ///
    /// Persisted documents that no longer parse, or disagree with the
    /// recorded versions, are reported as [`StoreError::InvalidData`].
    pub async fn open(store: S, cache_key: impl Into<String>, org_id: u64) -> Result<Self> {
        let layout = StoreLayout::new(cache_key);
        let config = load_repository(&store, &layout, Repository::Config).await?;
        let director = load_repository(&store, &layout, Repository::Director).await?;

        tracing::debug!(
            org_id,
            config_root = config.state().root_version,
            director_root = director.state().root_version,
            director_targets = director.state().targets_version,
            "opened uptane client"
        );

        Ok(Self {
            store,
            org_id,
            layout,
            inner: Mutex::new(Inner { config, director }),
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn org_id(&self) -> u64 {
        self.org_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Update
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify and apply `bundle`.
    ///
    /// Either every document in the bundle becomes trusted, or the call
    /// fails and the trusted state is left exactly as it was.
    pub async fn update(&self, bundle: &UpdateBundle) -> Result<()> {
        self.update_at(bundle, now_millis()).await
    }

    /// [`update`](Self::update) with an explicit clock (Unix ms) for expiry
    /// checks.
    pub async fn update_at(&self, bundle: &UpdateBundle, now: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let result = self.apply_update(&mut inner, bundle, now).await;

        // Also runs after a rejected bundle, whose blobs nothing references.
        if let Err(e) = self.prune_blobs(&inner.director).await {
            tracing::warn!(error = %e, "failed to prune target blobs");
        }
        result
    }

    async fn apply_update(&self, inner: &mut Inner, bundle: &UpdateBundle, now: i64) -> Result<()> {
        // Blobs are keyed by their own digest, so storing them ahead of
        // verification cannot make anything trusted.
        self.store_blobs(&bundle.target_files).await?;

        let config = inner.config.verify_update(&bundle.config, now)?;
        let director = inner.director.verify_update(&bundle.director, now)?;
        check_bundle_files(&director.repo, &bundle.target_files)?;
        self.check_director_blobs(&director.repo).await?;
        check_cross_repository(&config.repo, &director.repo)?;
        check_org_prefix(&director.repo, self.org_id)?;

        let mut batch = WriteBatch::new();
        self.stage_commit(&mut batch, &config)?;
        self.stage_commit(&mut batch, &director)?;
        self.store.apply(batch).await?;

        for root in config.new_roots.iter().chain(&director.new_roots) {
            tracing::info!(version = root.doc.version(), "trusted new root metadata");
        }
        let previous = inner.director.state();
        inner.config = config.repo;
        inner.director = director.repo;
        let current = inner.director.state();

        if previous != current {
            tracing::info!(
                director_root = current.root_version,
                director_targets = current.targets_version,
                config_targets = inner.config.state().targets_version,
                targets = inner.director.target_entries().count(),
                "applied remote config update"
            );
        }
        Ok(())
    }

    async fn store_blobs(&self, files: &[TargetFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for file in files {
            let digest = Digest::compute(BLOB_KEY_ALGORITHM, &file.raw);
            batch.put(self.layout.blob(&digest), file.raw.clone());
        }
        self.store.apply(batch).await?;
        Ok(())
    }

    /// Every director target must resolve to a cached blob that matches its
    /// descriptor.
    async fn check_director_blobs(&self, director: &TrustedRepository) -> Result<()> {
        for (path, descriptor) in director.target_entries() {
            let digest = descriptor
                .blob_digest()
                .ok_or_else(|| VerificationError::MissingDigest {
                    path: path.clone(),
                    algorithm: BLOB_KEY_ALGORITHM,
                })?;
            let raw = self
                .store
                .get(&self.layout.blob(digest))
                .await?
                .ok_or_else(|| VerificationError::MissingTargetFile { path: path.clone() })?;
            verify_target_content(path, descriptor, &raw)?;
        }
        Ok(())
    }

    fn stage_commit(&self, batch: &mut WriteBatch, update: &RepositoryUpdate) -> Result<()> {
        let repo = &update.repo;
        let kind = repo.kind();
        for root in &update.new_roots {
            batch.put(self.layout.root(kind, root.doc.version()), root.raw.clone());
        }
        if let Some(snapshot) = repo.snapshot() {
            batch.put(self.layout.snapshot(kind), snapshot.raw.clone());
        }
        if let Some(targets) = repo.targets() {
            batch.put(self.layout.targets(kind), targets.raw.clone());
        }
        batch.put(self.layout.state(kind), repo.state().to_cbor()?);
        Ok(())
    }

    /// Delete cached blobs the director no longer references.
    async fn prune_blobs(&self, director: &TrustedRepository) -> Result<usize> {
        let referenced: Vec<String> = director
            .target_entries()
            .filter_map(|(_, descriptor)| descriptor.blob_digest())
            .map(|digest| self.layout.blob(digest))
            .collect();

        let mut batch = WriteBatch::new();
        for key in self.store.keys_with_prefix(&self.layout.blobs_prefix()).await? {
            if !referenced.contains(&key) {
                batch.delete(key);
            }
        }

        let pruned = batch.len();
        if pruned > 0 {
            self.store.apply(batch).await?;
            tracing::debug!(pruned, "pruned unreferenced target blobs");
        }
        Ok(pruned)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Currently trusted versions and director targets.
    pub async fn state(&self) -> TrustState {
        self.inner.lock().await.trust_state()
    }

    /// Director target index.
    pub async fn targets(&self) -> BTreeMap<String, TargetDescriptor> {
        self.inner.lock().await.director.target_index()
    }

    /// Content of a trusted target.
    ///
    /// Fails with [`UptaneError::NotFound`] when `path` is not a current
    /// director target, even if its blob is still cached.
    pub async fn target_file(&self, path: &str) -> Result<Bytes> {
        let inner = self.inner.lock().await;
        self.read_target(&inner.director, path).await
    }

    /// Raw director root document at `version`.
    pub async fn director_root(&self, version: u64) -> Result<Vec<u8>> {
        let inner = self.inner.lock().await;
        if version == 0 || version > inner.director.state().root_version {
            return Err(UptaneError::NotFound(format!("director root version {version}")));
        }
        self.store
            .get(&self.layout.root(Repository::Director, version))
            .await?
            .ok_or_else(|| UptaneError::NotFound(format!("director root version {version}")))
    }

    /// Raw director targets document.
    pub async fn targets_meta(&self) -> Result<Vec<u8>> {
        let inner = self.inner.lock().await;
        inner
            .director
            .targets()
            .map(|t| t.raw.clone())
            .ok_or_else(|| UptaneError::NotFound("director targets metadata".into()))
    }

    /// Director roots newer than `acknowledged_root`, the director targets
    /// document, and every trusted file for which `filter` returns true.
    ///
    /// Roots that were never cached (trusted on first use at a later
    /// version) are skipped. A `filter` error aborts the read.
    pub async fn configs_since<F>(&self, acknowledged_root: u64, mut filter: F) -> Result<TrustedConfigs>
    where
        F: FnMut(&str) -> std::result::Result<bool, CoreError>,
    {
        let inner = self.inner.lock().await;
        let director = &inner.director;

        let mut roots = Vec::new();
        for version in acknowledged_root.saturating_add(1)..=director.state().root_version {
            match self
                .store
                .get(&self.layout.root(Repository::Director, version))
                .await?
            {
                Some(raw) => roots.push(RawMeta { version, raw }),
                None => tracing::debug!(version, "director root not cached"),
            }
        }

        let mut paths = Vec::new();
        for (path, _) in director.target_entries() {
            if filter(path.as_str())? {
                paths.push(path.clone());
            }
        }
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = self.read_target(director, &path).await?;
            files.push(TrustedFile { path, raw });
        }

        Ok(TrustedConfigs {
            roots,
            targets: director
                .targets()
                .map(|t| RawMeta {
                    version: t.doc.version(),
                    raw: t.raw.clone(),
                })
                .unwrap_or_default(),
            files,
        })
    }

    async fn read_target(&self, director: &TrustedRepository, path: &str) -> Result<Bytes> {
        let not_found = || UptaneError::NotFound(path.to_string());
        let descriptor = director.target(path).ok_or_else(not_found)?;
        let digest = descriptor.blob_digest().ok_or_else(not_found)?;
        let raw = self
            .store
            .get(&self.layout.blob(digest))
            .await?
            .ok_or_else(|| StoreError::InvalidData(format!("blob for trusted target {path} missing")))?;
        verify_target_content(path, descriptor, &raw)?;
        Ok(Bytes::from(raw))
    }
}

async fn load_repository<S: KvStore>(
    store: &S,
    layout: &StoreLayout,
    kind: Repository,
) -> Result<TrustedRepository> {
    let Some(raw_state) = store.get(&layout.state(kind)).await? else {
        return Ok(TrustedRepository::empty(kind));
    };
    let state = RepositoryState::from_cbor(&raw_state)?;

    let root = store
        .get(&layout.root(kind, state.root_version))
        .await?
        .ok_or_else(|| {
            StoreError::InvalidData(format!("{kind} root version {} missing", state.root_version))
        })?;
    let snapshot = store.get(&layout.snapshot(kind)).await?;
    let targets = store.get(&layout.targets(kind)).await?;

    let repo =
        TrustedRepository::from_persisted(kind, &root, snapshot.as_deref(), targets.as_deref())
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
    if repo.state() != state {
        return Err(StoreError::InvalidData(format!(
            "{kind} documents disagree with recorded state {state:?}"
        ))
        .into());
    }
    Ok(repo)
}

/// Files shipped in the bundle for a director path must match the director
/// descriptor. Other files are ignored and pruned later.
fn check_bundle_files(
    director: &TrustedRepository,
    files: &[TargetFile],
) -> std::result::Result<(), VerificationError> {
    for file in files {
        match director.target(&file.path) {
            Some(descriptor) => verify_target_content(&file.path, descriptor, &file.raw)?,
            None => tracing::debug!(path = %file.path, "ignoring target file outside director targets"),
        }
    }
    Ok(())
}

fn check_cross_repository(
    config: &TrustedRepository,
    director: &TrustedRepository,
) -> std::result::Result<(), VerificationError> {
    for (path, descriptor) in director.target_entries() {
        let declared = config
            .target(path)
            .ok_or_else(|| VerificationError::MissingInConfig { path: path.clone() })?;
        verify_same_target(path, descriptor, declared)?;
    }
    Ok(())
}

fn check_org_prefix(
    director: &TrustedRepository,
    org_id: u64,
) -> std::result::Result<(), VerificationError> {
    let prefix = org_prefix(org_id);
    for (path, _) in director.target_entries() {
        if !path.starts_with(&prefix) {
            return Err(VerificationError::OrgPrefix {
                path: path.clone(),
                prefix,
            });
        }
    }
    Ok(())
}
