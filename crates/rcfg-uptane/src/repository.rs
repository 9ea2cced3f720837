//! Verification of a single repository's metadata.
//!
//! A [`TrustedRepository`] holds the documents currently trusted for one
//! repository. [`TrustedRepository::verify_update`] checks an incoming set of
//! documents against it and, when every check passes, yields the candidate
//! that replaces it. Nothing here touches the store.

use std::collections::BTreeMap;

use rcfg_core::{
    check_not_expired, verify_hashes, verify_role_signatures, Metadata, Repository,
    RepositoryMetas, Role, RootMeta, Signed, SnapshotMeta, TargetDescriptor, TargetsMeta,
    VerificationError, TARGETS_META_NAME,
};

use crate::state::RepositoryState;

/// A parsed document together with the bytes it arrived as.
#[derive(Debug, Clone)]
pub(crate) struct Trusted<T> {
    pub doc: Signed<T>,
    pub raw: Vec<u8>,
}

impl<T: Metadata> Trusted<T> {
    fn parse(repo: Repository, raw: &[u8]) -> Result<Self, VerificationError> {
        let doc = Signed::from_slice(raw).map_err(|e| VerificationError::Malformed {
            repo,
            role: T::ROLE,
            reason: e.to_string(),
        })?;
        Ok(Self {
            doc,
            raw: raw.to_vec(),
        })
    }

    fn version(&self) -> u64 {
        self.doc.version()
    }
}

/// Documents currently trusted for one repository.
///
/// An empty repository has no root. Snapshot and targets are only ever set
/// together with a root.
#[derive(Debug, Clone)]
pub(crate) struct TrustedRepository {
    kind: Repository,
    root: Option<Trusted<RootMeta>>,
    snapshot: Option<Trusted<SnapshotMeta>>,
    targets: Option<Trusted<TargetsMeta>>,
}

/// A verified candidate plus the root documents it newly accepted.
#[derive(Debug)]
pub(crate) struct RepositoryUpdate {
    pub repo: TrustedRepository,
    pub new_roots: Vec<Trusted<RootMeta>>,
}

impl TrustedRepository {
    pub fn empty(kind: Repository) -> Self {
        Self {
            kind,
            root: None,
            snapshot: None,
            targets: None,
        }
    }

    /// Rebuild from persisted raw documents.
    ///
    /// Signatures are not re-checked: the documents were verified before
    /// they were written.
    pub fn from_persisted(
        kind: Repository,
        root: &[u8],
        snapshot: Option<&[u8]>,
        targets: Option<&[u8]>,
    ) -> Result<Self, VerificationError> {
        Ok(Self {
            kind,
            root: Some(Trusted::parse(kind, root)?),
            snapshot: snapshot.map(|raw| Trusted::parse(kind, raw)).transpose()?,
            targets: targets.map(|raw| Trusted::parse(kind, raw)).transpose()?,
        })
    }

    pub fn kind(&self) -> Repository {
        self.kind
    }

    pub fn state(&self) -> RepositoryState {
        RepositoryState {
            root_version: self.root.as_ref().map_or(0, Trusted::version),
            snapshot_version: self.snapshot.as_ref().map_or(0, Trusted::version),
            targets_version: self.targets.as_ref().map_or(0, Trusted::version),
        }
    }

    pub fn snapshot(&self) -> Option<&Trusted<SnapshotMeta>> {
        self.snapshot.as_ref()
    }

    pub fn targets(&self) -> Option<&Trusted<TargetsMeta>> {
        self.targets.as_ref()
    }

    /// Trusted target index, empty when nothing is trusted yet.
    pub fn target_index(&self) -> BTreeMap<String, TargetDescriptor> {
        self.targets
            .as_ref()
            .map(|t| t.doc.signed.targets.clone())
            .unwrap_or_default()
    }

    pub fn target_entries(&self) -> impl Iterator<Item = (&String, &TargetDescriptor)> {
        self.targets.iter().flat_map(|t| t.doc.signed.targets.iter())
    }

    pub fn target(&self, path: &str) -> Option<&TargetDescriptor> {
        self.targets.as_ref()?.doc.signed.targets.get(path)
    }

    /// Verify `metas` against the trusted documents at time `now` (Unix ms).
    pub fn verify_update(
        &self,
        metas: &RepositoryMetas,
        now: i64,
    ) -> Result<RepositoryUpdate, VerificationError> {
        let repo = self.kind;
        let (root, new_roots) = self.verify_root_chain(&metas.roots)?;
        check_not_expired(repo, &root.doc, now)?;
        let root_meta = &root.doc.signed;

        let snapshot = Trusted::<SnapshotMeta>::parse(repo, &metas.snapshot)?;
        verify_role_signatures(repo, root_meta, Role::Snapshot, &snapshot.doc)?;
        check_not_expired(repo, &snapshot.doc, now)?;
        check_not_rolled_back(repo, self.snapshot.as_ref(), &snapshot)?;

        let targets = Trusted::<TargetsMeta>::parse(repo, &metas.targets)?;
        verify_role_signatures(repo, root_meta, Role::Targets, &targets.doc)?;
        check_not_expired(repo, &targets.doc, now)?;
        check_not_rolled_back(repo, self.targets.as_ref(), &targets)?;

        check_snapshot_pins_targets(repo, &snapshot, &targets)?;

        Ok(RepositoryUpdate {
            repo: Self {
                kind: repo,
                root: Some(root),
                snapshot: Some(snapshot),
                targets: Some(targets),
            },
            new_roots,
        })
    }

    /// Walk `roots` from the trusted root, accepting each successor.
    ///
    /// Versions at or below the trusted one are skipped. With nothing
    /// trusted, the first root is accepted on its own signatures.
    fn verify_root_chain(
        &self,
        roots: &[Vec<u8>],
    ) -> Result<(Trusted<RootMeta>, Vec<Trusted<RootMeta>>), VerificationError> {
        let repo = self.kind;
        let mut current = self.root.clone();
        let mut accepted = Vec::new();

        for raw in roots {
            let candidate = Trusted::<RootMeta>::parse(repo, raw)?;
            if let Some(key_id) = candidate.doc.signed.mismatched_key_id() {
                return Err(VerificationError::KeyIdMismatch {
                    repo,
                    key_id: key_id.to_string(),
                });
            }

            match &current {
                None => {
                    verify_role_signatures(repo, &candidate.doc.signed, Role::Root, &candidate.doc)?;
                }
                Some(trusted) => {
                    let trusted_version = trusted.version();
                    if candidate.version() <= trusted_version {
                        continue;
                    }
                    if candidate.version() != trusted_version + 1 {
                        return Err(VerificationError::RootVersionGap {
                            repo,
                            trusted: trusted_version,
                            got: candidate.version(),
                        });
                    }
                    verify_role_signatures(repo, &trusted.doc.signed, Role::Root, &candidate.doc)?;
                    verify_role_signatures(
                        repo,
                        &candidate.doc.signed,
                        Role::Root,
                        &candidate.doc,
                    )?;
                }
            }

            tracing::debug!(
                repo = %repo,
                version = candidate.version(),
                "accepted root metadata"
            );
            accepted.push(candidate.clone());
            current = Some(candidate);
        }

        let root = current.ok_or(VerificationError::NoTrustedRoot { repo })?;
        Ok((root, accepted))
    }
}

/// Versions may not decrease, and a repeated version must carry the same
/// signed content.
fn check_not_rolled_back<T: Metadata>(
    repo: Repository,
    trusted: Option<&Trusted<T>>,
    incoming: &Trusted<T>,
) -> Result<(), VerificationError> {
    let Some(trusted) = trusted else {
        return Ok(());
    };
    let (old, new) = (trusted.version(), incoming.version());
    if new < old {
        return Err(VerificationError::Rollback {
            repo,
            role: T::ROLE,
            trusted: old,
            got: new,
        });
    }
    if new == old {
        let malformed = |e: rcfg_core::CoreError| VerificationError::Malformed {
            repo,
            role: T::ROLE,
            reason: e.to_string(),
        };
        let old_bytes = trusted.doc.signed_bytes().map_err(malformed)?;
        let new_bytes = incoming.doc.signed_bytes().map_err(malformed)?;
        if old_bytes != new_bytes {
            return Err(VerificationError::VersionReused {
                repo,
                role: T::ROLE,
                version: new,
            });
        }
    }
    Ok(())
}

/// The snapshot must pin exactly this targets document.
///
/// Version and length are always compared. Hashes are optional in the pin;
/// every declared one must match.
fn check_snapshot_pins_targets(
    repo: Repository,
    snapshot: &Trusted<SnapshotMeta>,
    targets: &Trusted<TargetsMeta>,
) -> Result<(), VerificationError> {
    let mismatch = |reason: String| VerificationError::SnapshotMismatch { repo, reason };

    let pinned = snapshot
        .doc
        .signed
        .meta
        .get(TARGETS_META_NAME)
        .ok_or_else(|| mismatch(format!("no {TARGETS_META_NAME} entry")))?;

    if pinned.version != targets.version() {
        return Err(mismatch(format!(
            "pins version {} but targets is version {}",
            pinned.version,
            targets.version()
        )));
    }
    let actual = targets.raw.len() as u64;
    if pinned.length != actual {
        return Err(mismatch(format!(
            "pins length {} but targets is {actual} bytes",
            pinned.length
        )));
    }
    if !pinned.hashes.is_empty() {
        verify_hashes(TARGETS_META_NAME, pinned.length, &pinned.hashes, &targets.raw)
            .map_err(|e| mismatch(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcfg_core::Keypair;
    use rcfg_testkit::{descriptors, RepoFixture, FAR_FUTURE};

    const NOW: i64 = 1_700_000_000_000;

    fn publish(fixture: &mut RepoFixture, files: &[(&str, &str)]) -> RepositoryMetas {
        fixture.publish(descriptors(files))
    }

    #[test]
    fn test_first_update_trusts_root_on_first_use() {
        let mut fixture = RepoFixture::new(1);
        let metas = publish(&mut fixture, &[("2/P/c/a", "a")]);

        let update = TrustedRepository::empty(Repository::Config)
            .verify_update(&metas, NOW)
            .unwrap();

        assert_eq!(update.new_roots.len(), 1);
        assert_eq!(
            update.repo.state(),
            RepositoryState {
                root_version: 1,
                snapshot_version: 1,
                targets_version: 1
            }
        );
        assert!(update.repo.target("2/P/c/a").is_some());
    }

    #[test]
    fn test_first_root_must_be_self_signed() {
        let mut fixture = RepoFixture::new(1);
        let mut metas = publish(&mut fixture, &[]);
        let intruder = Keypair::from_seed(&[99; 32]);
        metas.roots = vec![fixture.root_signed_with(1, &[&intruder])];

        let err = TrustedRepository::empty(Repository::Config)
            .verify_update(&metas, NOW)
            .unwrap_err();
        assert!(matches!(err, VerificationError::ThresholdNotMet { role: Role::Root, .. }));
    }

    #[test]
    fn test_no_roots_and_nothing_trusted() {
        let mut fixture = RepoFixture::new(1);
        let mut metas = publish(&mut fixture, &[]);
        metas.roots.clear();

        let err = TrustedRepository::empty(Repository::Director)
            .verify_update(&metas, NOW)
            .unwrap_err();
        assert!(matches!(err, VerificationError::NoTrustedRoot { .. }));
    }

    #[test]
    fn test_root_rotation_and_gap() {
        let mut fixture = RepoFixture::new(1);
        let metas = publish(&mut fixture, &[]);
        let trusted = TrustedRepository::empty(Repository::Config)
            .verify_update(&metas, NOW)
            .unwrap()
            .repo;

        fixture.rotate_root(7);
        fixture.rotate_root(8);
        let metas = publish(&mut fixture, &[]);

        // Both new versions in order are fine.
        let rotated = trusted.verify_update(&metas, NOW).unwrap();
        assert_eq!(rotated.repo.state().root_version, 3);
        assert_eq!(rotated.new_roots.len(), 2);

        // Skipping version 2 is not.
        let mut gapped = metas.clone();
        gapped.roots = vec![fixture.root(3).to_vec()];
        let err = trusted.verify_update(&gapped, NOW).unwrap_err();
        assert!(matches!(err, VerificationError::RootVersionGap { trusted: 1, got: 3, .. }));
    }

    #[test]
    fn test_rotation_needs_old_keys() {
        let mut fixture = RepoFixture::new(1);
        let metas = publish(&mut fixture, &[]);
        let trusted = TrustedRepository::empty(Repository::Config)
            .verify_update(&metas, NOW)
            .unwrap()
            .repo;

        let mut metas = metas;
        metas.roots.push(fixture.rotated_root_without_old_signatures(9));

        let err = trusted.verify_update(&metas, NOW).unwrap_err();
        assert!(matches!(err, VerificationError::ThresholdNotMet { role: Role::Root, .. }));
    }

    #[test]
    fn test_targets_rollback_rejected() {
        let mut fixture = RepoFixture::new(1);
        let old = publish(&mut fixture, &[("2/P/c/a", "1")]);
        let new = publish(&mut fixture, &[("2/P/c/a", "2")]);

        let trusted = TrustedRepository::empty(Repository::Director)
            .verify_update(&new, NOW)
            .unwrap()
            .repo;

        let err = trusted.verify_update(&old, NOW).unwrap_err();
        assert!(matches!(err, VerificationError::Rollback { .. }));
    }

    #[test]
    fn test_same_version_different_content_rejected() {
        let mut fixture = RepoFixture::new(1);
        let first = publish(&mut fixture, &[("2/P/c/a", "1")]);
        let trusted = TrustedRepository::empty(Repository::Director)
            .verify_update(&first, NOW)
            .unwrap()
            .repo;

        // Identical documents are fine.
        trusted.verify_update(&first, NOW).unwrap();

        let forged = fixture.metas_at(1, 1, descriptors(&[("2/P/c/a", "2")]));
        let err = trusted.verify_update(&forged, NOW).unwrap_err();
        assert!(matches!(err, VerificationError::VersionReused { .. }));
    }

    #[test]
    fn test_snapshot_must_pin_targets() {
        let mut fixture = RepoFixture::new(1);
        let metas = publish(&mut fixture, &[("2/P/c/a", "1")]);
        let other = fixture.metas_at(1, 1, descriptors(&[("2/P/c/a", "other")]));

        let mut mixed = metas.clone();
        mixed.targets = other.targets;

        let err = TrustedRepository::empty(Repository::Config)
            .verify_update(&mixed, NOW)
            .unwrap_err();
        assert!(matches!(err, VerificationError::SnapshotMismatch { .. }));
    }

    #[test]
    fn test_snapshot_pin_length_checked_without_hashes() {
        let fixture = RepoFixture::new(1);
        let targets = descriptors(&[("2/P/c/a", "1")]);

        let wrong_length = fixture.metas_with_pin(1, 1, targets.clone(), |pin| {
            pin.length = 7;
            pin.hashes.clear();
        });
        let err = TrustedRepository::empty(Repository::Config)
            .verify_update(&wrong_length, NOW)
            .unwrap_err();
        assert!(matches!(err, VerificationError::SnapshotMismatch { .. }));

        let no_hashes = fixture.metas_with_pin(1, 1, targets, |pin| pin.hashes.clear());
        TrustedRepository::empty(Repository::Config)
            .verify_update(&no_hashes, NOW)
            .unwrap();
    }

    #[test]
    fn test_expired_targets_rejected() {
        let mut fixture = RepoFixture::new(1);
        let metas = publish(&mut fixture, &[]);

        assert!(TrustedRepository::empty(Repository::Config)
            .verify_update(&metas, FAR_FUTURE - 1)
            .is_ok());
        let err = TrustedRepository::empty(Repository::Config)
            .verify_update(&metas, FAR_FUTURE)
            .unwrap_err();
        assert!(matches!(err, VerificationError::Expired { .. }));
    }

    #[test]
    fn test_targets_signed_by_wrong_key() {
        let mut fixture = RepoFixture::new(1);
        let mut metas = publish(&mut fixture, &[]);
        let stranger = RepoFixture::new(60);
        metas.targets = stranger.metas_at(1, 1, BTreeMap::new()).targets;

        let err = TrustedRepository::empty(Repository::Config)
            .verify_update(&metas, NOW)
            .unwrap_err();
        assert!(matches!(err, VerificationError::ThresholdNotMet { role: Role::Targets, .. }));
    }

    #[test]
    fn test_from_persisted_round_trip() {
        let mut fixture = RepoFixture::new(1);
        let metas = publish(&mut fixture, &[("2/P/c/a", "1")]);

        let repo = TrustedRepository::from_persisted(
            Repository::Director,
            fixture.root(1),
            Some(&metas.snapshot),
            Some(&metas.targets),
        )
        .unwrap();
        assert_eq!(repo.state().targets_version, 1);
        assert_eq!(repo.target_index().len(), 1);
    }
}
