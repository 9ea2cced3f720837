//! Metadata validation: signature thresholds, expiry and content checks.

use std::collections::BTreeSet;

use crate::crypto::Digest;
use crate::error::VerificationError;
use crate::metadata::{Hashes, Metadata, Repository, Role, RootMeta, Signed, TargetDescriptor};

/// Verify that `doc` carries at least `threshold` valid signatures from the
/// keys `root` delegates to `role`.
///
/// Each key counts once no matter how many signatures it appears under.
/// Signatures by keys outside the role are ignored.
pub fn verify_role_signatures<T: Metadata>(
    repo: Repository,
    root: &RootMeta,
    role: Role,
    doc: &Signed<T>,
) -> Result<(), VerificationError> {
    let (threshold, keys) = root
        .role_keys(role)
        .ok_or(VerificationError::MissingRole { repo, role })?;
    if threshold == 0 || keys.is_empty() {
        return Err(VerificationError::MissingRole { repo, role });
    }

    let message = doc.signed_bytes().map_err(|e| VerificationError::Malformed {
        repo,
        role: T::ROLE,
        reason: e.to_string(),
    })?;

    let mut valid = BTreeSet::new();
    for signature in &doc.signatures {
        let Some((key_id, key)) = keys.iter().find(|(id, _)| **id == signature.keyid) else {
            continue;
        };
        if key.verify(&message, &signature.sig).is_ok() {
            valid.insert(*key_id);
        }
    }

    if valid.len() < threshold as usize {
        return Err(VerificationError::ThresholdNotMet {
            repo,
            role,
            valid: valid.len(),
            threshold,
        });
    }
    Ok(())
}

/// Reject documents whose expiry is at or before `now` (Unix ms).
pub fn check_not_expired<T: Metadata>(
    repo: Repository,
    doc: &Signed<T>,
    now: i64,
) -> Result<(), VerificationError> {
    let expires = doc.signed.expires();
    if expires <= now {
        return Err(VerificationError::Expired {
            repo,
            role: T::ROLE,
            expires,
        });
    }
    Ok(())
}

/// Check `content` against a declared length and every declared digest.
///
/// At least one digest must be declared.
pub fn verify_hashes(
    path: &str,
    length: u64,
    hashes: &Hashes,
    content: &[u8],
) -> Result<(), VerificationError> {
    if hashes.is_empty() {
        return Err(VerificationError::NoHashes { path: path.into() });
    }
    let actual = content.len() as u64;
    if actual != length {
        return Err(VerificationError::LengthMismatch {
            path: path.into(),
            declared: length,
            actual,
        });
    }
    for (&algorithm, expected) in hashes {
        if Digest::compute(algorithm, content) != *expected {
            return Err(VerificationError::HashMismatch {
                path: path.into(),
                algorithm,
            });
        }
    }
    Ok(())
}

/// Check a target file against its descriptor.
pub fn verify_target_content(
    path: &str,
    descriptor: &TargetDescriptor,
    content: &[u8],
) -> Result<(), VerificationError> {
    verify_hashes(path, descriptor.length, &descriptor.hashes, content)
}

/// Check that a director target is described identically by the config
/// repository: same length, and for every digest the director declares the
/// config repository declares the same digest.
pub fn verify_same_target(
    path: &str,
    director: &TargetDescriptor,
    config: &TargetDescriptor,
) -> Result<(), VerificationError> {
    if director.length != config.length {
        return Err(VerificationError::CrossRepoLength {
            path: path.into(),
            director: director.length,
            config: config.length,
        });
    }
    for (algorithm, digest) in &director.hashes {
        if config.hashes.get(algorithm) != Some(digest) {
            return Err(VerificationError::CrossRepoHash {
                path: path.into(),
                algorithm: *algorithm,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{HashAlgorithm, Keypair};
    use crate::metadata::{RoleKeys, TargetsMeta};
    use std::collections::BTreeMap;

    fn root_with(keys: &[&Keypair], threshold: u32) -> RootMeta {
        let mut key_map = BTreeMap::new();
        let mut keyids = BTreeSet::new();
        for kp in keys {
            key_map.insert(kp.key_id(), kp.public_key());
            keyids.insert(kp.key_id());
        }
        let mut roles = BTreeMap::new();
        roles.insert(Role::Targets, RoleKeys { keyids, threshold });
        RootMeta {
            meta_type: Role::Root,
            version: 1,
            expires: i64::MAX,
            keys: key_map,
            roles,
        }
    }

    fn targets_doc(version: u64) -> TargetsMeta {
        TargetsMeta {
            meta_type: Role::Targets,
            version,
            expires: i64::MAX,
            targets: BTreeMap::new(),
        }
    }

    #[test]
    fn test_threshold_met() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        let root = root_with(&[&a, &b], 2);
        let doc = Signed::sign(targets_doc(1), &[&a, &b]).unwrap();
        verify_role_signatures(Repository::Config, &root, Role::Targets, &doc).unwrap();
    }

    #[test]
    fn test_duplicate_signatures_count_once() {
        let a = Keypair::from_seed(&[1; 32]);
        let b = Keypair::from_seed(&[2; 32]);
        let root = root_with(&[&a, &b], 2);
        let doc = Signed::sign(targets_doc(1), &[&a, &a]).unwrap();

        let err = verify_role_signatures(Repository::Config, &root, Role::Targets, &doc).unwrap_err();
        assert!(matches!(err, VerificationError::ThresholdNotMet { valid: 1, threshold: 2, .. }));
    }

    #[test]
    fn test_foreign_key_ignored() {
        let a = Keypair::from_seed(&[1; 32]);
        let outsider = Keypair::from_seed(&[9; 32]);
        let root = root_with(&[&a], 1);
        let doc = Signed::sign(targets_doc(1), &[&outsider]).unwrap();

        assert!(verify_role_signatures(Repository::Director, &root, Role::Targets, &doc).is_err());
    }

    #[test]
    fn test_tampered_content_fails() {
        let a = Keypair::from_seed(&[1; 32]);
        let root = root_with(&[&a], 1);
        let mut doc = Signed::sign(targets_doc(1), &[&a]).unwrap();
        doc.signed.version = 2;

        assert!(verify_role_signatures(Repository::Director, &root, Role::Targets, &doc).is_err());
    }

    #[test]
    fn test_missing_role() {
        let a = Keypair::from_seed(&[1; 32]);
        let root = root_with(&[&a], 1);
        let doc = Signed::sign(targets_doc(1), &[&a]).unwrap();

        let err = verify_role_signatures(Repository::Config, &root, Role::Snapshot, &doc).unwrap_err();
        assert!(matches!(err, VerificationError::MissingRole { .. }));
    }

    #[test]
    fn test_expiry() {
        let a = Keypair::from_seed(&[1; 32]);
        let mut meta = targets_doc(1);
        meta.expires = 1_000;
        let doc = Signed::sign(meta, &[&a]).unwrap();

        assert!(check_not_expired(Repository::Config, &doc, 999).is_ok());
        assert!(check_not_expired(Repository::Config, &doc, 1_000).is_err());
    }

    #[test]
    fn test_verify_target_content() {
        let desc = TargetDescriptor::for_content(
            b"payload",
            &[HashAlgorithm::Sha256, HashAlgorithm::Blake3],
        );
        verify_target_content("1/P/c/n", &desc, b"payload").unwrap();

        let err = verify_target_content("1/P/c/n", &desc, b"payloaX").unwrap_err();
        assert!(matches!(err, VerificationError::HashMismatch { .. }));

        let err = verify_target_content("1/P/c/n", &desc, b"short").unwrap_err();
        assert!(matches!(err, VerificationError::LengthMismatch { .. }));
    }

    #[test]
    fn test_same_target_requires_director_hashes_in_config() {
        let director = TargetDescriptor::for_content(
            b"x",
            &[HashAlgorithm::Sha256, HashAlgorithm::Sha512],
        );
        let config = TargetDescriptor::for_content(b"x", &[HashAlgorithm::Sha256]);

        let err = verify_same_target("p", &director, &config).unwrap_err();
        assert!(matches!(
            err,
            VerificationError::CrossRepoHash { algorithm: HashAlgorithm::Sha512, .. }
        ));

        // Extra config hashes are fine.
        verify_same_target("p", &config, &director).unwrap();
    }
}
