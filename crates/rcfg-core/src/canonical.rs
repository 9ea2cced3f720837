//! Canonical encoding of the signed portion of metadata documents.
//!
//! Signatures cover the compact JSON encoding of the parsed `signed` value,
//! not the bytes as received. Every map in the metadata model is a
//! `BTreeMap` and struct fields serialize in declaration order, so
//! re-encoding is deterministic:
//! - object keys sorted lexicographically
//! - no insignificant whitespace
//! - integers only (versions are `u64`, expiry is Unix ms as `i64`)
//!
//! Fields a parser does not know about are dropped before verification and
//! so are never trusted.

use serde::Serialize;

use crate::error::CoreError;

/// Encode a value to the bytes that are signed and verified.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(value).map_err(|e| CoreError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct Doc {
        version: u64,
        entries: BTreeMap<String, u64>,
    }

    #[test]
    fn test_canonical_bytes_sorted_and_compact() {
        let mut entries = BTreeMap::new();
        entries.insert("zeta".to_string(), 1);
        entries.insert("alpha".to_string(), 2);
        let doc = Doc { version: 3, entries };

        let bytes = canonical_bytes(&doc).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"{"version":3,"entries":{"alpha":2,"zeta":1}}"#
        );
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let build = || {
            let mut entries = BTreeMap::new();
            for i in (0..20).rev() {
                entries.insert(format!("k{i}"), i);
            }
            Doc { version: 1, entries }
        };
        assert_eq!(canonical_bytes(&build()).unwrap(), canonical_bytes(&build()).unwrap());
    }
}
