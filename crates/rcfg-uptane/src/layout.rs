//! Key layout of the verifier's persisted state.
//!
//! Every key is namespaced by the cache key so several organisations or
//! datacenters can share one store.

use rcfg_core::{Digest, Repository};

const BLOBS: &str = "blobs/";

#[derive(Debug, Clone)]
pub(crate) struct StoreLayout {
    cache_key: String,
}

impl StoreLayout {
    pub fn new(cache_key: impl Into<String>) -> Self {
        Self {
            cache_key: cache_key.into(),
        }
    }

    pub fn root(&self, repo: Repository, version: u64) -> String {
        format!("{}{}/root/{}", self.cache_key, repo, version)
    }

    pub fn snapshot(&self, repo: Repository) -> String {
        format!("{}{}/snapshot", self.cache_key, repo)
    }

    pub fn targets(&self, repo: Repository) -> String {
        format!("{}{}/targets", self.cache_key, repo)
    }

    pub fn state(&self, repo: Repository) -> String {
        format!("{}{}/state", self.cache_key, repo)
    }

    pub fn blob(&self, digest: &Digest) -> String {
        format!("{}{}{}", self.cache_key, BLOBS, digest.to_hex())
    }

    pub fn blobs_prefix(&self) -> String {
        format!("{}{}", self.cache_key, BLOBS)
    }
}
