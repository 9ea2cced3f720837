//! Strong type definitions for rcfg.
//!
//! Products and client identities are newtypes so they cannot be mixed up
//! with target paths or arbitrary strings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::CoreError;

/// A category of configuration a consumer subscribes to.
///
/// Opaque: no catalog of known products is assumed.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Product(String);

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Product({})", self.0)
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Product {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A downstream consumer and the products it currently wants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub products: BTreeSet<Product>,
}

impl Client {
    pub fn new<I, P>(id: impl Into<String>, products: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Product>,
    {
        Self {
            id: id.into(),
            products: products.into_iter().map(Into::into).collect(),
        }
    }
}

/// A parsed target path: `{org_id}/{product}/{config_id}/{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub org_id: u64,
    pub product: Product,
    pub config_id: String,
    pub name: String,
}

impl ConfigPath {
    /// Parse a target path.
    ///
    /// The name segment may itself contain `/`.
    pub fn parse(path: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidConfigPath(path.to_string());

        let mut parts = path.splitn(4, '/');
        let org_id = parts
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let product = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let config_id = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let name = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        Ok(Self {
            org_id,
            product: Product::new(product),
            config_id: config_id.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.org_id, self.product, self.config_id, self.name)
    }
}

/// Org-scoped prefix every director target path must carry.
pub fn org_prefix(org_id: u64) -> String {
    format!("{org_id}/")
}

/// Current wall-clock time as Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_parse() {
        let path = ConfigPath::parse("2/APM_SAMPLING/cfg-1/rules").unwrap();
        assert_eq!(path.org_id, 2);
        assert_eq!(path.product, Product::new("APM_SAMPLING"));
        assert_eq!(path.config_id, "cfg-1");
        assert_eq!(path.name, "rules");
        assert_eq!(path.to_string(), "2/APM_SAMPLING/cfg-1/rules");
    }

    #[test]
    fn test_config_path_name_keeps_slashes() {
        let path = ConfigPath::parse("2/P/c/a/b").unwrap();
        assert_eq!(path.name, "a/b");
    }

    #[test]
    fn test_config_path_invalid() {
        for bad in ["", "2", "2/P", "2/P/c", "x/P/c/n", "2//c/n", "2/P/c/"] {
            assert!(ConfigPath::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_client_new() {
        let client = Client::new("c1", ["A", "B", "A"]);
        assert_eq!(client.products.len(), 2);
    }

    #[test]
    fn test_product_is_transparent_in_json() {
        let json = serde_json::to_string(&Product::new("ASM")).unwrap();
        assert_eq!(json, "\"ASM\"");
    }
}
