//! Resource descriptors
//!
//! A descriptor is what a caller claims about a file: its digest and its
//! size. The pool never originates one; it only checks claims against what
//! it actually stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::digest::ResourceDigest;
use crate::error::{Error, Result};

/// A claimed `{digest, size}` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Content digest, the sole identity of the resource
    #[serde(rename = "sha1")]
    pub digest: ResourceDigest,
    /// Claimed size in bytes; advisory until verified
    pub size: u64,
}

impl ResourceDescriptor {
    pub fn new(digest: ResourceDigest, size: u64) -> Self {
        Self { digest, size }
    }

    /// Describe in-memory content
    pub fn for_data(data: &[u8]) -> Self {
        Self {
            digest: ResourceDigest::from_data(data),
            size: data.len() as u64,
        }
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.digest, self.size)
    }
}

/// Parses the `<digest>:<size>` form produced by `Display`
impl FromStr for ResourceDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (digest, size) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidDescriptor(format!("expected <digest>:<size>, got {s:?}")))?;
        let size = size
            .parse()
            .map_err(|_| Error::InvalidDescriptor(format!("invalid size in {s:?}")))?;
        Ok(Self::new(digest.parse()?, size))
    }
}

/// A descriptor enriched with the size actually held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedResource {
    #[serde(flatten)]
    pub descriptor: ResourceDescriptor,
    pub observed_size: u64,
}

impl VerifiedResource {
    pub fn new(descriptor: ResourceDescriptor, observed_size: u64) -> Self {
        Self {
            descriptor,
            observed_size,
        }
    }

    /// Whether the caller's claim matches the stored object
    pub fn size_matches(&self) -> bool {
        self.descriptor.size == self.observed_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_wire_format() {
        let descriptor = ResourceDescriptor::for_data(b"hello world");
        let json = serde_json::to_value(descriptor).unwrap();
        assert_eq!(json["sha1"], "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(json["size"], 11);
    }

    #[test]
    fn test_descriptor_accepts_uppercase_digest() {
        let json = r#"{"sha1": "2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED", "size": 11}"#;
        let descriptor: ResourceDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor, ResourceDescriptor::for_data(b"hello world"));
    }

    #[test]
    fn test_verified_resource_is_flat() {
        let verified = VerifiedResource::new(ResourceDescriptor::for_data(b"abc"), 3);
        let json = serde_json::to_value(&verified).unwrap();
        assert_eq!(json["size"], 3);
        assert_eq!(json["observed_size"], 3);
        assert!(json.get("descriptor").is_none());
        assert!(verified.size_matches());
    }

    #[test]
    fn test_parse_display_form() {
        let descriptor = ResourceDescriptor::for_data(b"hello world");
        let parsed: ResourceDescriptor = descriptor.to_string().parse().unwrap();
        assert_eq!(parsed, descriptor);

        assert!("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".parse::<ResourceDescriptor>().is_err());
        assert!("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed:-1"
            .parse::<ResourceDescriptor>()
            .is_err());
    }
}
