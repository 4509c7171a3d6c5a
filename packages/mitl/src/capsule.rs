//! Capsule tags and the capsule cache.
//!
//! A capsule is the container image produced for one project state. The
//! cache is content-addressed: the tag is derived from the project digest,
//! so asking the runtime whether the tagged image exists is the entire
//! cache check.

use std::time::Duration;

use color_eyre::{Result, eyre::bail};
use derive_more::Display;

use crate::{config::Config, digest::PROJECT_TAG_LEN, runtime::Runtime};

/// Prefix of every capsule image reference.
pub const TAG_PREFIX: &str = "mitl-capsule:";

/// A capsule tag: `mitl-capsule:<12 lowercase hex>`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display("{TAG_PREFIX}{short}")]
pub struct CapsuleTag {
    short: String,
}

impl CapsuleTag {
    /// Derive the tag from a digest hash; the first 12 hex characters name
    /// the capsule.
    pub fn from_digest_hash(hash: &str) -> Result<Self> {
        if hash.len() < PROJECT_TAG_LEN {
            bail!("digest hash {hash:?} is shorter than {PROJECT_TAG_LEN} characters");
        }
        let short = hash[..PROJECT_TAG_LEN].to_lowercase();
        if !short.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("digest hash {hash:?} is not hex");
        }
        Ok(Self { short })
    }

    /// The 12-hex digest prefix.
    pub fn short(&self) -> &str {
        &self.short
    }

    /// The full image reference passed to the runtime.
    pub fn image_ref(&self) -> String {
        self.to_string()
    }
}

/// Read-through cache check against the runtime's image store, plus
/// build-duration memory in the configuration record.
#[derive(Debug)]
pub struct CapsuleCache<'a> {
    runtime: &'a Runtime,
}

impl<'a> CapsuleCache<'a> {
    pub fn new(runtime: &'a Runtime) -> Self {
        Self { runtime }
    }

    /// Whether the capsule for this tag already exists.
    pub async fn exists(&self, tag: &CapsuleTag) -> Result<bool> {
        self.runtime.image_exists(&tag.image_ref()).await
    }

    /// Whether the tag names exactly this digest.
    pub fn validate_digest(tag: &CapsuleTag, digest_hash: &str) -> bool {
        digest_hash.len() >= PROJECT_TAG_LEN
            && digest_hash[..PROJECT_TAG_LEN].eq_ignore_ascii_case(tag.short())
    }

    /// Record a successful build's duration against the tag.
    pub fn record_build(config: &mut Config, tag: &CapsuleTag, duration: Duration) {
        config.record_build_duration(tag.short(), duration);
    }

    /// Time saved by a cache hit, relative to the last recorded build.
    pub fn time_saved(config: &Config, tag: &CapsuleTag, elapsed: Duration) -> Option<Duration> {
        config
            .last_build_duration(tag.short())
            .map(|previous| previous.saturating_sub(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const HASH: &str = "abcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";

    #[test]
    fn tag_is_a_12_hex_prefix() {
        let tag = CapsuleTag::from_digest_hash(HASH).unwrap();
        assert_eq!(tag.short(), "abcdef012345");
        assert_eq!(tag.image_ref(), "mitl-capsule:abcdef012345");
    }

    #[test]
    fn tag_rejects_short_or_non_hex_hashes() {
        assert!(CapsuleTag::from_digest_hash("abc").is_err());
        assert!(CapsuleTag::from_digest_hash("zzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn tags_coincide_iff_prefixes_coincide() {
        let a = CapsuleTag::from_digest_hash(HASH).unwrap();
        let b = CapsuleTag::from_digest_hash(&format!("abcdef012345{}", "0".repeat(20))).unwrap();
        let c = CapsuleTag::from_digest_hash(&format!("abcdef012346{}", "0".repeat(20))).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn validates_digest_prefix() {
        let tag = CapsuleTag::from_digest_hash(HASH).unwrap();
        assert!(CapsuleCache::validate_digest(&tag, HASH));
        assert!(!CapsuleCache::validate_digest(&tag, "0000000000000000"));
        assert!(!CapsuleCache::validate_digest(&tag, "short"));
    }

    #[test]
    fn build_duration_memory_roundtrip() {
        let tag = CapsuleTag::from_digest_hash(HASH).unwrap();
        let mut config = Config::default();
        assert_eq!(CapsuleCache::time_saved(&config, &tag, Duration::ZERO), None);

        CapsuleCache::record_build(&mut config, &tag, Duration::from_secs(30));
        let saved = CapsuleCache::time_saved(&config, &tag, Duration::from_secs(2)).unwrap();
        assert_eq!(saved, Duration::from_secs(28));
    }
}
