//! Options controlling digest computation.

use color_eyre::{
    Result,
    eyre::{Context, bail},
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default number of concurrent hashing workers.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Hash algorithm used for per-file hashes.
///
/// The combined project hash is always SHA-256 regardless of this choice,
/// so the algorithm participates in identity only via per-file hashes.
#[derive(
    Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Sha256,
    #[default]
    Blake3,
}

impl Algorithm {
    /// Parse from a user-supplied tag; empty selects the default.
    pub fn parse(tag: &str) -> Result<Self> {
        if tag.is_empty() {
            return Ok(Self::default());
        }
        tag.parse()
            .with_context(|| format!("unsupported algorithm {tag:?} (expected sha256 or blake3)"))
    }
}

/// Options used to compute a project digest.
///
/// The options (except any timestamp) are part of digest identity: two
/// digests computed with different options are generally incomparable.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestOptions {
    /// Per-file hash algorithm.
    pub algorithm: Algorithm,

    /// Files larger than this many bytes are excluded. `0` means unlimited.
    pub max_file_size: u64,

    /// Include files whose basename begins with `.`.
    pub include_hidden: bool,

    /// Retain only recognized lockfiles.
    pub lockfiles_only: bool,

    /// Glob patterns applied to basenames; empty means "all".
    pub include_patterns: Vec<String>,

    /// Glob patterns applied to basenames; matches are excluded.
    pub exclude_patterns: Vec<String>,

    /// Maximum number of concurrent hashing workers.
    pub max_workers: usize,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            max_file_size: 0,
            include_hidden: false,
            lockfiles_only: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl DigestOptions {
    /// Check the options for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            globset::Glob::new(pattern)
                .with_context(|| format!("invalid filter pattern {pattern:?}"))?;
        }
        Ok(())
    }

    /// Worker count bounded by the host's parallelism.
    pub fn effective_workers(&self) -> usize {
        self.max_workers.clamp(1, num_cpus::get().max(1))
    }
}
