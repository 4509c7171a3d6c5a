//! Deterministic, content-normalized project digests.
//!
//! The digest names exactly the capsule that ought to exist for a directory
//! state: the tree is walked once, filtered through the ignore rules, each
//! file's normalized bytes are hashed by a bounded worker pool, and the
//! per-file entries are combined in sorted path order. Worker interleaving
//! never changes the result.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use color_eyre::{
    Result,
    eyre::{Context, bail},
};
use futures::{StreamExt, stream};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};
use walkdir::WalkDir;

mod compare;
mod options;

pub use compare::{DigestDiff, compare};
pub use options::{Algorithm, DEFAULT_MAX_WORKERS, DigestOptions};

use crate::{fs, ignore::IgnoreRules, lockfile, normalize::Normalizer};

/// Read chunk size for hashing workers; cancellation is checked between
/// chunks.
const CHUNK_SIZE: usize = 32 * 1024;

/// Length of a project tag, in hex characters.
pub const PROJECT_TAG_LEN: usize = 12;

/// A single file's contribution to the project digest.
///
/// The hash covers the *normalized* file bytes, not the raw bytes. A file
/// that failed to read or normalize carries the error instead and is
/// excluded from the combined hash.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root, `/`-separated, no leading `./`.
    pub path: String,
    pub hash: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An immutable digest of a project directory.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ProjectDigest {
    /// Combined hash; always SHA-256 over the sorted per-file entries.
    pub hash: String,
    /// Per-file hash algorithm.
    pub algorithm: Algorithm,
    /// When the digest was computed. Informational only, never hashed.
    pub computed_at: jiff::Timestamp,
    pub file_count: usize,
    pub total_size: u64,
    /// Per-file entries, ordered by path string comparison.
    pub files: Vec<FileEntry>,
    /// The options the digest was computed with.
    pub options: DigestOptions,
}

impl ProjectDigest {
    /// The 12-hex project tag: a prefix of the combined hash.
    pub fn tag(&self) -> Result<String> {
        if self.hash.len() < PROJECT_TAG_LEN {
            bail!("digest hash {:?} is shorter than {PROJECT_TAG_LEN} characters", self.hash);
        }
        Ok(self.hash[..PROJECT_TAG_LEN].to_string())
    }

    /// Entries that failed to read or normalize.
    pub fn failed_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|entry| entry.error.is_some())
    }

    /// Serialize to a portable JSON document.
    #[instrument(skip(self))]
    pub async fn save(&self, path: impl AsRef<Path> + std::fmt::Debug) -> Result<()> {
        let document = serde_json::to_vec_pretty(self).context("serialize digest")?;
        fs::write(path.as_ref(), document).await
    }

    /// Read a digest back from a persisted document.
    #[instrument]
    pub async fn load(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self> {
        let path = path.as_ref();
        let Some(document) = fs::read_buffered(path).await? else {
            bail!("digest document not found: {path:?}");
        };
        serde_json::from_slice(&document).with_context(|| format!("parse digest document: {path:?}"))
    }
}

/// Computes project digests.
#[derive(Clone, Debug)]
pub struct DigestCalculator {
    root: PathBuf,
    options: DigestOptions,
    normalizer: Normalizer,
    cancel: CancellationToken,
}

impl DigestCalculator {
    pub fn new(root: impl Into<PathBuf>, options: DigestOptions) -> Result<Self> {
        options.validate().context("validate digest options")?;
        Ok(Self {
            root: root.into(),
            options,
            normalizer: Normalizer::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Use the provided cancellation token instead of a fresh one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the content normalizer.
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Compute the digest of the project root.
    #[instrument(skip(self), fields(root = ?self.root))]
    pub async fn compute(&self) -> Result<ProjectDigest> {
        let mut ignore = IgnoreRules::new()?;
        ignore
            .load_project_file(&self.root)
            .await
            .context("load project ignore file")?;

        // Walk in a background thread; ignored directories prune the whole
        // subtree, and only regular files are emitted.
        let walk_root = self.root.clone();
        let ignore = Arc::new(ignore);
        let walk_ignore = Arc::clone(&ignore);
        let mut paths =
            tokio::task::spawn_blocking(move || walk_files(&walk_root, &walk_ignore))
                .await
                .context("join walk task")??;

        // Sort order is the sole determinant of digest order.
        paths.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(files = paths.len(), "walked project tree");

        let workers = self.options.effective_workers();
        let algorithm = self.options.algorithm;
        let normalizer = self.normalizer;
        let entries = stream::iter(paths.into_iter().map(|(path, abs)| {
            let cancel = self.cancel.clone();
            async move { hash_file(path, abs, algorithm, normalizer, cancel).await }
        }))
        .buffer_unordered(workers)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

        if self.cancel.is_cancelled() {
            bail!("digest computation cancelled");
        }

        let mut entries = self.filter(entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        // The combined hash is always SHA-256 regardless of the per-file
        // algorithm.
        let mut hasher = Sha256::new();
        let mut hashed = 0usize;
        let mut failed = 0usize;
        for entry in &entries {
            if entry.error.is_some() {
                failed += 1;
                continue;
            }
            hashed += 1;
            hasher.update(entry.path.as_bytes());
            hasher.update(b"\n");
            hasher.update(entry.size.to_string().as_bytes());
            hasher.update(b"\n");
            hasher.update(entry.hash.as_bytes());
            hasher.update(b"\n");
        }
        if hashed == 0 && failed > 0 {
            bail!("no file could be hashed ({failed} failures)");
        }

        let total_size = entries.iter().map(|entry| entry.size).sum();
        Ok(ProjectDigest {
            hash: hex::encode(hasher.finalize()),
            algorithm,
            computed_at: jiff::Timestamp::now(),
            file_count: entries.len(),
            total_size,
            files: entries,
            options: self.options.clone(),
        })
    }

    /// Apply size, hidden-name, lockfile, and basename glob filters.
    fn filter(&self, entries: Vec<FileEntry>) -> Result<Vec<FileEntry>> {
        let include = build_globset(&self.options.include_patterns)?;
        let exclude = build_globset(&self.options.exclude_patterns)?;

        let entries = entries
            .into_iter()
            .filter(|entry| {
                let basename = entry.path.rsplit('/').next().unwrap_or(&entry.path);
                if self.options.max_file_size > 0 && entry.size > self.options.max_file_size {
                    trace!(path = %entry.path, "filtered: over size limit");
                    return false;
                }
                if !self.options.include_hidden && basename.starts_with('.') {
                    return false;
                }
                if let Some(include) = &include {
                    if !include.is_match(basename) {
                        return false;
                    }
                }
                if let Some(exclude) = &exclude {
                    if exclude.is_match(basename) {
                        return false;
                    }
                }
                if self.options.lockfiles_only && !lockfile::is_recognized(basename) {
                    return false;
                }
                true
            })
            .collect();
        Ok(entries)
    }
}

/// Compute the project tag for a directory: the first 12 hex characters of
/// its digest hash.
#[instrument]
pub async fn project_tag(
    root: impl AsRef<Path> + std::fmt::Debug,
    options: &DigestOptions,
) -> Result<String> {
    DigestCalculator::new(root.as_ref(), options.clone())?
        .compute()
        .await?
        .tag()
}

fn build_globset(patterns: &[String]) -> Result<Option<globset::GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            globset::Glob::new(pattern)
                .with_context(|| format!("invalid filter pattern {pattern:?}"))?,
        );
    }
    Ok(Some(builder.build().context("compile filter patterns")?))
}

/// Walk the tree, pruning ignored directories, emitting regular files as
/// `(canonical relative path, absolute path)` pairs.
fn walk_files(root: &Path, ignore: &IgnoreRules) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            let Ok(rel) = entry.path().strip_prefix(root) else {
                return true;
            };
            if rel.as_os_str().is_empty() {
                return true;
            }
            !ignore.is_ignored(&canonical_relative(rel), entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = entry.context("walk project tree")?;
        // Symlinks and special files are skipped silently.
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .context("make path relative to root")?;
        files.push((canonical_relative(rel), entry.path().to_path_buf()));
    }
    Ok(files)
}

/// Canonical path form: `/`-separated, no leading `./`.
fn canonical_relative(rel: &Path) -> String {
    rel.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .join("/")
}

async fn hash_file(
    path: String,
    abs: PathBuf,
    algorithm: Algorithm,
    normalizer: Normalizer,
    cancel: CancellationToken,
) -> Result<FileEntry> {
    match hash_file_contents(&abs, algorithm, normalizer, &cancel).await {
        Ok((hash, size)) => {
            trace!(%path, %hash, size, "hashed file");
            Ok(FileEntry {
                path,
                hash,
                size,
                error: None,
            })
        }
        Err(err) if cancel.is_cancelled() => Err(err),
        Err(err) => {
            // Recorded against the entry; the file is excluded from the
            // combined hash without aborting the traversal.
            warn!(%path, error = %err, "failed to hash file");
            let size = fs::metadata(&abs).await.ok().flatten().map_or(0, |m| m.len());
            Ok(FileEntry {
                path,
                hash: String::new(),
                size,
                error: Some(format!("{err:#}")),
            })
        }
    }
}

async fn hash_file_contents(
    abs: &Path,
    algorithm: Algorithm,
    normalizer: Normalizer,
    cancel: &CancellationToken,
) -> Result<(String, u64)> {
    let mut file = tokio::fs::File::open(abs)
        .await
        .with_context(|| format!("open file: {abs:?}"))?;

    let mut raw = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            bail!("cancelled");
        }
        let read = file.read(&mut chunk).await.context("read chunk")?;
        if read == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..read]);
    }

    let size = raw.len() as u64;
    let normalized = normalizer.normalize(&raw).context("normalize content")?;
    let hash = match algorithm {
        Algorithm::Blake3 => blake3::hash(&normalized).to_hex().to_string(),
        Algorithm::Sha256 => hex::encode(Sha256::digest(&normalized)),
    };
    Ok((hash, size))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn write(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    async fn digest_of(root: &Path) -> ProjectDigest {
        DigestCalculator::new(root, DigestOptions::default())
            .unwrap()
            .compute()
            .await
            .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn digest_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.go", "package main\n");
        write(dir.path(), "pkg/util.go", "package pkg\n");
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main\n");

        let first = digest_of(dir.path()).await;
        let second = digest_of(dir.path()).await;
        assert_eq!(first.hash, second.hash);
        assert_eq!(first.files, second.files);

        // VCS metadata never contributes.
        assert!(first.files.iter().all(|entry| !entry.path.starts_with(".git")));
    }

    #[test_log::test(tokio::test)]
    async fn tag_is_a_12_hex_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "hello\n");

        let digest = digest_of(dir.path()).await;
        let tag = digest.tag().unwrap();
        assert_eq!(tag.len(), PROJECT_TAG_LEN);
        assert!(digest.hash.starts_with(&tag));
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test_log::test(tokio::test)]
    async fn line_endings_do_not_change_the_digest() {
        let crlf = tempfile::tempdir().unwrap();
        write(crlf.path(), "file.txt", "line1\r\nline2\r\n");
        let lf = tempfile::tempdir().unwrap();
        write(lf.path(), "file.txt", "line1\nline2\n");

        let crlf_digest = digest_of(crlf.path()).await;
        let lf_digest = digest_of(lf.path()).await;
        assert_eq!(crlf_digest.files[0].hash, lf_digest.files[0].hash);
    }

    #[test_log::test(tokio::test)]
    async fn bom_does_not_change_the_per_file_hash() {
        let with_bom = tempfile::tempdir().unwrap();
        write(with_bom.path(), "file.txt", b"\xEF\xBB\xBFhello\n".as_slice());
        let without = tempfile::tempdir().unwrap();
        write(without.path(), "file.txt", "hello\n");

        let a = digest_of(with_bom.path()).await;
        let b = digest_of(without.path()).await;
        assert_eq!(a.files[0].hash, b.files[0].hash);
    }

    #[test_log::test(tokio::test)]
    async fn hidden_files_are_excluded_by_default() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "visible.txt", "a");
        write(dir.path(), ".env", "SECRET=1");

        let digest = digest_of(dir.path()).await;
        assert_eq!(digest.file_count, 1);
        assert_eq!(digest.files[0].path, "visible.txt");

        let with_hidden = DigestCalculator::new(
            dir.path(),
            DigestOptions {
                include_hidden: true,
                ..DigestOptions::default()
            },
        )
        .unwrap()
        .compute()
        .await
        .unwrap();
        assert_eq!(with_hidden.file_count, 2);
    }

    #[test_log::test(tokio::test)]
    async fn size_limit_filters_large_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "small.txt", "ok");
        write(dir.path(), "large.txt", "x".repeat(4096));

        let digest = DigestCalculator::new(
            dir.path(),
            DigestOptions {
                max_file_size: 1024,
                ..DigestOptions::default()
            },
        )
        .unwrap()
        .compute()
        .await
        .unwrap();
        assert_eq!(digest.file_count, 1);
        assert_eq!(digest.files[0].path, "small.txt");
    }

    #[test_log::test(tokio::test)]
    async fn lockfiles_only_retains_recognized_names() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "go.sum", "entry\n");
        write(dir.path(), "main.go", "package main\n");

        let digest = DigestCalculator::new(
            dir.path(),
            DigestOptions {
                lockfiles_only: true,
                ..DigestOptions::default()
            },
        )
        .unwrap()
        .compute()
        .await
        .unwrap();
        assert_eq!(digest.file_count, 1);
        assert_eq!(digest.files[0].path, "go.sum");
    }

    #[test_log::test(tokio::test)]
    async fn basename_globs_include_and_exclude() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.rs", "");
        write(dir.path(), "b.rs", "");
        write(dir.path(), "c.txt", "");

        let digest = DigestCalculator::new(
            dir.path(),
            DigestOptions {
                include_patterns: vec!["*.rs".to_string()],
                exclude_patterns: vec!["b.*".to_string()],
                ..DigestOptions::default()
            },
        )
        .unwrap()
        .compute()
        .await
        .unwrap();
        let paths: Vec<_> = digest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs"]);
    }

    #[test_log::test(tokio::test)]
    async fn unreadable_content_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.txt", "fine\n");
        write(dir.path(), "binary.dat", [0x80u8, 0x81, 0x82].as_slice());

        let digest = digest_of(dir.path()).await;
        assert_eq!(digest.file_count, 2);
        assert_eq!(digest.failed_files().count(), 1);

        // The failed file does not contribute to the combined hash.
        let clean = tempfile::tempdir().unwrap();
        write(clean.path(), "good.txt", "fine\n");
        let clean_digest = digest_of(clean.path()).await;
        assert_eq!(digest.hash, clean_digest.hash);
    }

    #[test_log::test(tokio::test)]
    async fn cancellation_discards_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "hello\n");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = DigestCalculator::new(dir.path(), DigestOptions::default())
            .unwrap()
            .with_cancellation(cancel)
            .compute()
            .await;
        assert!(result.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "hello\n");

        let digest = digest_of(dir.path()).await;
        let path = dir.path().join("digest.json");
        digest.save(&path).await.unwrap();
        let loaded = ProjectDigest::load(&path).await.unwrap();
        assert_eq!(digest, loaded);
    }

    #[test_log::test(tokio::test)]
    async fn mitlignore_prunes_subtrees() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".mitlignore", "generated/\n");
        write(dir.path(), "src/lib.rs", "");
        write(dir.path(), "generated/out.rs", "");

        let digest = digest_of(dir.path()).await;
        let paths: Vec<_> = digest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/lib.rs"]);
    }
}
