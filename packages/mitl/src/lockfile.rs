//! Format-aware lockfile hashing.
//!
//! Each recognized lockfile is reduced to its dependency-identifying fields
//! (package name and resolved version, occasionally platform requirements)
//! before hashing, so cosmetic edits such as comment or whitespace churn do
//! not invalidate dependency volumes. Parse failures fall back to hashing
//! the raw bytes.

use std::path::PathBuf;

use color_eyre::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{instrument, trace};

use crate::fs;

/// Sentinel returned when a project has no recognized lockfiles.
pub const NO_LOCKFILES: &str = "no-lockfiles";

/// Length of the combined lockfile hash, in hex characters.
const COMBINED_HASH_LEN: usize = 16;

/// The closed set of recognized lockfile names.
///
/// Matching is case-insensitive (`cargo.lock` and `Cargo.lock` are the same
/// lockfile).
pub const RECOGNIZED_LOCKFILES: &[&str] = &[
    "Cargo.lock",
    "Gemfile.lock",
    "Pipfile.lock",
    "composer.lock",
    "go.mod",
    "go.sum",
    "package-lock.json",
    "pnpm-lock.yaml",
    "poetry.lock",
    "requirements.txt",
    "yarn.lock",
];

/// Report whether the basename names a recognized lockfile.
pub fn is_recognized(name: &str) -> bool {
    RECOGNIZED_LOCKFILES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
}

/// Hashes the recognized lockfiles in a project root.
#[derive(Clone, Debug)]
pub struct LockfileHasher {
    root: PathBuf,
}

impl LockfileHasher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Hash every recognized lockfile present in the project root.
    ///
    /// Returns the hex digest of `<filename>:<per-file-hash>\n` in
    /// alphabetical filename order, truncated to 16 characters, or the
    /// [`NO_LOCKFILES`] sentinel when none are present.
    #[instrument(skip(self), fields(root = ?self.root))]
    pub async fn hash_lockfiles(&self) -> Result<String> {
        let mut hashed = Vec::new();
        for name in RECOGNIZED_LOCKFILES {
            let Some(actual) = self.find_on_disk(name).await? else {
                continue;
            };
            let Some(content) = fs::read_buffered(self.root.join(&actual)).await? else {
                continue;
            };
            let hash = hash_one(&actual, &content);
            trace!(name = %actual, %hash, "hashed lockfile");
            hashed.push((actual, hash));
        }

        if hashed.is_empty() {
            return Ok(NO_LOCKFILES.to_string());
        }

        hashed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut hasher = Sha256::new();
        for (name, hash) in &hashed {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(hash.as_bytes());
            hasher.update(b"\n");
        }
        let combined = hex::encode(hasher.finalize());
        Ok(combined[..COMBINED_HASH_LEN].to_string())
    }

    /// Hash the raw concatenation of the named files, in the given order.
    ///
    /// Used for volume keying, where any content change should produce a new
    /// volume. Returns `None` when none of the files exist.
    pub async fn hash_raw_set(&self, names: &[&str]) -> Result<Option<String>> {
        let mut hasher = Sha256::new();
        let mut found = false;
        for name in names {
            if let Some(content) = fs::read_buffered(self.root.join(name)).await? {
                hasher.update(&content);
                found = true;
            }
        }
        if !found {
            return Ok(None);
        }
        Ok(Some(hex::encode(hasher.finalize())))
    }

    /// Find the on-disk spelling of a recognized lockfile, case-insensitively.
    async fn find_on_disk(&self, name: &str) -> Result<Option<String>> {
        // Fast path: exact spelling.
        if fs::is_file(self.root.join(name)).await {
            return Ok(Some(name.to_string()));
        }
        // `cargo.lock` written by case-preserving tools on case-insensitive
        // filesystems is still `Cargo.lock` to us.
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return Ok(None),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.eq_ignore_ascii_case(name)
                && entry.file_type().await.map(|t| t.is_file()).unwrap_or(false)
            {
                return Ok(Some(file_name.to_string()));
            }
        }
        Ok(None)
    }
}

/// Hash a single lockfile's reduced representation.
fn hash_one(name: &str, content: &[u8]) -> String {
    let reduced = reduce(name, content);
    let mut hasher = Sha256::new();
    match reduced {
        Reduced::Records(records) => {
            for record in records {
                hasher.update(record.as_bytes());
                hasher.update(b"\n");
            }
        }
        Reduced::Raw => hasher.update(content),
    }
    hex::encode(hasher.finalize())
}

enum Reduced {
    /// Sorted dependency-identifying records.
    Records(Vec<String>),
    /// Hash the bytes as-is.
    Raw,
}

/// Project the lockfile to its dependency-identifying records.
fn reduce(name: &str, content: &[u8]) -> Reduced {
    let lower = name.to_ascii_lowercase();
    let text = String::from_utf8_lossy(content);
    let records = match lower.as_str() {
        "composer.lock" => reduce_composer(&text),
        "package-lock.json" => reduce_package_lock(&text),
        "pnpm-lock.yaml" => Some(reduce_pnpm_lock(&text)),
        "yarn.lock" => Some(reduce_yarn_lock(&text)),
        "go.sum" => None,
        "go.mod" => Some(reduce_go_mod(&text)),
        "gemfile.lock" => Some(reduce_gemfile_lock(&text)),
        "requirements.txt" => Some(reduce_requirements(&text)),
        "poetry.lock" | "cargo.lock" => Some(reduce_name_version_pairs(&text)),
        "pipfile.lock" => reduce_pipfile_lock(&text),
        _ => None,
    };
    match records {
        Some(mut records) => {
            records.sort();
            Reduced::Records(records)
        }
        None => Reduced::Raw,
    }
}

/// `composer.lock`: the authoritative `content-hash` when present, else
/// production and dev `name@version` pairs plus platform requirements.
fn reduce_composer(text: &str) -> Option<Vec<String>> {
    let doc: Value = serde_json::from_str(text).ok()?;
    if let Some(hash) = doc.get("content-hash").and_then(Value::as_str) {
        return Some(vec![format!("content-hash:{hash}")]);
    }

    let mut records = Vec::new();
    for (section, tag) in [("packages", "pkg"), ("packages-dev", "dev")] {
        if let Some(packages) = doc.get(section).and_then(Value::as_array) {
            for package in packages {
                if let (Some(name), Some(version)) = (
                    package.get("name").and_then(Value::as_str),
                    package.get("version").and_then(Value::as_str),
                ) {
                    records.push(format!("{tag}:{name}@{version}"));
                }
            }
        }
    }
    if let Some(platform) = doc.get("platform").and_then(Value::as_object) {
        for (name, constraint) in platform {
            let constraint = constraint.as_str().unwrap_or_default();
            records.push(format!("platform:{name}={constraint}"));
        }
    }
    Some(records)
}

/// `package-lock.json`: `lockfileVersion` plus the `packages` map
/// (`install-path@version`), falling back to the legacy recursive
/// `dependencies` tree with parent-prefixed names.
fn reduce_package_lock(text: &str) -> Option<Vec<String>> {
    let doc: Value = serde_json::from_str(text).ok()?;
    let mut records = Vec::new();
    if let Some(version) = doc.get("lockfileVersion") {
        records.push(format!("lockfileVersion:{version}"));
    }

    if let Some(packages) = doc.get("packages").and_then(Value::as_object) {
        for (path, entry) in packages {
            if let Some(version) = entry.get("version").and_then(Value::as_str) {
                records.push(format!("{path}@{version}"));
            }
        }
    } else if let Some(dependencies) = doc.get("dependencies").and_then(Value::as_object) {
        walk_legacy_dependencies(dependencies, "", &mut records);
    }
    Some(records)
}

fn walk_legacy_dependencies(
    dependencies: &serde_json::Map<String, Value>,
    prefix: &str,
    records: &mut Vec<String>,
) {
    for (name, entry) in dependencies {
        let qualified = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        if let Some(version) = entry.get("version").and_then(Value::as_str) {
            records.push(format!("{qualified}@{version}"));
        }
        if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
            walk_legacy_dependencies(nested, &qualified, records);
        }
    }
}

/// `pnpm-lock.yaml`: text scan for `lockfileVersion` and `name: version`
/// pairs, excluding registry/settings/specifier lines.
fn reduce_pnpm_lock(text: &str) -> Vec<String> {
    const EXCLUDED_KEYS: &[&str] = &["registry", "settings", "specifier", "specifiers"];

    let mut records = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim().trim_matches(['\'', '"']);
        let value = value.trim().trim_matches(['\'', '"']);
        if value.is_empty() {
            // Section header.
            continue;
        }
        if key == "lockfileVersion" {
            records.push(format!("lockfileVersion:{value}"));
            continue;
        }
        if EXCLUDED_KEYS.contains(&key) {
            continue;
        }
        records.push(format!("{key}:{value}"));
    }
    records
}

/// `yarn.lock`: the version-banner comment plus each stanza's
/// `name@range` header combined with its resolved `version`.
fn reduce_yarn_lock(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut header: Option<String> = None;
    for line in text.lines() {
        if line.starts_with('#') {
            if line.contains("yarn lockfile") {
                records.push(line.trim().to_string());
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(char::is_whitespace) && line.trim_end().ends_with(':') {
            header = Some(line.trim_end().trim_end_matches(':').replace('"', ""));
            continue;
        }
        if let Some(version) = line.trim().strip_prefix("version ") {
            if let Some(header) = &header {
                let version = version.trim().trim_matches('"');
                records.push(format!("{header}={version}"));
            }
        }
    }
    records
}

/// `go.mod`: `require` directives only.
fn reduce_go_mod(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut in_require_block = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if in_require_block {
            if trimmed == ")" {
                in_require_block = false;
                continue;
            }
            if trimmed.is_empty() || trimmed.starts_with("//") {
                continue;
            }
            let module = trimmed.split("//").next().unwrap_or(trimmed).trim();
            records.push(module.to_string());
            continue;
        }
        if trimmed == "require (" {
            in_require_block = true;
        } else if let Some(module) = trimmed.strip_prefix("require ") {
            records.push(module.trim().to_string());
        }
    }
    records
}

/// `Gemfile.lock`: the `specs:` block's resolved `name (version)` entries.
fn reduce_gemfile_lock(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut in_specs = false;
    for line in text.lines() {
        if line.trim() == "specs:" {
            in_specs = true;
            continue;
        }
        if in_specs {
            if !line.starts_with("    ") {
                in_specs = false;
                continue;
            }
            // Six-space entries are transitive constraints, not resolutions.
            if line.starts_with("      ") {
                continue;
            }
            let trimmed = line.trim();
            if let Some((name, version)) = trimmed.split_once(" (") {
                records.push(format!("{name}@{}", version.trim_end_matches(')')));
            }
        }
    }
    records
}

/// `requirements.txt`: drop comments, empty lines, and `-…` option lines.
fn reduce_requirements(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .map(str::to_string)
        .collect()
}

/// `poetry.lock` / `Cargo.lock`: text scan for `name = "…"` followed by
/// `version = "…"` pairs.
fn reduce_name_version_pairs(text: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut name: Option<String> = None;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            name = None;
        } else if let Some(value) = trimmed.strip_prefix("name = ") {
            name = Some(value.trim_matches('"').to_string());
        } else if let Some(value) = trimmed.strip_prefix("version = ") {
            if let Some(name) = name.take() {
                records.push(format!("{name}@{}", value.trim_matches('"')));
            }
        }
    }
    records
}

/// `Pipfile.lock`: `default` and `develop` objects' `name@version`, tagged
/// to distinguish the two.
fn reduce_pipfile_lock(text: &str) -> Option<Vec<String>> {
    let doc: Value = serde_json::from_str(text).ok()?;
    let mut records = Vec::new();
    for section in ["default", "develop"] {
        if let Some(packages) = doc.get(section).and_then(Value::as_object) {
            for (name, entry) in packages {
                let version = entry
                    .get("version")
                    .and_then(Value::as_str)
                    .or_else(|| entry.as_str())
                    .unwrap_or("*");
                records.push(format!("{section}:{name}@{version}"));
            }
        }
    }
    Some(records)
}
