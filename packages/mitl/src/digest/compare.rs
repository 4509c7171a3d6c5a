//! Comparison of two project digests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ProjectDigest;

/// The difference between two digests, as sorted path sets.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct DigestDiff {
    /// The combined hashes coincide.
    pub identical: bool,
    /// The per-file algorithm differs between the two digests.
    pub algorithm_changed: bool,
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

impl DigestDiff {
    /// Whether the change warrants a new capsule.
    ///
    /// Any non-empty diff set or an algorithm change is significant; equal
    /// file sets with only a metadata change are not.
    pub fn is_significant(&self) -> bool {
        self.algorithm_changed
            || !self.added.is_empty()
            || !self.modified.is_empty()
            || !self.removed.is_empty()
    }

    /// Human-readable summary, enumerating only non-empty categories in the
    /// fixed order added / modified / removed.
    pub fn summary(&self) -> String {
        if self.identical {
            return "no changes".to_string();
        }
        let mut parts = Vec::new();
        for (set, verb) in [
            (&self.added, "added"),
            (&self.modified, "modified"),
            (&self.removed, "removed"),
        ] {
            match set.len() {
                0 => {}
                1 => parts.push(format!("1 file {verb}")),
                n => parts.push(format!("{n} files {verb}")),
            }
        }
        if parts.is_empty() {
            "no file changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Diff two digests into added / modified / removed path sets.
pub fn compare(old: &ProjectDigest, new: &ProjectDigest) -> DigestDiff {
    if old.hash == new.hash {
        return DigestDiff {
            identical: true,
            algorithm_changed: old.algorithm != new.algorithm,
            ..DigestDiff::default()
        };
    }

    let old_files: BTreeMap<&str, &str> = old
        .files
        .iter()
        .map(|entry| (entry.path.as_str(), entry.hash.as_str()))
        .collect();
    let new_files: BTreeMap<&str, &str> = new
        .files
        .iter()
        .map(|entry| (entry.path.as_str(), entry.hash.as_str()))
        .collect();

    let mut diff = DigestDiff {
        identical: false,
        algorithm_changed: old.algorithm != new.algorithm,
        ..DigestDiff::default()
    };
    for (path, hash) in &new_files {
        match old_files.get(path) {
            None => diff.added.push((*path).to_string()),
            Some(old_hash) if old_hash != hash => diff.modified.push((*path).to_string()),
            Some(_) => {}
        }
    }
    for path in old_files.keys() {
        if !new_files.contains_key(path) {
            diff.removed.push((*path).to_string());
        }
    }
    // BTreeMap iteration already yields sorted paths.
    diff
}
