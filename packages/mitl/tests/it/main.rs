//! Integration tests for `mitl`.
//!
//! These exercise the crate end-to-end over temporary project trees. No
//! container runtime is required: runtime interactions are exercised only
//! up to command construction.

use std::path::{Path, PathBuf};

mod detect;
mod digest;
mod volumes;

/// Create a temporary directory, returning the guard and its path.
///
/// The guard must be held for the duration of the test; dropping it deletes
/// the directory.
pub fn temporary_directory() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temporary directory");
    let path = dir.path().to_path_buf();
    (dir, path)
}

/// Write a file under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directories");
    }
    std::fs::write(path, content).expect("write file");
}
