//! Filesystem operations tailored to `mitl`.
//!
//! Reads of optional files return `Option` so that callers can treat a
//! missing file as "use defaults" instead of an error.

use std::{
    fmt::Debug as StdDebug,
    path::{Path, PathBuf},
};

use color_eyre::{
    Result,
    eyre::{Context, OptionExt},
};
use tap::TapFallible;
use tracing::{instrument, trace};

/// Configuration record, directly under the user's home directory.
const CONFIG_FILE: &str = ".mitl.json";

/// State directory under the user's home directory.
const STATE_DIR: &str = ".mitl";

/// Volumes registry file, inside the state directory.
const VOLUMES_FILE: &str = "volumes.json";

/// The current user's home directory.
///
/// This can fail if the user has no home directory,
/// or if the home directory cannot be accessed.
pub fn user_home() -> Result<PathBuf> {
    homedir::my_home()
        .context("get user home directory")?
        .ok_or_eyre("user has no home directory")
}

/// Path of the persisted configuration record (`$HOME/.mitl.json`).
pub fn config_path() -> Result<PathBuf> {
    Ok(user_home()?.join(CONFIG_FILE))
}

/// Path of the persisted volumes registry (`$HOME/.mitl/volumes.json`).
pub fn volumes_registry_path() -> Result<PathBuf> {
    Ok(user_home()?.join(STATE_DIR).join(VOLUMES_FILE))
}

/// Create the directory and all its parents, if they don't already exist.
#[instrument]
pub async fn create_dir_all(dir: impl AsRef<Path> + StdDebug) -> Result<()> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create dir: {dir:?}"))
        .tap_ok(|_| trace!(?dir, "create directory"))
}

/// Buffer the file content from disk.
/// Returns `None` if the file does not exist.
#[instrument]
pub async fn read_buffered(path: impl AsRef<Path> + StdDebug) -> Result<Option<Vec<u8>>> {
    let path = path.as_ref();
    match tokio::fs::read(path).await {
        Ok(buf) => {
            trace!(?path, bytes = buf.len(), "read file");
            Ok(Some(buf))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).context(format!("read file: {path:?}")),
    }
}

/// Buffer the file content from disk and parse it as UTF8.
/// Returns `None` if the file does not exist.
#[instrument]
pub async fn read_buffered_utf8(path: impl AsRef<Path> + StdDebug) -> Result<Option<String>> {
    let path = path.as_ref();
    match tokio::fs::read_to_string(path).await {
        Ok(buf) => {
            trace!(?path, bytes = buf.len(), "read file as string");
            Ok(Some(buf))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).context(format!("read file: {path:?}")),
    }
}

/// Write the provided file content to disk, creating parent directories.
#[instrument(skip(content))]
pub async fn write(path: impl AsRef<Path> + StdDebug, content: impl AsRef<[u8]>) -> Result<()> {
    let (path, content) = (path.as_ref(), content.as_ref());
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .await
            .context("create parent directory")?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("write file: {path:?}"))
        .tap_ok(|_| trace!(?path, bytes = content.len(), "write file"))
}

/// Get the metadata for a file.
/// Returns `None` if the file does not exist.
pub async fn metadata(path: impl AsRef<Path> + StdDebug) -> Result<Option<std::fs::Metadata>> {
    let path = path.as_ref();
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).context(format!("read metadata: {path:?}")),
    }
}

/// Report whether the path exists and is a regular file.
pub async fn is_file(path: impl AsRef<Path> + StdDebug) -> bool {
    matches!(tokio::fs::metadata(path.as_ref()).await, Ok(m) if m.is_file())
}
