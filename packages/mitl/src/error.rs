//! Structured errors surfaced by the core.
//!
//! Typed errors are created here and wrapped in `eyre::Report` at the
//! boundaries; callers that need to branch on the failure class can
//! `downcast_ref::<MitlError>()`.

use std::collections::BTreeMap;

use strum::Display;
use thiserror::Error;

/// The failure classes surfaced by the core.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum ErrorKind {
    DiskFull,
    BuildFailed,
    RuntimeNotRunning,
    RuntimePermission,
    RuntimeNotFound,
    PermissionDenied,
    Unknown,
}

/// A structured error: kind, message, optional context, and actionable
/// suggestions.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct MitlError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: BTreeMap<String, String>,
    pub suggestions: Vec<String>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MitlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: BTreeMap::new(),
            suggestions: Vec::new(),
            source: None,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Stderr fragments that indicate disk exhaustion.
const DISK_FULL_MARKERS: &[&str] = &["no space left on device", "no space left"];

/// Classify a failed `build` by its buffered stderr.
///
/// Disk exhaustion is promoted from a generic build failure to a
/// distinguished disk-full error.
pub fn classify_build_failure(runtime: &str, stderr: &str) -> MitlError {
    let lowered = stderr.to_lowercase();
    if DISK_FULL_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        return MitlError::new(
            ErrorKind::DiskFull,
            format!("{runtime} ran out of disk space during the build"),
        )
        .with_context("runtime", runtime)
        .with_suggestion("free up disk space and retry")
        .with_suggestion(format!("`{runtime} system prune` reclaims unused images"));
    }
    MitlError::new(ErrorKind::BuildFailed, format!("{runtime} build failed"))
        .with_context("runtime", runtime)
        .with_suggestion("inspect the build output above for the failing step")
}

/// Classify a failed `run` by its buffered stderr, when the failure class is
/// recognizable.
pub fn classify_run_failure(runtime: &str, stderr: &str) -> Option<MitlError> {
    let lowered = stderr.to_lowercase();
    if lowered.contains("daemon") && lowered.contains("running")
        || lowered.contains("cannot connect to the docker daemon")
    {
        return Some(
            MitlError::new(
                ErrorKind::RuntimeNotRunning,
                format!("the {runtime} daemon is not running"),
            )
            .with_context("runtime", runtime)
            .with_suggestion(format!("start {runtime} and retry")),
        );
    }
    if lowered.contains("permission denied") {
        return Some(
            MitlError::new(
                ErrorKind::RuntimePermission,
                format!("permission denied talking to {runtime}"),
            )
            .with_context("runtime", runtime)
            .with_suggestion(format!("check your user's access to the {runtime} socket")),
        );
    }
    if lowered.contains("no such file") || lowered.contains("executable file not found") {
        return Some(
            MitlError::new(
                ErrorKind::RuntimeNotFound,
                format!("{runtime} reported a missing file"),
            )
            .with_context("runtime", runtime),
        );
    }
    None
}

/// Error for a runtime binary that is not installed.
pub fn runtime_not_installed(runtime: &str) -> MitlError {
    MitlError::new(
        ErrorKind::RuntimeNotFound,
        format!("{runtime} is not installed or not on PATH"),
    )
    .with_context("runtime", runtime)
    .with_suggestion("install a container runtime (docker, podman, nerdctl, finch, or container)")
}
