//! Invocation of the underlying container runtime.
//!
//! The runtime (`docker`, `podman`, …) is spawned as a child process with
//! text arguments; only a small subset of its command-line surface is
//! consumed. Exit codes are used strictly as success/failure.

use std::{path::Path, process::Stdio};

use color_eyre::{
    Report, Result,
    eyre::{Context, bail},
};
use derive_more::Display;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, instrument, trace, warn};

use crate::{
    config::Config,
    error::{self, classify_build_failure, classify_run_failure, runtime_not_installed},
};

/// Runtimes probed, in order, when no preference is configured.
pub const KNOWN_RUNTIMES: &[&str] = &["docker", "podman", "nerdctl", "finch", "container"];

/// Environment override for the build runtime.
pub const BUILD_CLI_ENV: &str = "MITL_BUILD_CLI";

/// Environment override for the run runtime.
pub const RUN_CLI_ENV: &str = "MITL_RUN_CLI";

/// A resolved container runtime.
#[derive(Clone, Eq, PartialEq, Debug, Display)]
#[display("{name}")]
pub struct Runtime {
    name: String,
}

impl Runtime {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the runtime used for builds: environment override, then the
    /// configured preference, then the first installed known runtime.
    pub async fn resolve_build(config: &Config) -> Result<Self> {
        Self::resolve(BUILD_CLI_ENV, config.build_cli.as_deref()).await
    }

    /// Resolve the runtime used for runs.
    pub async fn resolve_run(config: &Config) -> Result<Self> {
        Self::resolve(RUN_CLI_ENV, config.run_cli.as_deref()).await
    }

    async fn resolve(env_var: &str, configured: Option<&str>) -> Result<Self> {
        if let Ok(name) = std::env::var(env_var) {
            if !name.is_empty() {
                return Ok(Self::new(name));
            }
        }
        if let Some(name) = configured {
            return Ok(Self::new(name));
        }
        Self::probe().await
    }

    /// Find the first installed runtime from the known set.
    #[instrument]
    pub async fn probe() -> Result<Self> {
        for candidate in KNOWN_RUNTIMES {
            let probe = tokio::process::Command::new(candidate)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if matches!(probe, Ok(status) if status.success()) {
                debug!(runtime = candidate, "probed container runtime");
                return Ok(Self::new(*candidate));
            }
        }
        Err(Report::new(runtime_not_installed("container runtime")))
    }

    /// Whether an image with the given tag exists in the runtime's store.
    #[instrument(skip(self), fields(runtime = %self.name))]
    pub async fn image_exists(&self, tag: &str) -> Result<bool> {
        let output = tokio::process::Command::new(&self.name)
            .args(["images", "-q", tag])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if let Some(classified) = classify_run_failure(&self.name, &stderr) {
                return Err(Report::new(classified));
            }
            bail!("{} images query failed: {}", self.name, stderr.trim());
        }
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    /// Build an image from a recipe file, streaming output through.
    ///
    /// Standard output is inherited; standard error is tee'd to the parent
    /// and buffered so the failure class can be recovered afterwards.
    #[instrument(skip(self), fields(runtime = %self.name))]
    pub async fn build(
        &self,
        tag: &str,
        platform: Option<&str>,
        recipe: &Path,
        context_dir: &Path,
    ) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.name);
        command.args(["build", "-t", tag]);
        if let Some(platform) = platform {
            command.args(["--platform", platform]);
        }
        command.arg("-f").arg(recipe).arg(context_dir);
        command.stdin(Stdio::null());
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::piped());
        trace!(?command, "invoke build");

        let mut child = command.spawn().map_err(|err| self.spawn_error(err))?;
        let stderr = child.stderr.take().expect("stderr was piped");
        let tee = tokio::spawn(async move {
            let mut buffered = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                eprintln!("{line}");
                buffered.push_str(&line);
                buffered.push('\n');
            }
            buffered
        });

        let status = child.wait().await.context("wait for build")?;
        let buffered = tee.await.context("join stderr reader")?;
        if !status.success() {
            return Err(Report::new(classify_build_failure(&self.name, &buffered)));
        }
        Ok(())
    }

    /// Run a container command, streaming standard streams through.
    ///
    /// With `interactive` the child owns the terminal; otherwise stderr is
    /// tee'd so failures can be classified.
    #[instrument(skip(self, args), fields(runtime = %self.name))]
    pub async fn run(&self, args: &[String], interactive: bool) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.name);
        command.arg("run").args(args);
        trace!(?command, "invoke run");

        if interactive {
            let status = command
                .spawn()
                .map_err(|err| self.spawn_error(err))?
                .wait()
                .await
                .context("wait for run")?;
            if !status.success() {
                bail!("{} run exited with status: {status}", self.name);
            }
            return Ok(());
        }

        command.stdout(Stdio::inherit());
        command.stderr(Stdio::piped());
        let mut child = command.spawn().map_err(|err| self.spawn_error(err))?;
        let stderr = child.stderr.take().expect("stderr was piped");
        let tee = tokio::spawn(async move {
            let mut buffered = String::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                eprintln!("{line}");
                buffered.push_str(&line);
                buffered.push('\n');
            }
            buffered
        });

        let status = child.wait().await.context("wait for run")?;
        let buffered = tee.await.context("join stderr reader")?;
        if !status.success() {
            if let Some(classified) = classify_run_failure(&self.name, &buffered) {
                return Err(Report::new(classified));
            }
            bail!("{} run exited with status: {status}", self.name);
        }
        Ok(())
    }

    /// Whether a named volume exists.
    ///
    /// `volume inspect` failures fall back to a list-and-match probe, since
    /// some runtimes return nonzero for perfectly healthy daemons.
    #[instrument(skip(self), fields(runtime = %self.name))]
    pub async fn volume_exists(&self, name: &str) -> Result<bool> {
        let inspect = tokio::process::Command::new(&self.name)
            .args(["volume", "inspect", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Ok(status) = inspect {
            if status.success() {
                return Ok(true);
            }
        }

        let output = tokio::process::Command::new(&self.name)
            .args(["volume", "ls"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(listing
            .split_whitespace()
            .any(|token| token == name))
    }

    /// Create a named volume.
    #[instrument(skip(self), fields(runtime = %self.name))]
    pub async fn volume_create(&self, name: &str) -> Result<()> {
        let output = tokio::process::Command::new(&self.name)
            .args(["volume", "create", name])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            bail!(
                "{} volume create {name} failed: {}",
                self.name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    /// Remove a named volume.
    #[instrument(skip(self), fields(runtime = %self.name))]
    pub async fn volume_remove(&self, name: &str, force: bool) -> Result<()> {
        let mut command = tokio::process::Command::new(&self.name);
        command.args(["volume", "rm"]);
        if force {
            command.arg("-f");
        }
        command.arg(name);
        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| self.spawn_error(err))?;
        if !output.status.success() {
            warn!(
                name,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "volume removal failed"
            );
        }
        Ok(())
    }

    fn spawn_error(&self, err: std::io::Error) -> color_eyre::Report {
        if err.kind() == std::io::ErrorKind::NotFound {
            Report::new(runtime_not_installed(&self.name))
        } else if err.kind() == std::io::ErrorKind::PermissionDenied {
            Report::new(
                error::MitlError::new(
                    error::ErrorKind::PermissionDenied,
                    format!("permission denied spawning {}", self.name),
                )
                .with_context("runtime", self.name.clone()),
            )
        } else {
            color_eyre::Report::new(err).wrap_err(format!("spawn {}", self.name))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::error::{ErrorKind, MitlError};

    use super::*;

    #[test_log::test(tokio::test)]
    async fn missing_binary_maps_to_runtime_not_found() {
        let runtime = Runtime::new("mitl-test-runtime-that-does-not-exist");
        let err = runtime.image_exists("mitl-capsule:abc").await.unwrap_err();
        let classified = err.downcast_ref::<MitlError>().unwrap();
        assert_eq!(classified.kind, ErrorKind::RuntimeNotFound);
    }

    #[test_log::test(tokio::test)]
    async fn env_override_wins() {
        // Process-global environment; restore afterwards.
        unsafe { std::env::set_var(BUILD_CLI_ENV, "nerdctl") };
        let runtime = Runtime::resolve_build(&Config::default()).await.unwrap();
        unsafe { std::env::remove_var(BUILD_CLI_ENV) };
        assert_eq!(runtime.name(), "nerdctl");
    }

    #[test_log::test(tokio::test)]
    async fn configured_preference_wins_without_env() {
        unsafe { std::env::remove_var(RUN_CLI_ENV) };
        let config = Config {
            run_cli: Some("finch".to_string()),
            ..Config::default()
        };
        let runtime = Runtime::resolve_run(&config).await.unwrap();
        assert_eq!(runtime.name(), "finch");
    }
}
