//! Persisted configuration record.
//!
//! Lives at `$HOME/.mitl.json`. Absence is not an error: a missing file
//! yields defaults. Writes are last-writer-wins; there is no cross-process
//! locking.

use std::{collections::HashMap, path::Path, time::Duration};

use color_eyre::{Result, eyre::Context};
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};

use crate::fs;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred runtime for `build` invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_cli: Option<String>,

    /// Preferred runtime for `run` invocations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_cli: Option<String>,

    /// Last observed build duration, keyed by 12-hex project tag.
    pub last_build_seconds: HashMap<String, f64>,
}

impl Config {
    /// Load the configuration from its default location.
    pub async fn load() -> Result<Self> {
        Self::load_from(fs::config_path()?).await
    }

    /// Load the configuration from an explicit path.
    #[instrument]
    pub async fn load_from(path: impl AsRef<Path> + std::fmt::Debug) -> Result<Self> {
        let path = path.as_ref();
        let Some(content) = fs::read_buffered(path).await? else {
            trace!(?path, "no configuration file, using defaults");
            return Ok(Self::default());
        };
        serde_json::from_slice(&content).with_context(|| format!("parse configuration: {path:?}"))
    }

    /// Persist the configuration to its default location.
    pub async fn save(&self) -> Result<()> {
        self.save_to(fs::config_path()?).await
    }

    /// Persist the configuration to an explicit path.
    #[instrument(skip(self))]
    pub async fn save_to(&self, path: impl AsRef<Path> + std::fmt::Debug) -> Result<()> {
        let content = serde_json::to_vec_pretty(self).context("serialize configuration")?;
        fs::write(path.as_ref(), content).await
    }

    /// Record the build duration for a project tag.
    pub fn record_build_duration(&mut self, tag: &str, duration: Duration) {
        self.last_build_seconds
            .insert(tag.to_string(), duration.as_secs_f64());
    }

    /// The last recorded build duration for a project tag.
    pub fn last_build_duration(&self, tag: &str) -> Option<Duration> {
        self.last_build_seconds
            .get(tag)
            .map(|seconds| Duration::from_secs_f64(*seconds))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join(".mitl.json")).await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[test_log::test(tokio::test)]
    async fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mitl.json");

        let mut config = Config {
            build_cli: Some("podman".to_string()),
            ..Config::default()
        };
        config.record_build_duration("abc123def456", Duration::from_secs_f64(12.5));
        config.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.last_build_duration("abc123def456"),
            Some(Duration::from_secs_f64(12.5))
        );
        assert_eq!(loaded.last_build_duration("other"), None);
    }

    #[test_log::test(tokio::test)]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mitl.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).await.is_err());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let config: Config =
            serde_json::from_str(r#"{"build_cli": "docker", "future_field": 1}"#).unwrap();
        assert_eq!(config.build_cli.as_deref(), Some("docker"));
    }
}
