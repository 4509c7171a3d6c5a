//! Node dependency analysis.

use std::path::Path;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tracing::instrument;

use crate::fs;

pub const DEFAULT_NODE_VERSION: &str = "20";

/// Package manager preference, driven by the first lockfile present.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Npm,
    Yarn,
    Pnpm,
}

/// Node engine requirements for a project.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct NodeBlock {
    /// Major version of the Node runtime.
    pub version: String,
    pub package_manager: PackageManager,
    /// Whether native build tools are required (a `build` script exists).
    pub build_tools: bool,
}

impl Default for NodeBlock {
    fn default() -> Self {
        Self {
            version: DEFAULT_NODE_VERSION.to_string(),
            package_manager: PackageManager::default(),
            build_tools: false,
        }
    }
}

/// Analyze Node requirements from `package.json` and the lockfiles present.
#[instrument(skip(root))]
pub async fn analyze(root: &Path) -> Result<NodeBlock> {
    let mut block = NodeBlock::default();

    if let Some(content) = fs::read_buffered_utf8(root.join("package.json")).await? {
        if let Ok(doc) = serde_json::from_str::<Value>(&content) {
            if let Some(engine) = doc
                .get("engines")
                .and_then(|engines| engines.get("node"))
                .and_then(Value::as_str)
            {
                if let Some(major) = major_version(engine) {
                    block.version = major;
                }
            }
            block.build_tools = doc
                .get("scripts")
                .and_then(|scripts| scripts.get("build"))
                .is_some();
        }
    }

    block.package_manager = if fs::is_file(root.join("pnpm-lock.yaml")).await {
        PackageManager::Pnpm
    } else if fs::is_file(root.join("yarn.lock")).await {
        PackageManager::Yarn
    } else {
        PackageManager::Npm
    };

    Ok(block)
}

/// Extract the major version from an `engines.node` constraint.
fn major_version(constraint: &str) -> Option<String> {
    lazy_regex::regex_captures!(r"(\d+)", constraint).map(|(_, major)| major.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    use super::*;

    #[test_case(">=18.17.0", Some("18"); "gte")]
    #[test_case("^20", Some("20"); "caret")]
    #[test_case("lts/*", None; "alias")]
    #[test]
    fn extracts_major_version(constraint: &str, expected: Option<&str>) {
        pretty_assertions::assert_eq!(major_version(constraint).as_deref(), expected);
    }

    #[test_log::test(tokio::test)]
    async fn defaults_without_signals() {
        let dir = tempfile::tempdir().unwrap();
        let block = analyze(dir.path()).await.unwrap();
        assert_eq!(block.version, DEFAULT_NODE_VERSION);
        assert_eq!(block.package_manager, PackageManager::Npm);
        assert!(!block.build_tools);
    }

    #[test_log::test(tokio::test)]
    async fn engines_and_build_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"engines": {"node": ">=18.0.0"}, "scripts": {"build": "next build"}}"#,
        )
        .unwrap();

        let block = analyze(dir.path()).await.unwrap();
        assert_eq!(block.version, "18");
        assert!(block.build_tools);
    }

    #[test_log::test(tokio::test)]
    async fn pnpm_lockfile_wins_over_yarn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pnpm-lock.yaml"), "lockfileVersion: '9.0'\n").unwrap();
        std::fs::write(dir.path().join("yarn.lock"), "# yarn lockfile v1\n").unwrap();

        let block = analyze(dir.path()).await.unwrap();
        assert_eq!(block.package_manager, PackageManager::Pnpm);
    }

    #[test_log::test(tokio::test)]
    async fn yarn_lockfile_selects_yarn() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("yarn.lock"), "# yarn lockfile v1\n").unwrap();

        let block = analyze(dir.path()).await.unwrap();
        assert_eq!(block.package_manager, PackageManager::Yarn);
    }
}
