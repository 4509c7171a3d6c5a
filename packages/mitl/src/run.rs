//! The run and shell orchestrators: execute a command inside the capsule
//! with the project and its dependency volumes mounted.

use std::path::Path;

use color_eyre::{Result, eyre::Context};
use tracing::{debug, instrument};

use crate::{
    capsule::CapsuleTag,
    config::Config,
    detect,
    digest::{self, DigestOptions},
    runtime::Runtime,
    volume::{VolumeManager, intercept_node_command},
};

/// Run a command inside the project's capsule.
#[instrument(skip(argv))]
pub async fn run(root: &Path, argv: Vec<String>) -> Result<()> {
    exec(root, argv, false).await
}

/// Open an interactive shell inside the project's capsule.
#[instrument]
pub async fn shell(root: &Path) -> Result<()> {
    exec(root, vec!["/bin/bash".to_string()], true).await
}

async fn exec(root: &Path, argv: Vec<String>, interactive: bool) -> Result<()> {
    let config = Config::load().await.context("load configuration")?;
    let runtime = Runtime::resolve_run(&config)
        .await
        .context("resolve run runtime")?;

    let tag = digest::project_tag(root, &DigestOptions::default())
        .await
        .context("compute project tag")?;
    let tag = CapsuleTag::from_digest_hash(&tag)?;

    let detection = detect::detect(root).await.context("detect project")?;
    let volumes = VolumeManager::open(runtime.clone(), root)
        .await
        .context("open volume manager")?;
    let mounts = volumes
        .mounts_for(detection.project_type)
        .await
        .context("compute volume mounts")?;

    let argv = if detection.project_type.is_node() {
        intercept_node_command(&argv)
    } else {
        argv
    };

    let mut args = vec!["--rm".to_string()];
    if interactive {
        args.push("-it".to_string());
    }
    args.extend(mounts);
    // Package installs write to the mounted node_modules volume, which is
    // owned by root inside the capsule.
    if requests_package_mutation(&argv) {
        args.push("--user".to_string());
        args.push("0".to_string());
    }
    args.push("-w".to_string());
    args.push("/app".to_string());
    args.push(tag.image_ref());
    args.extend(argv);

    debug!(runtime = %runtime, ?args, "running in capsule");
    runtime.run(&args, interactive).await
}

/// Whether the command mutates installed packages (`install`, `add`, `ci`).
fn requests_package_mutation(argv: &[String]) -> bool {
    argv.iter()
        .flat_map(|arg| arg.split_whitespace())
        .any(|word| matches!(word, "install" | "add" | "ci"))
}

#[cfg(test)]
mod tests {
    use simple_test_case::test_case;

    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test_case(&["npm", "install"], true; "install")]
    #[test_case(&["yarn", "add", "react"], true; "add")]
    #[test_case(&["npm", "ci"], true; "ci")]
    #[test_case(&["sh", "-lc", "corepack pnpm install --frozen-lockfile"], true; "intercepted_install")]
    #[test_case(&["pnpm", "run", "build"], false; "run_script")]
    #[test_case(&["python", "main.py"], false; "unrelated")]
    #[test]
    fn detects_package_mutations(parts: &[&str], expected: bool) {
        assert_eq!(requests_package_mutation(&argv(parts)), expected);
    }
}
