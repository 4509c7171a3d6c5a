use color_eyre::Result;
use pretty_assertions::assert_eq;

use mitl::{
    detect::ProjectType,
    lockfile::{LockfileHasher, NO_LOCKFILES},
    runtime::Runtime,
    volume::{PNPM_STORE_CONTAINER_PATH, VolumeManager, intercept_node_command},
};

use crate::{temporary_directory, write_file};

/// Volume creation fails against this runtime; the manager must still hand
/// out deterministic names.
fn offline_runtime() -> Runtime {
    Runtime::new("mitl-it-no-such-runtime")
}

#[test_log::test(tokio::test)]
async fn node_mounts_cover_modules_and_store() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(
        &root,
        "package.json",
        r#"{"dependencies": {"next": "13.0.0"}}"#,
    );
    let (_state_guard, state) = temporary_directory();

    let manager =
        VolumeManager::open_at(offline_runtime(), &root, state.join("volumes.json")).await?;
    let flags = manager.mounts_for(ProjectType::NodeNext).await?;
    let joined = flags.join(" ");
    assert!(joined.contains("/app/node_modules"));
    assert!(joined.contains(PNPM_STORE_CONTAINER_PATH));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn mount_names_are_stable_between_calls() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(&root, "pnpm-lock.yaml", "lockfileVersion: '9.0'\n");
    write_file(&root, "package.json", "{}");
    let (_state_guard, state) = temporary_directory();

    let manager =
        VolumeManager::open_at(offline_runtime(), &root, state.join("volumes.json")).await?;
    let first = manager.mounts_for(ProjectType::Node).await?;
    let second = manager.mounts_for(ProjectType::Node).await?;
    assert_eq!(first, second);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn go_sum_only_project_has_a_lockfile_hash() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(&root, "go.sum", "github.com/pkg/errors v0.9.1 h1:abc=\n");

    let hash = LockfileHasher::new(&root).hash_lockfiles().await?;
    assert_eq!(hash.len(), 16);
    assert_ne!(hash, NO_LOCKFILES);
    Ok(())
}

#[test]
fn npm_ci_interception_shape() {
    let argv: Vec<String> = vec!["npm".to_string(), "ci".to_string()];
    let intercepted = intercept_node_command(&argv);

    assert_eq!(intercepted.len(), 3);
    assert_eq!(intercepted[0], "sh");
    assert_eq!(intercepted[1], "-lc");
    assert!(intercepted[2].contains("corepack prepare pnpm@latest --activate"));
    assert!(
        intercepted[2]
            .contains("pnpm install --frozen-lockfile || pnpm install --no-frozen-lockfile")
    );
}
