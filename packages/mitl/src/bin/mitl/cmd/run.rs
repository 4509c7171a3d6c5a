//! Runs a command inside the capsule.

use color_eyre::{Result, eyre::bail};
use tracing::instrument;

use mitl::run;

#[instrument]
pub async fn exec(args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        bail!("no command given; try `mitl run <command…>`");
    }
    let root = super::project_root()?;
    run::run(&root, args).await
}
