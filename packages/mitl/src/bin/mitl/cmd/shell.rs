//! Opens an interactive shell inside the capsule.

use clap::Args;
use color_eyre::Result;
use tracing::instrument;

use mitl::run;

#[derive(Clone, Args, Debug)]
pub struct Options {}

#[instrument]
pub async fn exec(_options: Options) -> Result<()> {
    let root = super::project_root()?;
    run::shell(&root).await
}
