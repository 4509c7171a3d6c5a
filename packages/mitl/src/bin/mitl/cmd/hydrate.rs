//! Builds (or reuses) the capsule for the current project state.

use clap::Args;
use color_eyre::Result;
use tracing::instrument;

use mitl::hydrate;

#[derive(Clone, Args, Debug)]
pub struct Options {}

#[instrument]
pub async fn exec(_options: Options) -> Result<()> {
    let root = super::project_root()?;
    hydrate::hydrate(&root).await?;
    Ok(())
}
