//! Deletes volumes that have not been used recently.

use clap::Args;
use color_eyre::Result;
use tracing::instrument;

use mitl::{config::Config, runtime::Runtime, volume::VolumeManager};

#[derive(Clone, Args, Debug)]
pub struct Options {
    /// Delete volumes unused for more than this many days.
    #[arg(long, default_value_t = 30)]
    days: u64,

    /// Print the plan without deleting anything.
    #[arg(long)]
    dry_run: bool,
}

#[instrument]
pub async fn exec(options: Options) -> Result<()> {
    let config = Config::load().await?;
    let runtime = Runtime::resolve_run(&config).await?;
    let root = super::super::project_root()?;
    let manager = VolumeManager::open(runtime, root).await?;

    let affected = manager.clean_old(options.days, options.dry_run).await?;
    if affected.is_empty() {
        println!("nothing to clean");
        return Ok(());
    }
    for name in &affected {
        if options.dry_run {
            println!("would delete {name}");
        } else {
            println!("deleted {name}");
        }
    }
    Ok(())
}
