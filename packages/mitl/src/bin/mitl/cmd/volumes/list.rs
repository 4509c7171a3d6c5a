//! Lists the volumes registry.

use color_eyre::Result;
use humansize::{DECIMAL, format_size};
use tracing::instrument;

use mitl::{config::Config, runtime::Runtime, volume::VolumeManager};

#[instrument]
pub async fn exec() -> Result<()> {
    let config = Config::load().await?;
    let runtime = Runtime::resolve_run(&config).await?;
    let root = super::super::project_root()?;
    let manager = VolumeManager::open(runtime, root).await?;

    let entries = manager.entries().await;
    if entries.is_empty() {
        println!("no volumes registered");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {}  {}  used {} time(s), last {}",
            entry.name,
            entry.volume_type,
            format_size(entry.size_bytes, DECIMAL),
            entry.access_count,
            entry.last_used,
        );
    }
    Ok(())
}
