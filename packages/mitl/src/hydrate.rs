//! The hydrate orchestrator: make sure the capsule for the current project
//! state exists.
//!
//! Sequence: compute the project tag, consult the capsule cache, and on a
//! miss detect the project, generate a recipe, and invoke a streaming
//! runtime build. Successful build durations are recorded so later cache
//! hits can report time saved.

use std::{
    path::Path,
    time::{Duration, Instant},
};

use color_eyre::{Result, eyre::Context};
use colored::Colorize as _;
use tracing::{debug, info, instrument};

use crate::{
    capsule::{CapsuleCache, CapsuleTag},
    config::Config,
    detect,
    digest::{DigestCalculator, DigestOptions},
    fs, recipe,
    runtime::Runtime,
};

/// Environment override for the target build platform.
pub const PLATFORM_ENV: &str = "MITL_PLATFORM";

/// Name of the recipe file written into the scratch directory.
const RECIPE_FILE: &str = "Capsulefile";

/// The result of a hydrate.
#[derive(Debug)]
pub struct HydrateOutcome {
    pub tag: CapsuleTag,
    pub cache_hit: bool,
    pub build_duration: Option<Duration>,
}

/// Hydrate the capsule for the project at `root`.
#[instrument]
pub async fn hydrate(root: &Path) -> Result<HydrateOutcome> {
    let started = Instant::now();
    let mut config = Config::load().await.context("load configuration")?;
    let runtime = Runtime::resolve_build(&config)
        .await
        .context("resolve build runtime")?;
    debug!(runtime = %runtime, "resolved build runtime");

    let digest = DigestCalculator::new(root, DigestOptions::default())?
        .compute()
        .await
        .context("compute project digest (run `mitl digest --verbose` for details)")?;
    let tag = CapsuleTag::from_digest_hash(&digest.hash)?;

    let cache = CapsuleCache::new(&runtime);
    if cache.exists(&tag).await.context("query capsule cache")? {
        let elapsed = started.elapsed();
        match CapsuleCache::time_saved(&config, &tag, elapsed) {
            Some(saved) => println!(
                "{} capsule {} ready in {:.1}s ({} saved)",
                "⚡".yellow(),
                tag.to_string().cyan(),
                elapsed.as_secs_f64(),
                format!("{:.1}s", saved.as_secs_f64()).green(),
            ),
            None => println!(
                "{} capsule {} ready in {:.1}s",
                "⚡".yellow(),
                tag.to_string().cyan(),
                elapsed.as_secs_f64(),
            ),
        }
        return Ok(HydrateOutcome {
            tag,
            cache_hit: true,
            build_duration: None,
        });
    }

    let detection = detect::detect(root).await.context("detect project")?;
    let recipe = recipe::generate(&detection);
    println!(
        "{} identified {}{}",
        "→".blue(),
        detection.project_type.to_string().bold(),
        match (&detection.framework, &detection.version) {
            (Some(framework), Some(version)) => format!(" ({framework} {version})"),
            (Some(framework), None) => format!(" ({framework})"),
            _ => String::new(),
        }
    );
    for hint in &recipe.hints {
        println!("  {} {hint}", "hint:".dimmed());
    }

    let scratch = tempfile::tempdir().context("create scratch directory")?;
    let recipe_path = scratch.path().join(RECIPE_FILE);
    fs::write(&recipe_path, &recipe.contents)
        .await
        .context("write build recipe")?;

    let platform = resolve_build_platform();
    info!(tag = %tag, ?platform, "building capsule");
    let build_started = Instant::now();
    runtime
        .build(&tag.image_ref(), platform.as_deref(), &recipe_path, root)
        .await?;
    let duration = build_started.elapsed();

    CapsuleCache::record_build(&mut config, &tag, duration);
    config.save().await.context("save configuration")?;
    println!(
        "{} capsule {} built in {:.1}s",
        "✓".green(),
        tag.to_string().cyan(),
        duration.as_secs_f64(),
    );
    Ok(HydrateOutcome {
        tag,
        cache_hit: false,
        build_duration: Some(duration),
    })
}

/// Target platform: environment override, then an explicit default on arm64
/// hosts, otherwise left to the runtime's autoselection.
fn resolve_build_platform() -> Option<String> {
    if let Ok(platform) = std::env::var(PLATFORM_ENV) {
        if !platform.is_empty() {
            return Some(platform);
        }
    }
    if cfg!(target_arch = "aarch64") {
        return Some("linux/arm64".to_string());
    }
    None
}
