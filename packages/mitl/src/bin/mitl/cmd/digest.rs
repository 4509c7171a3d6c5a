//! Computes and inspects the project digest.

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use colored::Colorize as _;
use tracing::instrument;

use mitl::digest::{DigestCalculator, DigestOptions, ProjectDigest, compare};

#[derive(Clone, Args, Debug)]
pub struct Options {
    /// Per-file hash algorithm (sha256 or blake3).
    #[arg(long, default_value = "blake3")]
    algorithm: String,

    /// Include files whose name begins with a dot.
    #[arg(long)]
    include_hidden: bool,

    /// Hash only recognized lockfiles.
    #[arg(long)]
    lockfiles_only: bool,

    /// Write the digest document to this path.
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,

    /// Diff the digest against a previously saved document.
    #[arg(long, value_name = "PATH")]
    compare: Option<PathBuf>,

    /// List every file entry, including per-file failures.
    #[arg(short, long)]
    verbose: bool,
}

#[instrument]
pub async fn exec(options: Options) -> Result<()> {
    let root = super::project_root()?;
    let digest_options = DigestOptions {
        algorithm: mitl::digest::Algorithm::parse(&options.algorithm)?,
        include_hidden: options.include_hidden,
        lockfiles_only: options.lockfiles_only,
        ..DigestOptions::default()
    };

    let digest = DigestCalculator::new(&root, digest_options)?.compute().await?;
    println!(
        "{} {} ({} files, {} bytes)",
        digest.tag()?.bold(),
        digest.hash.dimmed(),
        digest.file_count,
        digest.total_size,
    );

    if options.verbose {
        for entry in &digest.files {
            match &entry.error {
                Some(error) => println!("  {} {} ({error})", "!".red(), entry.path),
                None => println!("  {} {}", &entry.hash[..12.min(entry.hash.len())], entry.path),
            }
        }
    }
    let failed = digest.failed_files().count();
    if failed > 0 {
        println!("{} {failed} file(s) could not be hashed", "warning:".yellow());
    }

    if let Some(path) = &options.compare {
        let previous = ProjectDigest::load(path).await?;
        let diff = compare(&previous, &digest);
        println!("{}", diff.summary());
    }

    if let Some(path) = &options.save {
        digest.save(path).await?;
        println!("saved digest to {}", path.display());
    }
    Ok(())
}
