//! The binary entrypoint for `mitl`, the capsule build-and-run tool.

use clap::{Parser, Subcommand, crate_version};
use color_eyre::Result;
use tracing::instrument;
use tracing_subscriber::util::SubscriberInitExt;

// Since this is a binary crate, we need to ensure these modules aren't pub
// so that they can correctly warn about dead code:
// https://github.com/rust-lang/rust/issues/74970
//
// Relatedly, in this file specifically nothing should be `pub`.
mod cmd;
mod log;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "mitl",
    about = "Reproducible project capsules with aggressive caching",
    version = crate_version!(),
)]
struct TopLevelFlags {
    #[command(subcommand)]
    command: Command,

    /// When to colorize output
    #[arg(long, value_enum, default_value_t = log::WhenColor::Auto)]
    color: log::WhenColor,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Build (or reuse) the capsule for the current project state
    Hydrate(cmd::hydrate::Options),

    /// Run a command inside the capsule
    Run {
        /// The command to run, passed through to the capsule as provided.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Open an interactive shell inside the capsule
    Shell(cmd::shell::Options),

    /// Compute and inspect the project digest
    Digest(cmd::digest::Options),

    /// Manage dependency volumes
    #[clap(subcommand)]
    Volumes(cmd::volumes::Command),
}

#[instrument]
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let top = TopLevelFlags::parse();

    let logger = log::make_logger(std::io::stderr, top.color)?;
    logger.init();

    match top.command {
        Command::Hydrate(opts) => cmd::hydrate::exec(opts).await,
        Command::Run { args } => cmd::run::exec(args).await,
        Command::Shell(opts) => cmd::shell::exec(opts).await,
        Command::Digest(opts) => cmd::digest::exec(opts).await,
        Command::Volumes(command) => match command {
            cmd::volumes::Command::List => cmd::volumes::list::exec().await,
            cmd::volumes::Command::Clean(opts) => cmd::volumes::clean::exec(opts).await,
        },
    }
}
