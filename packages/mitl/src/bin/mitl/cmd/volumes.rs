use clap::Subcommand;

pub mod clean;
pub mod list;

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// List registered dependency volumes.
    List,

    /// Delete volumes that have not been used recently.
    Clean(clean::Options),
}
