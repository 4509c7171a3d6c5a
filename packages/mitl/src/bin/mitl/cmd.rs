pub mod digest;
pub mod hydrate;
pub mod run;
pub mod shell;
pub mod volumes;

use std::path::PathBuf;

use color_eyre::{Result, eyre::Context as _};

/// The project root every command operates on: the current working
/// directory.
pub fn project_root() -> Result<PathBuf> {
    std::env::current_dir().context("get working directory")
}
