//! Python dependency analysis.

use std::path::Path;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::instrument;

pub const DEFAULT_PYTHON_VERSION: &str = "3.11";

/// Python interpreter requirements for a project.
//
// Extended analysis (interpreter pinning from pyproject, extras) is
// deliberately not implemented yet.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct PythonBlock {
    pub version: String,
}

impl Default for PythonBlock {
    fn default() -> Self {
        Self {
            version: DEFAULT_PYTHON_VERSION.to_string(),
        }
    }
}

#[instrument(skip(_root))]
pub async fn analyze(_root: &Path) -> Result<PythonBlock> {
    Ok(PythonBlock::default())
}
