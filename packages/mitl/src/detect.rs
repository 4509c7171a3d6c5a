//! Signal-based project detection.
//!
//! A fixed priority list of marker files identifies the primary stack; a
//! refinement pass upgrades generic types when framework markers are
//! present; dependency analysis then fills per-language blocks. Mixed
//! stacks are permitted: secondary language blocks are populated whenever
//! their marker file exists.

use std::{collections::BTreeMap, path::Path};

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tracing::{debug, instrument, trace};

mod node;
mod php;
mod python;

pub use node::{DEFAULT_NODE_VERSION, NodeBlock, PackageManager};
pub use php::{DEFAULT_PHP_VERSION, PhpBlock};
pub use python::{DEFAULT_PYTHON_VERSION, PythonBlock};

use crate::fs;

/// The closed set of detectable project types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ProjectType {
    Php,
    PhpLaravel,
    PhpSymfony,
    Node,
    NodeNext,
    NodeNuxt,
    Python,
    PythonDjango,
    PythonFlask,
    Go,
    Ruby,
    RubyRails,
    Static,
    #[default]
    Unknown,
}

impl ProjectType {
    pub fn is_php(&self) -> bool {
        matches!(self, Self::Php | Self::PhpLaravel | Self::PhpSymfony)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node | Self::NodeNext | Self::NodeNuxt)
    }

    pub fn is_python(&self) -> bool {
        matches!(self, Self::Python | Self::PythonDjango | Self::PythonFlask)
    }

    pub fn is_go(&self) -> bool {
        matches!(self, Self::Go)
    }

    pub fn is_ruby(&self) -> bool {
        matches!(self, Self::Ruby | Self::RubyRails)
    }

    /// Framework name implied by the type, if any.
    fn framework(&self) -> Option<&'static str> {
        match self {
            Self::PhpLaravel => Some("laravel"),
            Self::PhpSymfony => Some("symfony"),
            Self::NodeNext => Some("next"),
            Self::NodeNuxt => Some("nuxt"),
            Self::PythonDjango => Some("django"),
            Self::PythonFlask => Some("flask"),
            Self::RubyRails => Some("rails"),
            _ => None,
        }
    }
}

/// The result of detecting a project.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct Detection {
    pub project_type: ProjectType,
    pub framework: Option<String>,
    /// Framework or language version requirement, when one was extracted.
    pub version: Option<String>,
    pub php: Option<PhpBlock>,
    pub node: Option<NodeBlock>,
    pub python: Option<PythonBlock>,
    /// Languages present in the project, primary first.
    pub languages: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Validators that gate a marker file.
#[derive(Copy, Clone, Debug)]
enum Validator {
    ComposerJson,
    PackageJson,
    PyprojectToml,
    FlaskApp,
}

/// Priority-ordered marker list; the first present marker whose validator
/// passes sets the type.
const MARKERS: &[(&str, ProjectType, Option<Validator>)] = &[
    ("composer.json", ProjectType::Php, Some(Validator::ComposerJson)),
    ("artisan", ProjectType::PhpLaravel, None),
    ("symfony.lock", ProjectType::PhpSymfony, None),
    ("package.json", ProjectType::Node, Some(Validator::PackageJson)),
    ("next.config.js", ProjectType::NodeNext, None),
    ("nuxt.config.js", ProjectType::NodeNuxt, None),
    ("requirements.txt", ProjectType::Python, None),
    ("pyproject.toml", ProjectType::Python, Some(Validator::PyprojectToml)),
    ("manage.py", ProjectType::PythonDjango, None),
    ("app.py", ProjectType::PythonFlask, Some(Validator::FlaskApp)),
    ("go.mod", ProjectType::Go, None),
    ("Gemfile", ProjectType::Ruby, None),
    ("config.ru", ProjectType::RubyRails, None),
    ("index.html", ProjectType::Static, None),
];

/// Detect the project at the given root.
#[instrument]
pub async fn detect(root: impl AsRef<Path> + std::fmt::Debug) -> Result<Detection> {
    let root = root.as_ref();
    let mut detection = Detection::default();

    for (marker, candidate, validator) in MARKERS {
        if !fs::is_file(root.join(marker)).await {
            continue;
        }
        let resolved = match validator {
            None => Some(*candidate),
            Some(validator) => run_validator(*validator, root, *candidate, &mut detection).await?,
        };
        let Some(resolved) = resolved else {
            trace!(marker, "marker present but validator failed");
            continue;
        };
        detection.project_type = resolved;
        detection.metadata.insert("marker".to_string(), (*marker).to_string());
        break;
    }

    refine(root, &mut detection).await;
    analyze(root, &mut detection).await?;

    if detection.framework.is_none() {
        detection.framework = detection.project_type.framework().map(str::to_string);
    }
    debug!(project_type = %detection.project_type, framework = ?detection.framework, "detected project");
    Ok(detection)
}

async fn run_validator(
    validator: Validator,
    root: &Path,
    candidate: ProjectType,
    detection: &mut Detection,
) -> Result<Option<ProjectType>> {
    match validator {
        Validator::ComposerJson => {
            let Some(content) = fs::read_buffered_utf8(root.join("composer.json")).await? else {
                return Ok(None);
            };
            let Ok(doc) = serde_json::from_str::<Value>(&content) else {
                return Ok(None);
            };
            // The composer validator itself recognizes Laravel and extracts
            // the framework version from the constraint.
            if let Some(constraint) = doc
                .get("require")
                .and_then(|require| require.get("laravel/framework"))
                .and_then(Value::as_str)
            {
                detection.framework = Some("laravel".to_string());
                detection.version = version_from_constraint(constraint);
                return Ok(Some(ProjectType::PhpLaravel));
            }
            Ok(Some(candidate))
        }
        Validator::PackageJson => {
            let Some(content) = fs::read_buffered_utf8(root.join("package.json")).await? else {
                return Ok(None);
            };
            if serde_json::from_str::<Value>(&content).is_err() {
                return Ok(None);
            }
            Ok(Some(candidate))
        }
        Validator::PyprojectToml => {
            let Some(content) = fs::read_buffered_utf8(root.join("pyproject.toml")).await? else {
                return Ok(None);
            };
            let Ok(doc) = content.parse::<toml::Table>() else {
                return Ok(None);
            };
            let is_project = doc.get("project").is_some()
                || doc
                    .get("tool")
                    .and_then(|tool| tool.get("poetry"))
                    .is_some();
            Ok(is_project.then_some(candidate))
        }
        Validator::FlaskApp => {
            let Some(content) = fs::read_buffered_utf8(root.join("app.py")).await? else {
                return Ok(None);
            };
            let imports_flask =
                content.contains("import flask") || content.contains("from flask");
            Ok(imports_flask.then_some(candidate))
        }
    }
}

/// Upgrade generic types when framework markers are present.
async fn refine(root: &Path, detection: &mut Detection) {
    match detection.project_type {
        ProjectType::Node => {
            for name in ["next.config.js", "next.config.ts"] {
                if fs::is_file(root.join(name)).await {
                    detection.project_type = ProjectType::NodeNext;
                    return;
                }
            }
            for name in ["nuxt.config.js", "nuxt.config.ts"] {
                if fs::is_file(root.join(name)).await {
                    detection.project_type = ProjectType::NodeNuxt;
                    return;
                }
            }
        }
        ProjectType::Python => {
            if fs::is_file(root.join("manage.py")).await {
                detection.project_type = ProjectType::PythonDjango;
            }
        }
        _ => {}
    }
}

/// Populate per-language dependency blocks; secondary blocks are filled
/// whenever their marker file is present.
async fn analyze(root: &Path, detection: &mut Detection) -> Result<()> {
    if detection.project_type.is_php() || fs::is_file(root.join("composer.json")).await {
        let laravel = detection.project_type == ProjectType::PhpLaravel;
        detection.php = Some(php::analyze(root, laravel).await?);
        detection.languages.push("php".to_string());
    }

    if detection.project_type.is_node() || fs::is_file(root.join("package.json")).await {
        detection.node = Some(node::analyze(root).await?);
        detection.languages.push("node".to_string());
    }

    if detection.project_type.is_python() {
        detection.python = Some(python::analyze(root).await?);
        detection.languages.push("python".to_string());
    }

    if detection.project_type.is_go() {
        detection.languages.push("go".to_string());
    }
    if detection.project_type.is_ruby() {
        detection.languages.push("ruby".to_string());
    }

    // Primary language leads the list.
    let primary = match detection.project_type {
        t if t.is_php() => Some("php"),
        t if t.is_node() => Some("node"),
        t if t.is_python() => Some("python"),
        ProjectType::Go => Some("go"),
        t if t.is_ruby() => Some("ruby"),
        _ => None,
    };
    if let Some(primary) = primary {
        if let Some(pos) = detection.languages.iter().position(|l| l == primary) {
            detection.languages.swap(0, pos);
        }
    }
    Ok(())
}

/// Extract a plain version from a constraint like `^10.0` or `>=8.2`.
fn version_from_constraint(constraint: &str) -> Option<String> {
    lazy_regex::regex_captures!(r"(\d+(?:\.\d+)*)", constraint).map(|(_, version)| version.to_string())
}
