//! Build-recipe generation.
//!
//! Selects a template keyed by detected type, substitutes interpreter
//! version, extensions, and package-manager choices, and returns the
//! recipe text plus optimization hints. Generation never fails: missing
//! fields fall back to a generic recipe.

use std::fmt::Write as _;

use tracing::instrument;

use crate::detect::{Detection, NodeBlock, PackageManager, PhpBlock, ProjectType, PythonBlock};

const DEFAULT_GO_VERSION: &str = "1.22";
const DEFAULT_RUBY_VERSION: &str = "3.3";

/// Extensions installed through `pecl` rather than `docker-php-ext-install`.
const PECL_EXTENSIONS: &[&str] = &["imagick", "redis"];

/// A generated build recipe.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Recipe {
    pub contents: String,
    pub hints: Vec<String>,
}

/// Generate the build recipe for a detected project.
#[instrument(skip(detection), fields(project_type = %detection.project_type))]
pub fn generate(detection: &Detection) -> Recipe {
    match detection.project_type {
        t if t.is_php() => php_recipe(detection),
        t if t.is_node() => node_recipe(detection),
        t if t.is_python() => python_recipe(detection),
        ProjectType::Go => go_recipe(),
        t if t.is_ruby() => ruby_recipe(),
        ProjectType::Static => static_recipe(),
        _ => generic_recipe(),
    }
}

fn php_recipe(detection: &Detection) -> Recipe {
    let block = detection.php.clone().unwrap_or_default();
    let PhpBlock {
        version,
        extensions,
        ini,
    } = block;

    let mut contents = format!("FROM php:{version}-cli\n");
    contents.push_str(
        "RUN apt-get update \\\n    && apt-get install -y --no-install-recommends git unzip libzip-dev libpng-dev libonig-dev libxml2-dev \\\n    && rm -rf /var/lib/apt/lists/*\n",
    );

    let (pecl, native): (Vec<_>, Vec<_>) = extensions
        .iter()
        .map(String::as_str)
        .partition(|extension| PECL_EXTENSIONS.contains(extension));
    if !native.is_empty() {
        let _ = writeln!(contents, "RUN docker-php-ext-install {}", native.join(" "));
    }
    for extension in pecl {
        let _ = writeln!(
            contents,
            "RUN pecl install {extension} && docker-php-ext-enable {extension}"
        );
    }

    for (key, value) in &ini {
        let _ = writeln!(
            contents,
            "RUN echo \"{key}={value}\" >> /usr/local/etc/php/conf.d/mitl.ini"
        );
    }

    contents.push_str("COPY --from=composer:2 /usr/bin/composer /usr/bin/composer\n");
    contents.push_str("WORKDIR /app\n");
    contents.push_str("COPY composer.json composer.lock* ./\n");
    contents.push_str(
        "RUN composer install --no-interaction --no-scripts --prefer-dist --no-autoloader || true\n",
    );
    contents.push_str("COPY . .\n");
    contents.push_str("RUN composer dump-autoload --optimize || true\n");
    contents.push_str("CMD [\"php\", \"-v\"]\n");

    let mut hints = Vec::new();
    if detection.project_type == ProjectType::PhpLaravel {
        hints.push("dependencies install before the source copy, so code edits reuse the vendor layer".to_string());
    }
    Recipe { contents, hints }
}

fn node_recipe(detection: &Detection) -> Recipe {
    let block = detection.node.clone().unwrap_or_default();
    let NodeBlock {
        version,
        package_manager,
        build_tools,
    } = block;

    let mut contents = format!("FROM node:{version}-alpine\n");
    if build_tools {
        contents.push_str("RUN apk add --no-cache python3 make g++\n");
    }
    contents.push_str("RUN corepack enable\n");
    contents.push_str("WORKDIR /app\n");
    contents.push_str("COPY package.json package-lock.json* pnpm-lock.yaml* yarn.lock* ./\n");

    // Installs are funneled through pnpm regardless of the project's own
    // manager; its content-addressed store is what the volume manager
    // persists across runs.
    let install = match package_manager {
        PackageManager::Pnpm => {
            "RUN corepack pnpm install --frozen-lockfile || corepack pnpm install\n"
        }
        PackageManager::Yarn | PackageManager::Npm => {
            "RUN corepack pnpm import || true\nRUN corepack pnpm install --frozen-lockfile || corepack pnpm install\n"
        }
    };
    contents.push_str(install);
    contents.push_str("COPY . .\n");
    contents.push_str("CMD [\"node\"]\n");

    let mut hints = Vec::new();
    if package_manager != PackageManager::Pnpm {
        hints.push(format!(
            "{package_manager} lockfile detected; installs run through pnpm's shared store for speed"
        ));
    }
    if matches!(
        detection.project_type,
        ProjectType::NodeNext | ProjectType::NodeNuxt
    ) && !build_tools
    {
        hints.push("no build script found; framework builds usually define one".to_string());
    }
    Recipe { contents, hints }
}

fn python_recipe(detection: &Detection) -> Recipe {
    let block = detection.python.clone().unwrap_or_default();
    let PythonBlock { version } = block;

    let mut contents = format!("FROM python:{version}-slim\n");
    contents.push_str("ENV PYTHONDONTWRITEBYTECODE=1 PYTHONUNBUFFERED=1\n");
    contents.push_str("WORKDIR /app\n");
    contents.push_str("RUN python -m venv /app/.venv\n");
    contents.push_str("ENV PATH=\"/app/.venv/bin:$PATH\"\n");
    contents.push_str("COPY requirements.txt* pyproject.toml* ./\n");
    contents.push_str("RUN [ -f requirements.txt ] && pip install -r requirements.txt || true\n");
    contents.push_str("COPY . .\n");
    if detection.project_type == ProjectType::PythonDjango {
        contents.push_str("EXPOSE 8000\n");
        contents.push_str("CMD [\"python\", \"manage.py\", \"runserver\", \"0.0.0.0:8000\"]\n");
    } else {
        contents.push_str("CMD [\"python\"]\n");
    }

    Recipe {
        contents,
        hints: Vec::new(),
    }
}

fn go_recipe() -> Recipe {
    let mut contents = format!("FROM golang:{DEFAULT_GO_VERSION}\n");
    contents.push_str("WORKDIR /app\n");
    contents.push_str("COPY go.mod go.sum* ./\n");
    contents.push_str("RUN go mod download\n");
    contents.push_str("COPY . .\n");
    contents.push_str("RUN go build ./...\n");
    contents.push_str("CMD [\"go\", \"version\"]\n");
    Recipe {
        contents,
        hints: vec!["module downloads cache in a dedicated volume across runs".to_string()],
    }
}

fn ruby_recipe() -> Recipe {
    let mut contents = format!("FROM ruby:{DEFAULT_RUBY_VERSION}\n");
    contents.push_str("WORKDIR /app\n");
    contents.push_str("COPY Gemfile Gemfile.lock* ./\n");
    contents.push_str("RUN bundle install || true\n");
    contents.push_str("COPY . .\n");
    contents.push_str("CMD [\"ruby\", \"-v\"]\n");
    Recipe {
        contents,
        hints: Vec::new(),
    }
}

fn static_recipe() -> Recipe {
    let mut contents = String::from("FROM nginx:alpine\n");
    contents.push_str("COPY . /usr/share/nginx/html\n");
    Recipe {
        contents,
        hints: Vec::new(),
    }
}

/// Fallback for `unknown` projects and anything a template cannot cover.
fn generic_recipe() -> Recipe {
    let mut contents = String::from("FROM alpine:3.20\n");
    contents.push_str("WORKDIR /app\n");
    contents.push_str("COPY . .\n");
    contents.push_str("CMD [\"sh\"]\n");
    Recipe {
        contents,
        hints: vec![
            "project type was not recognized; add a marker file (package.json, go.mod, …) for a tailored capsule"
                .to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::detect::Detection;

    use super::*;

    fn detection(project_type: ProjectType) -> Detection {
        Detection {
            project_type,
            ..Detection::default()
        }
    }

    #[test]
    fn php_recipe_substitutes_version_and_extensions() {
        let mut det = detection(ProjectType::PhpLaravel);
        det.php = Some(PhpBlock {
            version: "8.2".to_string(),
            extensions: vec!["pdo".to_string(), "redis".to_string()],
            ..PhpBlock::default()
        });

        let recipe = generate(&det);
        assert!(recipe.contents.starts_with("FROM php:8.2-cli\n"));
        assert!(recipe.contents.contains("docker-php-ext-install pdo"));
        assert!(recipe.contents.contains("pecl install redis"));
        assert!(recipe.contents.contains("memory_limit=256M"));
        assert!(recipe.contents.contains("COPY --from=composer:2"));
    }

    #[test]
    fn node_recipe_funnels_through_pnpm() {
        let mut det = detection(ProjectType::Node);
        det.node = Some(NodeBlock {
            version: "18".to_string(),
            package_manager: PackageManager::Npm,
            build_tools: true,
        });

        let recipe = generate(&det);
        assert!(recipe.contents.starts_with("FROM node:18-alpine\n"));
        assert!(recipe.contents.contains("apk add --no-cache python3 make g++"));
        assert!(recipe.contents.contains("corepack pnpm install"));
        assert!(!recipe.hints.is_empty());
    }

    #[test]
    fn django_recipe_exposes_the_dev_server() {
        let recipe = generate(&detection(ProjectType::PythonDjango));
        assert!(recipe.contents.contains("FROM python:3.11-slim"));
        assert!(recipe.contents.contains("/app/.venv"));
        assert!(recipe.contents.contains("EXPOSE 8000"));
    }

    #[test]
    fn go_recipe_downloads_modules_first() {
        let recipe = generate(&detection(ProjectType::Go));
        let download = recipe.contents.find("go mod download").unwrap();
        let copy_all = recipe.contents.find("COPY . .").unwrap();
        assert!(download < copy_all);
    }

    #[test]
    fn unknown_and_static_fall_back() {
        let generic = generate(&detection(ProjectType::Unknown));
        assert!(generic.contents.starts_with("FROM alpine:"));
        assert!(!generic.hints.is_empty());

        let fixed = generate(&detection(ProjectType::Static));
        assert!(fixed.contents.starts_with("FROM nginx:alpine"));
    }

    #[test]
    fn generation_tolerates_missing_blocks() {
        // A PHP type with no analyzed block still generates from defaults.
        let recipe = generate(&detection(ProjectType::Php));
        assert!(recipe.contents.starts_with("FROM php:8.3-cli\n"));
        let recipe = generate(&detection(ProjectType::NodeNext));
        assert_eq!(recipe.contents.lines().next().unwrap(), "FROM node:20-alpine");
    }
}
