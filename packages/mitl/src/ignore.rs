//! Gitignore-style ignore rules used to filter files out of digest
//! computation.
//!
//! Patterns are evaluated in insertion order and the last match wins, with
//! `!` negation un-ignoring. Verdicts are cached per normalized path.

use std::path::Path;

use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use dashmap::DashMap;
use globset::{GlobBuilder, GlobMatcher};
use tracing::{instrument, trace};

use crate::fs;

/// Name of the per-project ignore file, read from the project root.
pub const IGNORE_FILE: &str = ".mitlignore";

/// Patterns inserted at construction: VCS metadata, editor backups, OS junk,
/// and the tool's own state directory.
const DEFAULT_PATTERNS: &[&str] = &[
    ".git/",
    ".svn/",
    ".hg/",
    ".bzr/",
    "*.swp",
    "*.swo",
    "*~",
    "*.bak",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    ".mitl/",
];

/// A single compiled ignore pattern.
#[derive(Clone, Debug)]
struct Pattern {
    raw: String,
    negated: bool,
    dir_only: bool,
    has_slash: bool,
    anchored: bool,
    /// Matches the full relative path.
    path_matcher: GlobMatcher,
    /// Matches descendants of a matched directory.
    subtree_matcher: GlobMatcher,
    /// For slash-less patterns: matches the basename at any depth.
    basename_matcher: Option<GlobMatcher>,
}

impl Pattern {
    fn compile(raw: &str) -> Result<Self> {
        let mut body = raw.trim();
        if body.is_empty() {
            return Err(eyre!("empty ignore pattern"));
        }

        let negated = body.starts_with('!');
        if negated {
            body = &body[1..];
        }
        let dir_only = body.ends_with('/');
        if dir_only {
            body = &body[..body.len() - 1];
        }
        let anchored = body.starts_with('/');
        if anchored {
            body = &body[1..];
        }
        if body.is_empty() {
            return Err(eyre!("ignore pattern has no body: {raw:?}"));
        }
        let has_slash = body.contains('/');

        // Slash-less patterns match at any depth; anchored patterns match
        // starting at the root.
        let path_pattern = if has_slash || anchored {
            body.to_string()
        } else {
            format!("**/{body}")
        };

        let compile = |pattern: &str| {
            GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map(|glob| glob.compile_matcher())
                .with_context(|| format!("compile ignore pattern: {raw:?}"))
        };

        let path_matcher = compile(&path_pattern)?;
        let subtree_matcher = compile(&format!("{path_pattern}/**"))?;
        let basename_matcher = if has_slash || anchored {
            None
        } else {
            Some(compile(body)?)
        };

        Ok(Self {
            raw: raw.to_string(),
            negated,
            dir_only,
            has_slash,
            anchored,
            path_matcher,
            subtree_matcher,
            basename_matcher,
        })
    }

    /// Whether this pattern matches the normalized path.
    fn matches(&self, path: &str, basename: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.path_matcher.is_match(path) || self.subtree_matcher.is_match(path) {
            return true;
        }
        // Slash-less, un-anchored patterns also match by basename at any depth.
        if !self.has_slash && !self.anchored {
            if let Some(matcher) = &self.basename_matcher {
                return matcher.is_match(basename);
            }
        }
        false
    }
}

/// An ordered collection of compiled ignore patterns with a verdict cache.
#[derive(Debug, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
    verdicts: DashMap<String, bool>,
}

impl IgnoreRules {
    /// Construct with the built-in default patterns.
    pub fn new() -> Result<Self> {
        let mut rules = Self::empty();
        for raw in DEFAULT_PATTERNS {
            rules.add_pattern(raw)?;
        }
        Ok(rules)
    }

    /// Construct with no patterns at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a pattern. Invalid patterns fail fast.
    ///
    /// Adding a pattern invalidates the verdict cache.
    pub fn add_pattern(&mut self, raw: &str) -> Result<()> {
        let pattern = Pattern::compile(raw)?;
        trace!(raw, negated = pattern.negated, "add ignore pattern");
        self.patterns.push(pattern);
        self.verdicts.clear();
        Ok(())
    }

    /// Append the patterns from the project's `.mitlignore`, if present.
    #[instrument(skip(self))]
    pub async fn load_project_file(&mut self, root: impl AsRef<Path> + std::fmt::Debug) -> Result<()> {
        let path = root.as_ref().join(IGNORE_FILE);
        let Some(content) = fs::read_buffered_utf8(&path).await? else {
            return Ok(());
        };
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.add_pattern(line)
                .with_context(|| format!("pattern from {IGNORE_FILE}: {line:?}"))?;
        }
        Ok(())
    }

    /// Report whether the path is ignored.
    ///
    /// The path is taken relative to the project root; separators are
    /// normalized to `/` and a leading `./` is dropped.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let normalized = normalize(path);
        let key = if is_dir {
            format!("{normalized}/")
        } else {
            normalized.clone()
        };
        if let Some(verdict) = self.verdicts.get(&key) {
            return *verdict;
        }

        let basename = normalized.rsplit('/').next().unwrap_or(&normalized);
        let mut verdict = false;
        for pattern in &self.patterns {
            if pattern.matches(&normalized, basename, is_dir) {
                verdict = !pattern.negated;
            }
        }

        self.verdicts.insert(key, verdict);
        verdict
    }

    /// Number of patterns currently loaded.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no patterns are loaded.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Raw texts of the loaded patterns, in insertion order.
    pub fn raw_patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.raw.as_str())
    }
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.strip_prefix("./").unwrap_or(&path);
    path.trim_end_matches('/').to_string()
}
