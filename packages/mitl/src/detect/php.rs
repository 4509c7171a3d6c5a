//! PHP dependency analysis.

use std::{collections::BTreeMap, path::Path};

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, trace};
use walkdir::WalkDir;

use crate::fs;

pub const DEFAULT_PHP_VERSION: &str = "8.3";

/// Best-effort source scan stops after this many files.
const SOURCE_SCAN_LIMIT: usize = 200;

/// Composer package name fragments mapped to the PHP extensions they imply.
const PACKAGE_EXTENSIONS: &[(&str, &[&str])] = &[
    ("laravel/framework", &["pdo_mysql", "pdo"]),
    ("guzzlehttp/guzzle", &["curl"]),
    ("intervention/image", &["gd", "imagick"]),
    ("predis/predis", &["redis"]),
    ("doctrine/dbal", &["pdo", "pdo_mysql"]),
    ("phpoffice/", &["gd", "zip"]),
    ("maatwebsite/excel", &["gd", "zip"]),
    ("aws/aws-sdk-php", &["curl", "simplexml"]),
    ("league/flysystem", &["fileinfo"]),
];

/// Extensions every Laravel application needs.
const LARAVEL_EXTENSIONS: &[&str] = &[
    "pdo_mysql",
    "pdo",
    "bcmath",
    "mbstring",
    "openssl",
    "tokenizer",
    "xml",
    "ctype",
    "curl",
];

/// Source-level signals mapped to extensions, applied to `.php` files
/// outside `vendor/`.
fn signal_extensions(content: &str, extensions: &mut Vec<String>) {
    use lazy_regex::regex_is_match;
    let signals = [
        (regex_is_match!(r"curl_(init|exec|setopt)", content), "curl"),
        (regex_is_match!(r"image(create|png|jpeg)|gd_info", content), "gd"),
        (regex_is_match!(r"new\s+\\?Redis\b", content), "redis"),
        (regex_is_match!(r"\bmb_[a-z_]+\(", content), "mbstring"),
        (regex_is_match!(r"simplexml_load", content), "simplexml"),
        (regex_is_match!(r"\bopenssl_[a-z_]+\(", content), "openssl"),
        (regex_is_match!(r"\bbc(add|sub|mul|div|pow)\(", content), "bcmath"),
        (regex_is_match!(r"NumberFormatter|IntlDateFormatter", content), "intl"),
        (regex_is_match!(r"\bsodium_[a-z_]+\(", content), "sodium"),
    ];
    for (matched, extension) in signals {
        if matched {
            extensions.push(extension.to_string());
        }
    }
}

/// PHP engine requirements for a project.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct PhpBlock {
    pub version: String,
    pub extensions: Vec<String>,
    /// Engine configuration knobs, written into the capsule's INI.
    pub ini: BTreeMap<String, String>,
}

impl Default for PhpBlock {
    fn default() -> Self {
        let ini = [
            ("memory_limit", "256M"),
            ("max_execution_time", "300"),
            ("post_max_size", "100M"),
            ("upload_max_filesize", "100M"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            version: DEFAULT_PHP_VERSION.to_string(),
            extensions: Vec::new(),
            ini,
        }
    }
}

/// Analyze PHP requirements from `composer.json` and the project sources.
#[instrument(skip(root))]
pub async fn analyze(root: &Path, laravel: bool) -> Result<PhpBlock> {
    let mut block = PhpBlock::default();
    let mut extensions: Vec<String> = Vec::new();

    if let Some(content) = fs::read_buffered_utf8(root.join("composer.json")).await? {
        if let Ok(doc) = serde_json::from_str::<Value>(&content) {
            if let Some(require) = doc.get("require").and_then(Value::as_object) {
                if let Some(constraint) = require.get("php").and_then(Value::as_str) {
                    if let Some(version) = super::version_from_constraint(constraint) {
                        block.version = version;
                    }
                }
                for (package, _) in require {
                    for (fragment, implied) in PACKAGE_EXTENSIONS {
                        if package.contains(fragment) {
                            extensions.extend(implied.iter().map(|e| e.to_string()));
                        }
                    }
                    // `ext-foo` requirements name extensions directly.
                    if let Some(extension) = package.strip_prefix("ext-") {
                        extensions.push(extension.to_string());
                    }
                }
            }
        }
    }

    if laravel {
        extensions.extend(LARAVEL_EXTENSIONS.iter().map(|e| e.to_string()));
    }

    extensions.extend(scan_sources(root));

    extensions.sort();
    extensions.dedup();
    block.extensions = extensions;
    Ok(block)
}

/// Best-effort scan of `.php` sources for extension usage, excluding the
/// `vendor/` subtree.
fn scan_sources(root: &Path) -> Vec<String> {
    let mut extensions = Vec::new();
    let mut scanned = 0usize;
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && matches!(entry.file_name().to_str(), Some("vendor" | "node_modules")))
        });

    for entry in walker.flatten() {
        if scanned >= SOURCE_SCAN_LIMIT {
            break;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().is_none_or(|ext| ext != "php") {
            continue;
        }
        scanned += 1;
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let before = extensions.len();
        signal_extensions(&content, &mut extensions);
        if extensions.len() > before {
            trace!(path = ?entry.path(), "source scan signals");
        }
    }
    extensions
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test(tokio::test)]
    async fn defaults_without_composer_json() {
        let dir = tempfile::tempdir().unwrap();
        let block = analyze(dir.path(), false).await.unwrap();
        assert_eq!(block.version, DEFAULT_PHP_VERSION);
        assert!(block.extensions.is_empty());
        assert_eq!(block.ini.get("memory_limit").unwrap(), "256M");
        assert_eq!(block.ini.get("max_execution_time").unwrap(), "300");
    }

    #[test_log::test(tokio::test)]
    async fn reads_version_and_package_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("composer.json"),
            r#"{"require": {"php": "^8.2", "guzzlehttp/guzzle": "^7.0", "ext-zip": "*"}}"#,
        )
        .unwrap();

        let block = analyze(dir.path(), false).await.unwrap();
        assert_eq!(block.version, "8.2");
        assert!(block.extensions.contains(&"curl".to_string()));
        assert!(block.extensions.contains(&"zip".to_string()));
    }

    #[test_log::test(tokio::test)]
    async fn laravel_adds_the_fixed_set() {
        let dir = tempfile::tempdir().unwrap();
        let block = analyze(dir.path(), true).await.unwrap();
        for extension in LARAVEL_EXTENSIONS {
            assert!(block.extensions.iter().any(|e| e == extension));
        }
    }

    #[test_log::test(tokio::test)]
    async fn source_scan_finds_signals_outside_vendor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::create_dir_all(dir.path().join("vendor/lib")).unwrap();
        std::fs::write(
            dir.path().join("app/client.php"),
            "<?php $ch = curl_init('https://example.com');",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("vendor/lib/crypto.php"),
            "<?php sodium_crypto_box_keypair();",
        )
        .unwrap();

        let block = analyze(dir.path(), false).await.unwrap();
        assert_eq!(block.extensions, vec!["curl"]);
    }

    #[test_log::test(tokio::test)]
    async fn extensions_are_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("composer.json"),
            r#"{"require": {"laravel/framework": "^10.0", "ext-pdo": "*"}}"#,
        )
        .unwrap();

        let block = analyze(dir.path(), true).await.unwrap();
        let mut sorted = block.extensions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(block.extensions, sorted);
    }
}
