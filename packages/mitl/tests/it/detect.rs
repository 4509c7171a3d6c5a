use color_eyre::Result;
use pretty_assertions::assert_eq;

use mitl::{
    detect::{self, ProjectType},
    recipe,
};

use crate::{temporary_directory, write_file};

#[test_log::test(tokio::test)]
async fn laravel_project_end_to_end() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(
        &root,
        "composer.json",
        r#"{"require": {"laravel/framework": "^10.0"}}"#,
    );
    write_file(&root, "artisan", "");

    let detection = detect::detect(&root).await?;
    assert_eq!(detection.project_type, ProjectType::PhpLaravel);
    assert!(detection.version.as_deref().unwrap().starts_with("10"));

    let php = detection.php.as_ref().unwrap();
    for extension in ["pdo_mysql", "pdo", "bcmath", "mbstring", "openssl"] {
        assert!(php.extensions.iter().any(|e| e == extension));
    }

    let recipe = recipe::generate(&detection);
    assert!(recipe.contents.contains("FROM php:"));
    assert!(recipe.contents.contains("composer install"));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn next_project_end_to_end() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(
        &root,
        "package.json",
        r#"{"dependencies": {"next": "13.0.0"}}"#,
    );
    write_file(&root, "next.config.js", "");

    let detection = detect::detect(&root).await?;
    assert_eq!(detection.project_type, ProjectType::NodeNext);

    let recipe = recipe::generate(&detection);
    assert!(recipe.contents.contains("FROM node:"));
    assert!(recipe.contents.contains("corepack"));
    Ok(())
}
