use color_eyre::Result;
use pretty_assertions::assert_eq;

use mitl::digest::{DigestCalculator, DigestOptions, PROJECT_TAG_LEN, compare, project_tag};

use crate::{temporary_directory, write_file};

#[test_log::test(tokio::test)]
async fn repeated_digests_are_identical() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(&root, "go.mod", "module example.com/app\n");
    write_file(&root, "main.go", "package main\n\nfunc main() {}\n");
    write_file(&root, "internal/util/util.go", "package util\n");

    let calculator = DigestCalculator::new(&root, DigestOptions::default())?;
    let first = calculator.compute().await?;
    let second = calculator.compute().await?;
    assert_eq!(first.hash, second.hash);
    assert_eq!(first.files, second.files);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn project_tag_is_a_digest_prefix() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(&root, "main.go", "package main\n");

    let tag = project_tag(&root, &DigestOptions::default()).await?;
    let digest = DigestCalculator::new(&root, DigestOptions::default())?
        .compute()
        .await?;
    assert_eq!(tag.len(), PROJECT_TAG_LEN);
    assert!(digest.hash.starts_with(&tag));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn crlf_and_lf_projects_hash_identically() -> Result<()> {
    let (_guard, crlf_root) = temporary_directory();
    write_file(&crlf_root, "notes.txt", "line1\r\nline2\r\n");
    let (_guard2, lf_root) = temporary_directory();
    write_file(&lf_root, "notes.txt", "line1\nline2\n");

    let crlf = DigestCalculator::new(&crlf_root, DigestOptions::default())?
        .compute()
        .await?;
    let lf = DigestCalculator::new(&lf_root, DigestOptions::default())?
        .compute()
        .await?;
    assert_eq!(crlf.files[0].hash, lf.files[0].hash);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn comparison_reports_the_partition() -> Result<()> {
    let (_guard, old_root) = temporary_directory();
    write_file(&old_root, "main.go", "package main\n");
    write_file(&old_root, "go.mod", "module example.com/app\n");
    write_file(&old_root, "README.md", "# readme\n");

    let (_guard2, new_root) = temporary_directory();
    write_file(&new_root, "main.go", "package main\n// changed\n");
    write_file(&new_root, "go.mod", "module example.com/app\n");
    write_file(&new_root, "utils.go", "package main\n");

    let old = DigestCalculator::new(&old_root, DigestOptions::default())?
        .compute()
        .await?;
    let new = DigestCalculator::new(&new_root, DigestOptions::default())?
        .compute()
        .await?;

    let diff = compare(&old, &new);
    assert_eq!(diff.added, vec!["utils.go"]);
    assert_eq!(diff.modified, vec!["main.go"]);
    assert_eq!(diff.removed, vec!["README.md"]);
    assert_eq!(
        diff.summary(),
        "1 file added, 1 file modified, 1 file removed"
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn persisted_digest_survives_a_roundtrip() -> Result<()> {
    let (_guard, root) = temporary_directory();
    write_file(&root, "app.rb", "puts 'hello'\n");

    let digest = DigestCalculator::new(&root, DigestOptions::default())?
        .compute()
        .await?;
    let saved = root.join("digest.json");
    digest.save(&saved).await?;
    let loaded = mitl::digest::ProjectDigest::load(&saved).await?;
    assert_eq!(loaded, digest);
    Ok(())
}
