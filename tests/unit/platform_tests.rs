//! Unit tests for platform artifact coordinates and resolvers.

use std::path::PathBuf;

use appbooter::platform::{
    FixedPathResolver, LocalRepositoryResolver, PlatformArtifact, PlatformResolver,
};
use appbooter::AppError;

fn artifact() -> PlatformArtifact {
    PlatformArtifact::new("org.example.platforms", "launcher", "2.0")
}

#[test]
fn file_name_and_display() {
    let artifact = artifact();
    assert_eq!(artifact.file_name(), "launcher-2.0.jar");
    assert_eq!(artifact.to_string(), "org.example.platforms:launcher:jar:2.0");
}

#[test]
fn repository_layout_splits_group_into_directories() {
    let resolver = LocalRepositoryResolver::new("/repo");
    assert_eq!(
        resolver.artifact_path(&artifact()),
        PathBuf::from("/repo/org/example/platforms/launcher/2.0/launcher-2.0.jar")
    );
}

#[test]
fn local_resolver_finds_existing_archive() {
    let repo = tempfile::tempdir().expect("tempdir");
    let resolver = LocalRepositoryResolver::new(repo.path());
    let expected = resolver.artifact_path(&artifact());
    std::fs::create_dir_all(expected.parent().expect("parent")).expect("mkdir");
    std::fs::write(&expected, b"PK").expect("write jar");

    let resolved = resolver.resolve(&artifact()).expect("resolves");
    assert_eq!(resolved, expected);
}

#[test]
fn local_resolver_reports_missing_archive() {
    let repo = tempfile::tempdir().expect("tempdir");
    let resolver = LocalRepositoryResolver::new(repo.path());

    let err = resolver.resolve(&artifact()).expect_err("nothing installed");
    assert!(matches!(err, AppError::Resolution(ref msg) if msg.contains("launcher")));
}

#[test]
fn fixed_resolver_ignores_coordinates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let jar = dir.path().join("custom.jar");
    std::fs::write(&jar, b"PK").expect("write jar");

    let resolver = FixedPathResolver::new(&jar);
    assert_eq!(resolver.resolve(&artifact()).expect("resolves"), jar);

    let missing = FixedPathResolver::new(dir.path().join("gone.jar"));
    assert!(matches!(
        missing.resolve(&artifact()),
        Err(AppError::Resolution(_))
    ));
}
