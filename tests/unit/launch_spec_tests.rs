//! Unit tests for child command line assembly.

use std::path::Path;

use appbooter::orchestrator::spawner::{build_launch_spec, REALM_CONFIG_PROPERTY};
use appbooter::AppError;

struct Fixture {
    _dir: tempfile::TempDir,
    conf: std::path::PathBuf,
    jar: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let conf = dir.path().join("classworlds.conf");
    let jar = dir.path().join("platform with space.jar");
    std::fs::write(&conf, "main is X from plexus\n").expect("write conf");
    std::fs::write(&jar, b"PK").expect("write jar");
    Fixture {
        conf: conf.canonicalize().expect("canonical conf"),
        jar: jar.canonicalize().expect("canonical jar"),
        _dir: dir,
    }
}

#[test]
fn interpreter_tokens_precede_realm_property_and_jar() {
    let fx = fixture();
    let spec = build_launch_spec("java -Xmx256m -server", &fx.conf, &fx.jar, Path::new("."), false)
        .expect("spec builds");

    assert_eq!(spec.executable(), "java");
    assert_eq!(
        spec.args(),
        [
            "-Xmx256m".to_owned(),
            "-server".to_owned(),
            format!("-D{REALM_CONFIG_PROPERTY}={}", fx.conf.display()),
            "-jar".to_owned(),
            fx.jar.display().to_string(),
        ]
    );
    assert_eq!(spec.working_dir(), Path::new("."));
}

#[test]
fn paths_with_spaces_stay_single_arguments() {
    let fx = fixture();
    let spec = build_launch_spec("java", &fx.conf, &fx.jar, Path::new("."), true).expect("spec builds");

    let last = spec.args().last().expect("jar argument");
    assert!(last.ends_with("platform with space.jar"));
    assert!(
        spec.command_line().contains("'"),
        "the display form quotes the spaced path"
    );
}

#[test]
fn blank_interpreter_is_config_error() {
    let fx = fixture();
    let err = build_launch_spec("   ", &fx.conf, &fx.jar, Path::new("."), false).expect_err("blank");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_artifacts_are_config_errors() {
    let fx = fixture();
    let missing = fx.jar.with_file_name("absent.jar");

    let err = build_launch_spec("java", &fx.conf, &missing, Path::new("."), false)
        .expect_err("missing jar");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("platform archive")));

    let err = build_launch_spec("java", &missing, &fx.jar, Path::new("."), false)
        .expect_err("missing conf");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("realm configuration")));
}
