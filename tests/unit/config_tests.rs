//! Unit tests for `BooterConfig` parsing, overrides, and validation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use appbooter::config::{
    BooterConfig, DEFAULT_APP_CONTROL_PORT, DEFAULT_SESSION_CONTROL_PORT, DEFAULT_STOP_KEYWORD,
};
use appbooter::AppError;
use serial_test::serial;

fn sample_toml() -> &'static str {
    r#"
java_cmd = "/opt/jdk/bin/java -Xmx512m"
debug_output = true
include_test_classpath = true
configuration = "conf/plexus.xml"
basedir = "/srv/app"
target_dir = "/srv/app/build"
classpath = ["/repo/a.jar", "/repo/b.jar"]
prepend_classpaths = ["/patches"]

[system_properties]
"app.name" = "demo"

[platform]
version = "1.2"
local_repository = "/cache/repo"

[control]
host = "localhost"
app_port = 41001
session_port = 41002
connect_timeout_ms = 750

[timeouts]
exit_grace_seconds = 10

[reminder]
count = 0
keyword = "quit"
"#
}

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn empty_file_yields_defaults() {
    let config = BooterConfig::from_toml_str("").expect("empty config is valid");

    assert_eq!(config, BooterConfig::default());
    assert_eq!(config.java_cmd, "java");
    assert_eq!(config.control.app_port, DEFAULT_APP_CONTROL_PORT);
    assert_eq!(config.control.session_port, DEFAULT_SESSION_CONTROL_PORT);
    assert_eq!(config.reminder.keyword, DEFAULT_STOP_KEYWORD);
    assert_eq!(config.reminder.count, 3);
    assert_eq!(config.reminder.interval_seconds, 15);
    assert_eq!(config.reminder.initial_delay_ms, 1000);
    assert_eq!(config.configuration, PathBuf::from("src/main/plexus/plexus.xml"));
    assert_eq!(
        config.launcher_class,
        "org.sonatype.appbooter.PlexusContainerHost"
    );
    assert_eq!(
        config.platform.artifact().to_string(),
        "org.sonatype.appbooter.plexus-platforms:plexus-platform-base:jar:1.0-SNAPSHOT"
    );
}

#[test]
fn parses_every_section() {
    let config = BooterConfig::from_toml_str(sample_toml()).expect("config parses");

    assert_eq!(config.java_cmd, "/opt/jdk/bin/java -Xmx512m");
    assert!(config.debug_output);
    assert!(config.include_test_classpath);
    assert_eq!(config.classpath, vec!["/repo/a.jar", "/repo/b.jar"]);
    assert_eq!(config.prepend_classpaths, vec!["/patches"]);
    assert_eq!(
        config.system_properties.get("app.name").map(String::as_str),
        Some("demo")
    );
    assert_eq!(config.platform.version, "1.2");
    assert_eq!(config.platform.local_repository(), PathBuf::from("/cache/repo"));
    assert_eq!(config.control.app_endpoint().to_string(), "localhost:41001");
    assert_eq!(config.control.session_endpoint().to_string(), "localhost:41002");
    assert_eq!(config.control.connect_timeout(), Duration::from_millis(750));
    assert_eq!(config.timeouts.exit_grace_seconds, 10);
    assert_eq!(config.timeouts.relay_drain_seconds, 5, "unset keys keep defaults");
    assert_eq!(config.reminder.keyword, "quit");
    assert_eq!(config.realm_config_path(), PathBuf::from("/srv/app/build/classworlds.conf"));
    assert_eq!(config.detached_log_path(), PathBuf::from("/srv/app/build/appbooter.log"));
}

#[test]
fn malformed_toml_is_config_error() {
    let err = BooterConfig::from_toml_str("java_cmd = [").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
}

#[test]
fn equal_ports_are_rejected() {
    let err = BooterConfig::from_toml_str("[control]\napp_port = 5000\nsession_port = 5000\n")
        .expect_err("equal ports must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("must differ")));
}

#[test]
fn zero_port_is_rejected() {
    let err = BooterConfig::from_toml_str("[control]\napp_port = 0\n").expect_err("port 0 must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn blank_keyword_is_rejected() {
    let err = BooterConfig::from_toml_str("[reminder]\nkeyword = \"  \"\n")
        .expect_err("blank keyword must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("keyword")));
}

#[test]
fn zero_interval_with_reminders_is_rejected() {
    let err = BooterConfig::from_toml_str("[reminder]\ninterval_seconds = 0\n")
        .expect_err("zero interval must fail");
    assert!(matches!(err, AppError::Config(_)));

    BooterConfig::from_toml_str("[reminder]\ninterval_seconds = 0\ncount = 0\n")
        .expect("zero interval is fine when reminders are disabled");
}

#[test]
fn blank_interpreter_is_rejected() {
    let err = BooterConfig::from_toml_str("java_cmd = \"\"\n").expect_err("blank java_cmd");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn debug_selects_debug_interpreter() {
    let mut config = BooterConfig::default();
    assert_eq!(config.interpreter_command(), "java");
    assert!(!config.verbose());

    config.debug = true;
    assert!(config.interpreter_command().contains("-Xrunjdwp:transport=dt_socket"));
    assert!(config.verbose(), "debug implies verbose launch logging");
}

#[test]
fn overrides_replace_commands_flags_and_ports() {
    let mut config = BooterConfig::default();
    config
        .apply_overrides_from(lookup(&[
            ("APPBOOTER_JAVA_CMD", "/usr/bin/java"),
            ("APPBOOTER_DEBUG_OUTPUT", "yes"),
            ("APPBOOTER_DISABLE_BLOCKING", "1"),
            ("APPBOOTER_INCLUDE_TEST_CLASSPATH", "TRUE"),
            ("APPBOOTER_CONTROL_HOST", "::1"),
            ("APPBOOTER_APP_PORT", "42001"),
            ("APPBOOTER_SESSION_PORT", " 42002 "),
        ]))
        .expect("overrides apply");

    assert_eq!(config.java_cmd, "/usr/bin/java");
    assert!(config.debug_output);
    assert!(config.disable_blocking);
    assert!(config.include_test_classpath);
    assert!(!config.debug, "unset flags are untouched");
    assert_eq!(config.control.host, "::1");
    assert_eq!(config.control.app_port, 42001);
    assert_eq!(config.control.session_port, 42002);
}

#[test]
fn invalid_override_values_are_config_errors() {
    let mut config = BooterConfig::default();
    let err = config
        .apply_overrides_from(lookup(&[("APPBOOTER_DEBUG", "maybe")]))
        .expect_err("bad flag");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("APPBOOTER_DEBUG")));

    let mut config = BooterConfig::default();
    let err = config
        .apply_overrides_from(lookup(&[("APPBOOTER_APP_PORT", "70000")]))
        .expect_err("port out of range");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("APPBOOTER_APP_PORT")));
}

#[test]
fn overrides_are_revalidated() {
    let mut config = BooterConfig::default();
    let err = config
        .apply_overrides_from(lookup(&[("APPBOOTER_APP_PORT", "32002")]))
        .expect_err("collides with the session port");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
#[serial]
fn env_overrides_read_process_environment() {
    std::env::set_var("APPBOOTER_SESSION_PORT", "43002");
    std::env::set_var("APPBOOTER_DEBUG", "on");

    let mut config = BooterConfig::default();
    let result = config.apply_env_overrides();

    std::env::remove_var("APPBOOTER_SESSION_PORT");
    std::env::remove_var("APPBOOTER_DEBUG");

    result.expect("env overrides apply");
    assert_eq!(config.control.session_port, 43002);
    assert!(config.debug);
}

#[test]
#[serial]
fn env_overrides_without_variables_change_nothing() {
    for key in [
        "APPBOOTER_JAVA_CMD",
        "APPBOOTER_DEBUG",
        "APPBOOTER_APP_PORT",
        "APPBOOTER_SESSION_PORT",
    ] {
        std::env::remove_var(key);
    }

    let mut config = BooterConfig::default();
    config.apply_env_overrides().expect("no overrides");
    assert_eq!(config, BooterConfig::default());
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("appbooter.toml");
    std::fs::write(&path, "[control]\napp_port = 45001\n").expect("write config");

    let config = BooterConfig::load_from_path(&path).expect("loads");
    assert_eq!(config.control.app_port, 45001);

    let err = BooterConfig::load_from_path(dir.path().join("missing.toml")).expect_err("missing file");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn missing_descriptor_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = BooterConfig::default();
    config.configuration = dir.path().join("plexus.xml");

    let err = config.ensure_descriptor().expect_err("descriptor absent");
    assert!(matches!(err, AppError::Config(_)));

    std::fs::write(&config.configuration, "<plexus/>").expect("write descriptor");
    let resolved = config.ensure_descriptor().expect("descriptor present");
    assert!(resolved.is_absolute());
}
