//! Unit tests for `AppError` display format and recoverability.

use appbooter::AppError;

#[test]
fn display_prefixes_name_the_failure_kind() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Launch("bad".into()), "launch: bad"),
        (AppError::ControlConnection("bad".into()), "control connection: bad"),
        (AppError::Ipc("bad".into()), "ipc: bad"),
        (AppError::Resolution("bad".into()), "resolution: bad"),
        (AppError::Io("bad".into()), "io: bad"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn only_connection_failures_are_recoverable() {
    assert!(AppError::ControlConnection("refused".into()).is_recoverable());
    assert!(!AppError::Ipc("reset".into()).is_recoverable());
    assert!(!AppError::Launch("no such file".into()).is_recoverable());
    assert!(!AppError::Config("missing".into()).is_recoverable());
}

#[test]
fn io_errors_convert_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("denied")));
}

#[test]
fn toml_errors_convert_to_config_variant() {
    let parse_err = toml::from_str::<toml::Value>("= nope").expect_err("invalid toml");
    let err: AppError = parse_err.into();
    assert!(err.to_string().starts_with("config: invalid config:"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Ipc("x".into()));
}
