//! Unit tests for realm configuration assembly and the classworlds writer.

use std::path::Path;

use appbooter::config::BooterConfig;
use appbooter::platform::realm::{
    ClassworldsConfWriter, RealmConfigWriter, RealmConfiguration, CONFIGURATION_FILE_PROPERTY,
    CONTROL_PORT_PROPERTY, ENABLE_CONTROL_SOCKET_PROPERTY, ROOT_REALM_ID,
};
use appbooter::AppError;

fn config(include_tests: bool) -> BooterConfig {
    let mut config = BooterConfig::default();
    config.basedir = "/srv/app".into();
    config.classes_dir = "/srv/app/target/classes".into();
    config.test_classes_dir = "/srv/app/target/test-classes".into();
    config.prepend_classpaths = vec!["/patches".into()];
    config.classpath = vec!["/repo/a.jar".into(), "/patches".into()];
    config.test_classpath = vec!["/repo/junit.jar".into()];
    config.include_test_classpath = include_tests;
    config
        .system_properties
        .insert("app.name".into(), "demo".into());
    config
}

#[test]
fn load_order_without_tests() {
    let realm = RealmConfiguration::from_config(&config(false), Path::new("/srv/app/plexus.xml"));

    assert_eq!(realm.realm_id, ROOT_REALM_ID);
    assert_eq!(
        realm.load_patterns,
        vec!["/patches", "/srv/app/target/classes", "/repo/a.jar"],
        "duplicates keep their first position"
    );
}

#[test]
fn load_order_with_tests() {
    let realm = RealmConfiguration::from_config(&config(true), Path::new("/srv/app/plexus.xml"));

    assert_eq!(
        realm.load_patterns,
        vec![
            "/patches",
            "/srv/app/target/test-classes",
            "/srv/app/target/classes",
            "/repo/junit.jar",
            "/repo/a.jar",
        ]
    );
}

#[test]
fn system_properties_enable_the_control_socket() {
    let config = config(false);
    let realm = RealmConfiguration::from_config(&config, Path::new("/srv/app/plexus.xml"));
    let props = &realm.system_properties;

    assert_eq!(props.get("basedir").map(String::as_str), Some("/srv/app"));
    assert_eq!(props.get("app.name").map(String::as_str), Some("demo"));
    assert_eq!(
        props.get(CONFIGURATION_FILE_PROPERTY).map(String::as_str),
        Some("/srv/app/plexus.xml")
    );
    assert_eq!(
        props.get(ENABLE_CONTROL_SOCKET_PROPERTY).map(String::as_str),
        Some("true")
    );
    assert_eq!(
        props.get(CONTROL_PORT_PROPERTY),
        Some(&config.control.app_port.to_string())
    );
}

#[test]
fn validate_lists_every_problem() {
    let realm = RealmConfiguration::new(" ", ROOT_REALM_ID);
    let err = realm.validate().expect_err("no main class and no patterns");
    let AppError::Config(msg) = err else {
        panic!("expected config error");
    };
    assert!(msg.contains("main class"));
    assert!(msg.contains("load patterns"));
}

#[test]
fn render_uses_classworlds_format() {
    let mut realm = RealmConfiguration::new("org.example.Main", "plexus");
    realm.add_load_pattern("/a.jar");
    realm.add_load_pattern("/b");
    realm.add_load_pattern("/a.jar");
    realm.system_properties.insert("k".into(), "v".into());

    assert_eq!(
        realm.render(),
        "main is org.example.Main from plexus\n\nset k default v\n\n[plexus]\n    load /a.jar\n    load /b\n"
    );
}

#[test]
fn writer_creates_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("target/nested/classworlds.conf");
    let mut realm = RealmConfiguration::new("org.example.Main", "plexus");
    realm.add_load_pattern("/a.jar");

    ClassworldsConfWriter.write(&path, &realm).expect("write");

    let written = std::fs::read_to_string(&path).expect("read back");
    assert_eq!(written, realm.render());
}
