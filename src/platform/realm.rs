//! Class realm configuration consumed by the child's classworlds launcher.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::config::BooterConfig;
use crate::{AppError, Result};

/// Realm every load pattern is placed in.
pub const ROOT_REALM_ID: &str = "plexus";

/// System property naming the container descriptor.
pub const CONFIGURATION_FILE_PROPERTY: &str = "plexus.configuration";

/// System property enabling the child's control socket.
pub const ENABLE_CONTROL_SOCKET_PROPERTY: &str = "plexus.enable-control-socket";

/// System property carrying the child's control port.
pub const CONTROL_PORT_PROPERTY: &str = "plexus.control-port";

/// Main class, realm contents, and system properties of the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmConfiguration {
    /// Class booted by the launcher.
    pub main_class: String,
    /// Realm the main class is loaded from.
    pub realm_id: String,
    /// Ordered, de-duplicated class path entries.
    pub load_patterns: Vec<String>,
    /// System properties set before the main class starts.
    pub system_properties: BTreeMap<String, String>,
}

impl RealmConfiguration {
    /// Create an empty realm configuration.
    #[must_use]
    pub fn new(main_class: &str, realm_id: &str) -> Self {
        Self {
            main_class: main_class.to_owned(),
            realm_id: realm_id.to_owned(),
            load_patterns: Vec::new(),
            system_properties: BTreeMap::new(),
        }
    }

    /// Append a load pattern unless it is already present.
    pub fn add_load_pattern(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if !self.load_patterns.contains(&pattern) {
            self.load_patterns.push(pattern);
        }
    }

    /// Assemble the realm for `config`.
    ///
    /// Load patterns: prepended entries, test classes (when enabled),
    /// classes, then dependency paths.
    #[must_use]
    pub fn from_config(config: &BooterConfig, descriptor: &Path) -> Self {
        let mut realm = Self::new(&config.launcher_class, ROOT_REALM_ID);

        for pattern in &config.prepend_classpaths {
            realm.add_load_pattern(pattern.as_str());
        }
        if config.include_test_classpath {
            realm.add_load_pattern(absolute(&config.test_classes_dir));
        }
        realm.add_load_pattern(absolute(&config.classes_dir));
        if config.include_test_classpath {
            for pattern in &config.test_classpath {
                realm.add_load_pattern(pattern.as_str());
            }
        }
        for pattern in &config.classpath {
            realm.add_load_pattern(pattern.as_str());
        }

        let props = &mut realm.system_properties;
        props.insert("basedir".into(), absolute(&config.basedir));
        props.extend(config.system_properties.clone());
        props.insert(
            CONFIGURATION_FILE_PROPERTY.into(),
            descriptor.to_string_lossy().into_owned(),
        );
        props.insert(ENABLE_CONTROL_SOCKET_PROPERTY.into(), "true".into());
        props.insert(
            CONTROL_PORT_PROPERTY.into(),
            config.control.app_port.to_string(),
        );

        realm
    }

    /// Check the realm is bootable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.main_class.trim().is_empty() {
            problems.push("main class is not set");
        }
        if self.realm_id.trim().is_empty() {
            problems.push("realm id is not set");
        }
        if self.load_patterns.is_empty() {
            problems.push("realm has no load patterns");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::Config(format!(
                "invalid realm configuration: {}",
                problems.join("; ")
            )))
        }
    }

    /// Render the classworlds file format.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "main is {} from {}", self.main_class, self.realm_id);
        out.push('\n');
        for (key, value) in &self.system_properties {
            let _ = writeln!(out, "set {key} default {value}");
        }
        if !self.system_properties.is_empty() {
            out.push('\n');
        }
        let _ = writeln!(out, "[{}]", self.realm_id);
        for pattern in &self.load_patterns {
            let _ = writeln!(out, "    load {pattern}");
        }
        out
    }
}

/// Persists a realm configuration where the child can read it.
pub trait RealmConfigWriter: Send + Sync {
    /// Write `realm` to `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the file cannot be written.
    fn write(&self, path: &Path, realm: &RealmConfiguration) -> Result<()>;
}

/// Writes the classworlds `.conf` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassworldsConfWriter;

impl RealmConfigWriter for ClassworldsConfWriter {
    fn write(&self, path: &Path, realm: &RealmConfiguration) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        fs::write(path, realm.render())
            .map_err(|err| AppError::Io(format!("failed to write {}: {err}", path.display())))?;
        info!(path = %path.display(), "realm configuration written");
        Ok(())
    }
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
