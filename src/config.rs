//! Booter configuration parsing, environment overrides, and validation.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::ipc::ControlEndpoint;
use crate::platform::PlatformArtifact;
use crate::{AppError, Result};

/// Default port of the child application's control socket.
pub const DEFAULT_APP_CONTROL_PORT: u16 = 32001;

/// Default port of the supervising session's own control socket.
pub const DEFAULT_SESSION_CONTROL_PORT: u16 = 32002;

/// Default keyword the operator types to stop a blocking session.
pub const DEFAULT_STOP_KEYWORD: &str = "shutdown";

fn default_java_cmd() -> String {
    "java".into()
}

fn default_debug_java_cmd() -> String {
    "java -Xdebug -Xnoagent -Xrunjdwp:transport=dt_socket,server=y,address=5005 -Djava.compiler=NONE"
        .into()
}

fn default_launcher_class() -> String {
    "org.sonatype.appbooter.PlexusContainerHost".into()
}

/// Location of the platform launcher archive.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct PlatformConfig {
    /// Group of the platform artifact.
    pub group_id: String,
    /// Artifact name of the platform artifact.
    pub artifact_id: String,
    /// Version of the platform artifact.
    pub version: String,
    /// Explicit archive path; bypasses repository resolution when set.
    pub file: Option<PathBuf>,
    /// Local repository root; defaults to `~/.m2/repository`.
    pub local_repository: Option<PathBuf>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        let artifact = PlatformArtifact::default();
        Self {
            group_id: artifact.group_id,
            artifact_id: artifact.artifact_id,
            version: artifact.version,
            file: None,
            local_repository: None,
        }
    }
}

impl PlatformConfig {
    /// Coordinates of the configured platform artifact.
    #[must_use]
    pub fn artifact(&self) -> PlatformArtifact {
        PlatformArtifact::new(&self.group_id, &self.artifact_id, &self.version)
    }

    /// Repository root used by the local resolver.
    #[must_use]
    pub fn local_repository(&self) -> PathBuf {
        if let Some(ref repo) = self.local_repository {
            return repo.clone();
        }
        let home = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        home.join(".m2").join("repository")
    }
}

/// Control socket addressing for the application and the session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct ControlConfig {
    /// Host both control sockets bind to / connect to.
    pub host: String,
    /// Control port of the child application.
    pub app_port: u16,
    /// Control port of the supervising session.
    pub session_port: u16,
    /// Connect timeout for control clients.
    pub connect_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            app_port: DEFAULT_APP_CONTROL_PORT,
            session_port: DEFAULT_SESSION_CONTROL_PORT,
            connect_timeout_ms: 2000,
        }
    }
}

impl ControlConfig {
    /// Endpoint of the child application's control socket.
    #[must_use]
    pub fn app_endpoint(&self) -> ControlEndpoint {
        ControlEndpoint::new(&self.host, self.app_port)
    }

    /// Endpoint of the session's own control socket.
    #[must_use]
    pub fn session_endpoint(&self) -> ControlEndpoint {
        ControlEndpoint::new(&self.host, self.session_port)
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Bounded waits used by the stop sequence.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// How long relay shutdown waits for in-flight reads.
    pub relay_drain_seconds: u64,
    /// How long to wait for the child to exit after the shutdown command.
    pub exit_grace_seconds: u64,
    /// How long background tasks get to join before being abandoned.
    pub join_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            relay_drain_seconds: 5,
            exit_grace_seconds: 30,
            join_seconds: 5,
        }
    }
}

/// Operator reminder schedule.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct ReminderConfig {
    /// Delay before the first reminder.
    pub initial_delay_ms: u64,
    /// Interval between reminders.
    pub interval_seconds: u64,
    /// Number of reminders; 0 disables the ticker.
    pub count: u32,
    /// Keyword the operator types to stop the session.
    pub keyword: String,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            interval_seconds: 15,
            count: 3,
            keyword: DEFAULT_STOP_KEYWORD.into(),
        }
    }
}

/// Booter configuration parsed from `appbooter.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct BooterConfig {
    /// Interpreter command line.
    pub java_cmd: String,
    /// Interpreter command line used when `debug` is set.
    pub debug_java_cmd: String,
    /// Launch the child under the debug interpreter.
    pub debug: bool,
    /// Log the assembled command line and artifact locations.
    pub debug_output: bool,
    /// Return as soon as the child is launched.
    pub disable_blocking: bool,
    /// Put test classes and test-scoped dependencies on the realm.
    pub include_test_classpath: bool,
    /// Main class booted inside the realm.
    pub launcher_class: String,
    /// Container descriptor handed to the child.
    pub configuration: PathBuf,
    /// Project base directory; also the child's working directory.
    pub basedir: PathBuf,
    /// Build output directory; the realm config is written here.
    pub target_dir: PathBuf,
    /// Compiled classes directory.
    pub classes_dir: PathBuf,
    /// Compiled test classes directory.
    pub test_classes_dir: PathBuf,
    /// Compile/runtime dependency paths.
    pub classpath: Vec<String>,
    /// Test-scoped dependency paths.
    pub test_classpath: Vec<String>,
    /// Load patterns placed ahead of everything else.
    pub prepend_classpaths: Vec<String>,
    /// Extra system properties for the child.
    pub system_properties: BTreeMap<String, String>,
    /// Platform archive settings.
    pub platform: PlatformConfig,
    /// Control socket settings.
    pub control: ControlConfig,
    /// Stop sequence timeouts.
    pub timeouts: TimeoutConfig,
    /// Operator reminder settings.
    pub reminder: ReminderConfig,
}

impl Default for BooterConfig {
    fn default() -> Self {
        Self {
            java_cmd: default_java_cmd(),
            debug_java_cmd: default_debug_java_cmd(),
            debug: false,
            debug_output: false,
            disable_blocking: false,
            include_test_classpath: false,
            launcher_class: default_launcher_class(),
            configuration: PathBuf::from("src/main/plexus/plexus.xml"),
            basedir: PathBuf::from("."),
            target_dir: PathBuf::from("target"),
            classes_dir: PathBuf::from("target/classes"),
            test_classes_dir: PathBuf::from("target/test-classes"),
            classpath: Vec::new(),
            test_classpath: Vec::new(),
            prepend_classpaths: Vec::new(),
            system_properties: BTreeMap::new(),
            platform: PlatformConfig::default(),
            control: ControlConfig::default(),
            timeouts: TimeoutConfig::default(),
            reminder: ReminderConfig::default(),
        }
    }
}

impl BooterConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `APPBOOTER_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an unparseable value.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then re-validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a value is unparseable or the result
    /// fails validation.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(cmd) = lookup("APPBOOTER_JAVA_CMD") {
            self.java_cmd = cmd;
        }
        if let Some(cmd) = lookup("APPBOOTER_DEBUG_JAVA_CMD") {
            self.debug_java_cmd = cmd;
        }
        if let Some(host) = lookup("APPBOOTER_CONTROL_HOST") {
            self.control.host = host;
        }

        let flags: [(&str, &mut bool); 4] = [
            ("APPBOOTER_DEBUG", &mut self.debug),
            ("APPBOOTER_DEBUG_OUTPUT", &mut self.debug_output),
            ("APPBOOTER_DISABLE_BLOCKING", &mut self.disable_blocking),
            (
                "APPBOOTER_INCLUDE_TEST_CLASSPATH",
                &mut self.include_test_classpath,
            ),
        ];
        for (key, slot) in flags {
            if let Some(raw) = lookup(key) {
                *slot = parse_flag(key, &raw)?;
            }
        }

        if let Some(raw) = lookup("APPBOOTER_APP_PORT") {
            self.control.app_port = parse_port("APPBOOTER_APP_PORT", &raw)?;
        }
        if let Some(raw) = lookup("APPBOOTER_SESSION_PORT") {
            self.control.session_port = parse_port("APPBOOTER_SESSION_PORT", &raw)?;
        }

        self.validate()
    }

    /// Interpreter command line for the current debug setting.
    #[must_use]
    pub fn interpreter_command(&self) -> &str {
        if self.debug {
            &self.debug_java_cmd
        } else {
            &self.java_cmd
        }
    }

    /// Whether verbose launch diagnostics should be logged.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.debug || self.debug_output
    }

    /// Location of the generated realm config file.
    #[must_use]
    pub fn realm_config_path(&self) -> PathBuf {
        self.target_dir.join("classworlds.conf")
    }

    /// Log file receiving child output when launched non-blocking.
    #[must_use]
    pub fn detached_log_path(&self) -> PathBuf {
        self.target_dir.join("appbooter.log")
    }

    /// Ensure the container descriptor exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the descriptor is missing.
    pub fn ensure_descriptor(&self) -> Result<PathBuf> {
        self.configuration.canonicalize().map_err(|_| {
            AppError::Config(format!(
                "no container descriptor at {}; make sure you are in a directory where an application lives",
                self.configuration.display()
            ))
        })
    }

    fn validate(&self) -> Result<()> {
        if self.interpreter_command().trim().is_empty() {
            return Err(AppError::Config("interpreter command must not be empty".into()));
        }

        if self.control.app_port == 0 || self.control.session_port == 0 {
            return Err(AppError::Config("control ports must be non-zero".into()));
        }

        if self.control.app_port == self.control.session_port {
            return Err(AppError::Config(format!(
                "app_port and session_port must differ (both {})",
                self.control.app_port
            )));
        }

        if self.reminder.keyword.trim().is_empty() {
            return Err(AppError::Config("reminder keyword must not be empty".into()));
        }

        if self.reminder.count > 0 && self.reminder.interval_seconds == 0 {
            return Err(AppError::Config(
                "reminder interval_seconds must be greater than zero".into(),
            ));
        }

        debug!(
            app_port = self.control.app_port,
            session_port = self.control.session_port,
            "configuration validated"
        );
        Ok(())
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::Config(format!("{key}: invalid boolean '{other}'"))),
    }
}

fn parse_port(key: &str, raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|err| AppError::Config(format!("{key}: invalid port '{raw}': {err}")))
}
