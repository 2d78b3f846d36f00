//! Child process command assembly and launch.
//!
//! [`build_launch_spec`] turns an interpreter command line plus the realm
//! config and platform archive into a [`LaunchSpec`]; [`launch`] spawns it
//! and hands back a [`ChildProcessHandle`] owning the child's streams.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{info, warn};

use crate::models::launch::LaunchSpec;
use crate::models::session::UNKNOWN_EXIT_CODE;
use crate::{AppError, Result};

/// System property through which the child finds its realm config.
pub const REALM_CONFIG_PROPERTY: &str = "classworlds.conf";

/// Assemble the child's command line.
///
/// The interpreter's first token becomes the executable; its remaining
/// tokens are followed by `-Dclassworlds.conf=<config>`, `-jar`, and
/// `<archive>`. Both paths are made absolute and each travels as its own
/// argument, so no shell quoting is involved.
///
/// # Errors
///
/// Returns `AppError::Config` if the interpreter command is blank or either
/// path does not exist.
pub fn build_launch_spec(
    interpreter: &str,
    realm_config: &Path,
    archive: &Path,
    working_dir: &Path,
    verbose: bool,
) -> Result<LaunchSpec> {
    let mut tokens = interpreter.split_whitespace().map(str::to_owned);
    let executable = tokens
        .next()
        .ok_or_else(|| AppError::Config("interpreter command must not be empty".into()))?;

    let realm_config = existing_absolute(realm_config, "realm configuration")?;
    let archive = existing_absolute(archive, "platform archive")?;

    let mut args: Vec<String> = tokens.collect();
    args.push(format!("-D{REALM_CONFIG_PROPERTY}={}", realm_config.display()));
    args.push("-jar".into());
    args.push(archive.to_string_lossy().into_owned());

    let spec = LaunchSpec::new(executable, args, working_dir);
    if verbose {
        info!(command = %spec.command_line(), "assembled child command line");
    }
    Ok(spec)
}

fn existing_absolute(path: &Path, what: &str) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|err| AppError::Config(format!("{what} not found at {}: {err}", path.display())))
}

/// Where the child's stdout and stderr go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Captured through pipes for the stream relay.
    Piped,
    /// Appended to a log file so the child outlives the supervisor.
    Detached(PathBuf),
}

/// A spawned child process and its captured streams.
#[derive(Debug)]
pub struct ChildProcessHandle {
    child: Child,
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ChildProcessHandle {
    /// OS process id, if the child was still running when spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the child's stdout; `None` after the first call or when detached.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the child's stderr; `None` after the first call or when detached.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Block until the child exits and return its exit status.
    ///
    /// A signal-terminated child or a failed wait yields
    /// [`UNKNOWN_EXIT_CODE`].
    pub async fn wait_for_exit(&mut self) -> i32 {
        match self.child.wait().await {
            Ok(status) => status.code().unwrap_or_else(|| {
                warn!(pid = self.pid, %status, "child terminated without an exit code");
                UNKNOWN_EXIT_CODE
            }),
            Err(err) => {
                warn!(pid = self.pid, %err, "failed waiting for child process");
                UNKNOWN_EXIT_CODE
            }
        }
    }
}

/// Spawn the child described by `spec`.
///
/// Stdin is always null: operator input belongs to the supervisor.
///
/// # Errors
///
/// Returns `AppError::Launch` if the process cannot be spawned or the
/// detached log file cannot be opened.
pub fn launch(spec: &LaunchSpec, output: &OutputMode) -> Result<ChildProcessHandle> {
    let mut cmd = Command::new(spec.executable());
    cmd.args(spec.args())
        .current_dir(spec.working_dir())
        .stdin(Stdio::null());

    match output {
        OutputMode::Piped => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        OutputMode::Detached(log_path) => {
            if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|err| {
                    AppError::Launch(format!("cannot create {}: {err}", parent.display()))
                })?;
            }
            let log = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .map_err(|err| {
                    AppError::Launch(format!("cannot open child log {}: {err}", log_path.display()))
                })?;
            let log_err = log.try_clone().map_err(|err| {
                AppError::Launch(format!("cannot share child log {}: {err}", log_path.display()))
            })?;
            cmd.stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
        }
    }

    let mut child = cmd.spawn().map_err(|err| {
        AppError::Launch(format!("failed to spawn {}: {err}", spec.executable()))
    })?;

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    info!(pid, executable = spec.executable(), "child process spawned");

    Ok(ChildProcessHandle {
        child,
        pid,
        stdout,
        stderr,
    })
}
