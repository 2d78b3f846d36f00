//! Launch specification for the supervised child process.

use std::path::{Path, PathBuf};

/// Executable, ordered arguments, and working directory of the child.
///
/// Built once by [`build_launch_spec`](crate::orchestrator::spawner::build_launch_spec)
/// and consumed by [`launch`](crate::orchestrator::spawner::launch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    executable: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl LaunchSpec {
    /// Construct a launch specification.
    #[must_use]
    pub fn new(executable: impl Into<String>, args: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args,
            working_dir: working_dir.into(),
        }
    }

    /// Program to execute.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Arguments, in order.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Directory the child starts in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Human-readable command line; arguments containing whitespace or
    /// quotes are single-quoted.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_owned()
    }
}
