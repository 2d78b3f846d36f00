//! Booter operations called by the command surface.
//!
//! [`Booter::run`] launches the application and supervises it until a
//! shutdown trigger fires; [`Booter::start`] launches it in the background.
//! [`stop`] and [`status`] only talk to control endpoints.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncBufRead;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{BooterConfig, ControlConfig};
use crate::ipc::client::ControlClient;
use crate::ipc::ControlEndpoint;
use crate::models::launch::LaunchSpec;
use crate::models::session::StatusReport;
use crate::orchestrator::relay::{LineSink, TracingSink};
use crate::orchestrator::spawner::{build_launch_spec, launch, OutputMode};
use crate::orchestrator::supervisor::{Supervisor, SupervisorOptions};
use crate::platform::realm::{ClassworldsConfWriter, RealmConfigWriter, RealmConfiguration};
use crate::platform::{FixedPathResolver, LocalRepositoryResolver, PlatformResolver};
use crate::{AppError, Result};

/// Result of [`Booter::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The supervised child finished with this exit code.
    Exited(i32),
    /// Blocking was disabled; the child keeps running under this pid.
    Detached(u32),
}

/// Prepares and launches the application described by a [`BooterConfig`].
pub struct Booter {
    config: BooterConfig,
    resolver: Box<dyn PlatformResolver>,
    writer: Box<dyn RealmConfigWriter>,
    sink: Arc<dyn LineSink>,
}

impl Booter {
    /// Create a booter with the default collaborators.
    ///
    /// An explicit `platform.file` is used as-is; otherwise the archive is
    /// looked up in the local repository.
    #[must_use]
    pub fn new(config: BooterConfig) -> Self {
        let resolver: Box<dyn PlatformResolver> = match config.platform.file {
            Some(ref file) => Box::new(FixedPathResolver::new(file)),
            None => Box::new(LocalRepositoryResolver::new(
                config.platform.local_repository(),
            )),
        };
        Self {
            config,
            resolver,
            writer: Box::new(ClassworldsConfWriter),
            sink: Arc::new(TracingSink),
        }
    }

    /// Replace the platform resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl PlatformResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    /// Replace the realm config writer.
    #[must_use]
    pub fn with_writer(mut self, writer: impl RealmConfigWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    /// Replace the sink receiving the child's output lines.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &BooterConfig {
        &self.config
    }

    /// Resolve the platform, write the realm config, and assemble the
    /// child's command line.
    ///
    /// # Errors
    ///
    /// - `AppError::Config` — missing descriptor or invalid realm.
    /// - `AppError::Resolution` — the platform archive cannot be found.
    /// - `AppError::Io` — the realm config cannot be written.
    pub fn prepare(&self) -> Result<LaunchSpec> {
        let descriptor = self.config.ensure_descriptor()?;

        let artifact = self.config.platform.artifact();
        let archive = self.resolver.resolve(&artifact)?;
        if self.config.verbose() {
            info!(%artifact, archive = %archive.display(), "platform resolved");
        }

        let realm = RealmConfiguration::from_config(&self.config, &descriptor);
        realm.validate()?;
        let realm_path = self.config.realm_config_path();
        self.writer.write(&realm_path, &realm)?;

        build_launch_spec(
            self.config.interpreter_command(),
            &realm_path,
            &archive,
            &self.config.basedir,
            self.config.verbose(),
        )
    }

    /// Launch the application and supervise it until it stops.
    ///
    /// `input` is the operator console and `exit_signal` resolves when the
    /// supervisor process is asked to terminate. With blocking disabled this
    /// delegates to [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Fails only before the session is running: preparation, control
    /// socket binding, or launch. Shutdown problems are logged and reflected
    /// in the exit code instead.
    pub async fn run<R, S>(&self, input: Option<R>, exit_signal: S) -> Result<RunOutcome>
    where
        R: AsyncBufRead + Unpin + Send,
        S: Future<Output = ()>,
    {
        if self.config.disable_blocking {
            return self.start().map(RunOutcome::Detached);
        }

        let spec = self.prepare()?;
        let control = &self.config.control;
        let supervisor = Supervisor::start(
            &spec,
            control.app_endpoint(),
            &control.session_endpoint(),
            Arc::clone(&self.sink),
            SupervisorOptions::from_config(&self.config),
        )
        .await?;

        let span = info_span!("session", session_id = supervisor.session_id());
        let driver = supervisor.run_until_stopped(input).instrument(span);
        tokio::pin!(driver);

        let finished = tokio::select! {
            code = &mut driver => Some(code),
            () = exit_signal => None,
        };
        let exit_code = match finished {
            Some(code) => code,
            None => {
                supervisor.exit_hook();
                driver.await
            }
        };
        Ok(RunOutcome::Exited(exit_code))
    }

    /// Launch the application in the background and return its pid.
    ///
    /// Child output is appended to `<target_dir>/appbooter.log`.
    ///
    /// # Errors
    ///
    /// Same preparation errors as [`prepare`](Self::prepare), plus
    /// `AppError::Launch` when the process cannot be spawned.
    pub fn start(&self) -> Result<u32> {
        let spec = self.prepare()?;
        let log_path = self.config.detached_log_path();
        let child = launch(&spec, &OutputMode::Detached(log_path.clone()))?;
        let pid = child
            .pid()
            .ok_or_else(|| AppError::Launch("child exited before its pid was known".into()))?;
        info!(pid, log = %log_path.display(), "application started in background");
        Ok(pid)
    }
}

/// Which control endpoints [`stop`] addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTargets {
    /// The child application only.
    Application,
    /// The supervising session only.
    Session,
    /// The session first, then the application.
    Both,
}

impl StopTargets {
    fn endpoints(self, control: &ControlConfig) -> Vec<ControlEndpoint> {
        match self {
            Self::Application => vec![control.app_endpoint()],
            Self::Session => vec![control.session_endpoint()],
            Self::Both => vec![control.session_endpoint(), control.app_endpoint()],
        }
    }
}

/// Outcome of [`stop`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    /// Endpoints that acknowledged the shutdown.
    pub acknowledged: Vec<String>,
    /// Endpoints nothing was listening on.
    pub unreachable: Vec<String>,
    /// Endpoints that failed after an earlier one acknowledged.
    pub failed: Vec<FailedStop>,
}

/// Shutdown exchange that failed without voiding the whole [`stop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedStop {
    /// Endpoint addressed.
    pub endpoint: String,
    /// What went wrong.
    pub error: String,
}

/// Send one shutdown command to each target endpoint.
///
/// With a single target any failure is returned. With [`StopTargets::Both`]
/// an unreachable endpoint is skipped as long as the other acknowledges,
/// and once one endpoint has acknowledged any later failure is recorded in
/// [`StopReport::failed`] instead of discarding the report.
///
/// # Errors
///
/// - `AppError::ControlConnection` — no addressed endpoint was reachable.
/// - `AppError::Ipc` — an endpoint failed the exchange or refused the command.
pub async fn stop(control: &ControlConfig, targets: StopTargets) -> Result<StopReport> {
    let mut report = StopReport::default();
    let mut first_unreachable = None;

    for endpoint in targets.endpoints(control) {
        let client = ControlClient::new(endpoint.clone(), control.connect_timeout());
        match client.send_shutdown().await {
            Ok(()) => report.acknowledged.push(endpoint.to_string()),
            Err(err) if err.is_recoverable() && targets == StopTargets::Both => {
                info!(%endpoint, %err, "endpoint not reachable; skipping");
                report.unreachable.push(endpoint.to_string());
                first_unreachable.get_or_insert(err);
            }
            Err(err) if targets == StopTargets::Both && !report.acknowledged.is_empty() => {
                warn!(%endpoint, %err, "shutdown failed after an earlier endpoint acknowledged");
                report.failed.push(FailedStop {
                    endpoint: endpoint.to_string(),
                    error: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    if report.acknowledged.is_empty() {
        if let Some(err) = first_unreachable {
            return Err(err);
        }
    }
    Ok(report)
}

/// Ask a running session to describe itself.
///
/// # Errors
///
/// - `AppError::ControlConnection` — no session is listening.
/// - `AppError::Ipc` — the exchange failed or the reply is not a status
///   report.
pub async fn status(control: &ControlConfig) -> Result<StatusReport> {
    let client = ControlClient::new(control.session_endpoint(), control.connect_timeout());
    let reply = client.query_status().await?;
    serde_json::from_str(&reply)
        .map_err(|err| AppError::Ipc(format!("malformed status reply '{reply}': {err}")))
}

/// Config file picked up when none is given on the command line.
#[must_use]
pub fn default_config_path() -> PathBuf {
    PathBuf::from("appbooter.toml")
}
