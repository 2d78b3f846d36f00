//! Session supervisor: ties shutdown triggers to one stop sequence.
//!
//! A session is armed once the control socket is bound, the child is
//! launched and its streams are relayed. From then on any of four triggers
//! ends it: the operator keyword on stdin, `shutdown` on the session's
//! control socket, the process exit hook, or the child exiting by itself.
//! Whichever trigger gets there first runs the stop sequence exactly once:
//!
//! 1. send `shutdown` to the child's control socket (skipped for natural exit)
//! 2. stop the stream relay
//! 3. wait, bounded, for the child's exit code
//! 4. stop the reminder ticker
//! 5. close the session's own client and control server
//!
//! Failures along the way are logged and recorded; the session always
//! reaches `Stopped` with some exit code.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};

use super::relay::{LineSink, StreamRelay};
use super::reminder::{ReminderSchedule, ReminderTicker};
use super::spawner::{launch, OutputMode};
use crate::config::BooterConfig;
use crate::ipc::client::ControlClient;
use crate::ipc::server::{spawn_control_server, CommandRegistry, ControlServer};
use crate::ipc::{ControlEndpoint, Service, ACK_REPLY, SHUTDOWN_COMMAND, STATUS_COMMAND};
use crate::models::launch::LaunchSpec;
use crate::models::session::{SessionState, StatusReport, StopTrigger, UNKNOWN_EXIT_CODE};
use crate::Result;

/// Tunables for one supervised session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Line the operator types to stop the session.
    pub keyword: String,
    /// Reminder schedule; `None` disables the ticker.
    pub reminder: Option<ReminderSchedule>,
    /// Bound on waiting for the relay pumps to finish.
    pub relay_drain_timeout: Duration,
    /// Bound on waiting for the child to exit after the shutdown command.
    pub exit_grace: Duration,
    /// Bound on joining the reminder ticker and the control server.
    pub join_timeout: Duration,
    /// Connect timeout when contacting the child's control socket.
    pub connect_timeout: Duration,
}

impl SupervisorOptions {
    /// Options derived from the booter configuration.
    #[must_use]
    pub fn from_config(config: &BooterConfig) -> Self {
        let reminder = (config.reminder.count > 0).then(|| ReminderSchedule::from(&config.reminder));
        Self {
            keyword: config.reminder.keyword.clone(),
            reminder,
            relay_drain_timeout: Duration::from_secs(config.timeouts.relay_drain_seconds),
            exit_grace: Duration::from_secs(config.timeouts.exit_grace_seconds),
            join_timeout: Duration::from_secs(config.timeouts.join_seconds),
            connect_timeout: config.control.connect_timeout(),
        }
    }
}

/// One supervised child process and its control plumbing.
pub struct Supervisor {
    session_id: String,
    state: Arc<SessionState>,
    child_client: ControlClient,
    session_client: ControlClient,
    pid: Option<u32>,
    control_addr: SocketAddr,
    options: SupervisorOptions,
    exit_rx: watch::Receiver<Option<i32>>,
    exit_watcher: Mutex<Option<JoinHandle<()>>>,
    relay: Mutex<Option<StreamRelay>>,
    reminder: Mutex<Option<ReminderTicker>>,
    reminder_ticks: Option<Arc<AtomicU32>>,
    control_server: Mutex<Option<ControlServer>>,
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

impl Supervisor {
    /// Bind the session control socket, launch the child, start relaying
    /// its output, and arm the triggers.
    ///
    /// # Errors
    ///
    /// - `AppError::Ipc` — the session control socket cannot be bound.
    /// - `AppError::Launch` — the child cannot be spawned.
    pub async fn start(
        spec: &LaunchSpec,
        child_endpoint: ControlEndpoint,
        session_endpoint: &ControlEndpoint,
        sink: Arc<dyn LineSink>,
        options: SupervisorOptions,
    ) -> Result<Arc<Self>> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let state = Arc::new(SessionState::new());
        let pid_slot = Arc::new(OnceLock::new());

        let registry = session_commands(&session_id, &state, &pid_slot, &child_endpoint);
        let server = spawn_control_server(session_endpoint, registry, CancellationToken::new()).await?;
        let control_addr = server.local_addr();
        info!(%session_id, %control_addr, "session control socket ready");

        let mut child = launch(spec, &OutputMode::Piped)?;
        let pid = child.pid();
        if let Some(pid) = pid {
            let _ = pid_slot.set(pid);
        }

        let relay = StreamRelay::start(
            child.take_stdout(),
            child.take_stderr(),
            sink,
            options.relay_drain_timeout,
        );

        let (exit_tx, exit_rx) = watch::channel(None);
        let exit_watcher = tokio::spawn(async move {
            let code = child.wait_for_exit().await;
            debug!(exit_code = code, "child process exited");
            let _ = exit_tx.send(Some(code));
        });

        let reminder = options.reminder.clone().map(ReminderTicker::spawn);
        let reminder_ticks = reminder.as_ref().map(ReminderTicker::tick_counter);

        let supervisor = Arc::new(Self {
            session_id,
            state,
            child_client: ControlClient::new(child_endpoint, options.connect_timeout),
            session_client: ControlClient::new(
                ControlEndpoint::new(control_addr.ip().to_string(), control_addr.port()),
                options.connect_timeout,
            ),
            pid,
            control_addr,
            options,
            exit_rx,
            exit_watcher: Mutex::new(Some(exit_watcher)),
            relay: Mutex::new(Some(relay)),
            reminder: Mutex::new(reminder),
            reminder_ticks,
            control_server: Mutex::new(Some(server)),
        });

        supervisor.state.mark_running();
        info!(session_id = %supervisor.session_id, pid, "session running");
        Ok(supervisor)
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Shared lifecycle state.
    #[must_use]
    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Child process id, if known.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Address the session control socket is bound to.
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Client proxying the child's control socket.
    #[must_use]
    pub fn child_client(&self) -> &ControlClient {
        &self.child_client
    }

    /// Client addressing this session's own control socket.
    ///
    /// Closed by the stop sequence, after which it reports shut down.
    #[must_use]
    pub fn session_client(&self) -> &ControlClient {
        &self.session_client
    }

    /// Reminders printed so far; zero when the ticker is disabled.
    #[must_use]
    pub fn reminders_sent(&self) -> u32 {
        self.reminder_ticks
            .as_ref()
            .map_or(0, |ticks| ticks.load(Ordering::SeqCst))
    }

    /// Block until one trigger fires, run the stop sequence, and return the
    /// child's exit code.
    ///
    /// `input` is the operator console; `None` leaves only the other
    /// triggers armed. End of input does not stop the session.
    pub async fn run_until_stopped<R>(self: &Arc<Self>, input: Option<R>) -> i32
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let trigger = tokio::select! {
            () = wait_for_keyword(input, &self.options.keyword) => StopTrigger::OperatorKeyword,
            () = self.state.wait_for_stop_request() => {
                self.state.requested_by().unwrap_or(StopTrigger::RemoteCommand)
            }
            () = self.wait_for_child_exit() => StopTrigger::ChildExited,
        };
        self.stop(trigger).await
    }

    /// Exit hook: ask the session to stop because the supervisor process is
    /// terminating. Never touches the network; the driver task runs the
    /// stop sequence.
    pub fn exit_hook(&self) {
        if !self.state.should_stop() {
            info!(session_id = %self.session_id, "exit hook stopping application");
        }
        self.state.request_stop(StopTrigger::ExitHook);
    }

    /// Enter `Stopping` on behalf of `trigger` and return the exit code.
    ///
    /// Only the first caller runs the stop sequence; every caller gets the
    /// same published result. The sequence runs on its own task so a
    /// dropped caller cannot leave the session half-stopped.
    pub async fn stop(self: &Arc<Self>, trigger: StopTrigger) -> i32 {
        if self.state.begin_stopping(trigger) {
            let this = Arc::clone(self);
            let sequence = tokio::spawn(async move {
                let code = this.run_stop_sequence(trigger).await;
                this.state.publish(code);
            });
            if let Err(err) = sequence.await {
                warn!(%err, "stop sequence task failed");
                self.state.record_error(format!("stop sequence failed: {err}"));
                self.state.publish(UNKNOWN_EXIT_CODE);
            }
        }
        self.state.await_result().await
    }

    async fn run_stop_sequence(&self, trigger: StopTrigger) -> i32 {
        info!(session_id = %self.session_id, ?trigger, "stopping session");

        // The reminder stops ticking as soon as Stopping begins; it is
        // joined later in the sequence.
        let reminder = take(&self.reminder);
        if let Some(ref ticker) = reminder {
            ticker.cancellation_token().cancel();
        }

        self.shutdown_child(trigger).await;

        if let Some(relay) = take(&self.relay) {
            // A child that already exited gets its remaining output drained.
            let drained = if trigger == StopTrigger::ChildExited {
                relay.drain().await
            } else {
                relay.stop().await
            };
            if !drained {
                warn!("stream relay did not drain within {:?}", self.options.relay_drain_timeout);
            }
        }

        let exit_code = self.collect_exit_code().await;

        if let Some(ticker) = reminder {
            ticker.stop(self.options.join_timeout).await;
        }

        self.session_client.close();
        if let Some(server) = take(&self.control_server) {
            server.stop(self.options.join_timeout).await;
        }

        if exit_code == 0 {
            info!(session_id = %self.session_id, "application stopped");
        } else {
            warn!(session_id = %self.session_id, exit_code, "application exited with non-zero status");
        }
        exit_code
    }

    async fn shutdown_child(&self, trigger: StopTrigger) {
        if trigger == StopTrigger::ChildExited {
            self.child_client.close();
            return;
        }
        if self.child_client.is_shutdown() {
            return;
        }

        match self.child_client.send_shutdown().await {
            Ok(()) => {}
            Err(err) if err.is_recoverable() => {
                if tracing::enabled!(Level::DEBUG) {
                    debug!(%err, "cannot connect to application control socket to initiate shutdown");
                } else {
                    info!("cannot connect to application control socket to initiate shutdown");
                }
            }
            Err(err) => {
                warn!(%err, "failed to send shutdown to application");
                self.state.record_error(err.to_string());
            }
        }
    }

    async fn collect_exit_code(&self) -> i32 {
        let mut rx = self.exit_rx.clone();
        let waited = tokio::time::timeout(self.options.exit_grace, async move {
            rx.wait_for(Option::is_some).await.map(|code| *code)
        })
        .await;

        match waited {
            Ok(Ok(code)) => {
                if let Some(watcher) = take(&self.exit_watcher) {
                    let _ = watcher.await;
                }
                code.unwrap_or(UNKNOWN_EXIT_CODE)
            }
            Ok(Err(_closed)) => {
                warn!("exit watcher ended without reporting an exit code");
                self.state.record_error("exit code unavailable");
                UNKNOWN_EXIT_CODE
            }
            Err(_elapsed) => {
                warn!(
                    pid = self.pid,
                    grace = ?self.options.exit_grace,
                    "application did not exit within the grace period; leaving it running"
                );
                self.state.record_error("application did not exit within the grace period");
                UNKNOWN_EXIT_CODE
            }
        }
    }

    async fn wait_for_child_exit(&self) {
        let mut rx = self.exit_rx.clone();
        // A closed channel also means the watcher is gone.
        let _ = rx.wait_for(Option::is_some).await;
    }
}

impl Service for Supervisor {
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.state.request_stop(StopTrigger::RemoteCommand);
            Ok(())
        })
    }

    fn is_shutdown(&self) -> bool {
        self.state.is_stopped()
    }
}

/// Handlers served on the session's control socket.
fn session_commands(
    session_id: &str,
    state: &Arc<SessionState>,
    pid: &Arc<OnceLock<u32>>,
    child_endpoint: &ControlEndpoint,
) -> CommandRegistry {
    let shutdown_state = Arc::clone(state);
    let status_state = Arc::clone(state);
    let status_pid = Arc::clone(pid);
    let session_id = session_id.to_owned();
    let child_endpoint = child_endpoint.to_string();

    CommandRegistry::new()
        .with_handler(SHUTDOWN_COMMAND, move || {
            info!("session shutdown requested over control socket");
            shutdown_state.request_stop(StopTrigger::RemoteCommand);
            ACK_REPLY.to_owned()
        })
        .with_handler(STATUS_COMMAND, move || {
            let report = StatusReport {
                session_id: session_id.clone(),
                phase: status_state.phase(),
                pid: status_pid.get().copied(),
                started_at: status_state.started_at(),
                child_endpoint: child_endpoint.clone(),
            };
            serde_json::to_string(&report)
                .unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.to_owned())
        })
}

/// Resolve once the operator enters `keyword` on a line by itself.
///
/// Lines are decoded lossily, so stray bytes never disarm the keyword.
/// Never resolves when there is no input or the input reaches EOF.
async fn wait_for_keyword<R>(input: Option<R>, keyword: &str)
where
    R: AsyncBufRead + Unpin,
{
    let Some(mut input) = input else {
        return std::future::pending().await;
    };

    let mut buf = Vec::new();
    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("operator input closed");
                return std::future::pending().await;
            }
            Ok(_) if String::from_utf8_lossy(&buf).trim() == keyword => return,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "failed to read operator input");
                return std::future::pending().await;
            }
        }
    }
}
