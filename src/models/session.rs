//! Session lifecycle state shared between trigger tasks and the thread
//! waiting for the final exit code.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Exit code reported when the child's real status cannot be determined.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Re-check interval while waiting on the state notification.
const WAIT_POLL: Duration = Duration::from_secs(5);

/// Lifecycle phase of a supervised session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Child launch and control server bind in progress.
    Starting,
    /// Child running; triggers armed.
    Running,
    /// Stop sequence executing.
    Stopping,
    /// Stop sequence complete; exit code published.
    Stopped,
}

/// What caused the session to leave `Running`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopTrigger {
    /// Operator typed the stop keyword.
    OperatorKeyword,
    /// `shutdown` received on the session's control socket.
    RemoteCommand,
    /// The supervisor process itself is being terminated.
    ExitHook,
    /// The child exited without being asked to.
    ChildExited,
}

#[derive(Debug)]
struct Inner {
    phase: LifecyclePhase,
    should_stop: bool,
    requested_by: Option<StopTrigger>,
    stopped_by: Option<StopTrigger>,
    stopped: bool,
    exit_code: i32,
    last_error: Option<String>,
    stop_sequence_runs: u32,
}

/// Single shared session state guarded by one mutex, with a notification
/// used as the condition variable.
///
/// Once `stopped` becomes true it never reverts, and the exit code is only
/// meaningful from that point on.
#[derive(Debug)]
pub struct SessionState {
    inner: Mutex<Inner>,
    changed: Notify,
    started_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Create a state in the `Starting` phase.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: LifecyclePhase::Starting,
                should_stop: false,
                requested_by: None,
                stopped_by: None,
                stopped: false,
                exit_code: UNKNOWN_EXIT_CODE,
                last_error: None,
                stop_sequence_runs: 0,
            }),
            changed: Notify::new(),
            started_at: Utc::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// When the session was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.lock().phase
    }

    /// Move `Starting` to `Running`; a no-op once a stop has begun.
    pub fn mark_running(&self) {
        let mut inner = self.lock();
        if inner.phase != LifecyclePhase::Starting {
            return;
        }
        inner.phase = LifecyclePhase::Running;
        drop(inner);
        self.changed.notify_waiters();
    }

    /// Ask the session to stop. The first request's trigger is kept.
    ///
    /// This only raises the flag; the driver task runs the stop sequence.
    pub fn request_stop(&self, trigger: StopTrigger) {
        let mut inner = self.lock();
        if !inner.should_stop {
            inner.should_stop = true;
            inner.requested_by = Some(trigger);
        }
        drop(inner);
        self.changed.notify_waiters();
    }

    /// Whether a stop has been requested or begun.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.lock().should_stop
    }

    /// Trigger of the first stop request, if any.
    #[must_use]
    pub fn requested_by(&self) -> Option<StopTrigger> {
        self.lock().requested_by
    }

    /// Atomically claim the stop sequence.
    ///
    /// Exactly one caller per session receives `true`; everyone else must
    /// wait for the published result instead of running the sequence.
    #[must_use]
    pub fn begin_stopping(&self, trigger: StopTrigger) -> bool {
        let mut inner = self.lock();
        if matches!(inner.phase, LifecyclePhase::Stopping | LifecyclePhase::Stopped) {
            return false;
        }
        inner.phase = LifecyclePhase::Stopping;
        inner.should_stop = true;
        inner.requested_by.get_or_insert(trigger);
        inner.stopped_by = Some(trigger);
        inner.stop_sequence_runs += 1;
        drop(inner);
        self.changed.notify_waiters();
        true
    }

    /// Trigger that won the race into `Stopping`.
    #[must_use]
    pub fn stopped_by(&self) -> Option<StopTrigger> {
        self.lock().stopped_by
    }

    /// Number of times the stop sequence was claimed (0 or 1).
    #[must_use]
    pub fn stop_sequence_runs(&self) -> u32 {
        self.lock().stop_sequence_runs
    }

    /// Remember a non-fatal failure observed during the stop sequence.
    pub fn record_error(&self, message: impl Into<String>) {
        self.lock().last_error = Some(message.into());
    }

    /// Most recent failure recorded during the stop sequence.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// Publish the final exit code and wake every waiter.
    ///
    /// Ignored if the session was already stopped.
    pub fn publish(&self, exit_code: i32) {
        let mut inner = self.lock();
        if inner.stopped {
            return;
        }
        inner.exit_code = exit_code;
        inner.stopped = true;
        inner.phase = LifecyclePhase::Stopped;
        drop(inner);
        self.changed.notify_waiters();
    }

    /// Whether the exit code has been published.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Published exit code, if the session has stopped.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        let inner = self.lock();
        inner.stopped.then_some(inner.exit_code)
    }

    /// Wait until a stop is requested.
    pub async fn wait_for_stop_request(&self) {
        self.wait_until(|inner| inner.should_stop).await;
    }

    /// Wait until the session has stopped and return the exit code.
    pub async fn await_result(&self) -> i32 {
        self.wait_until(|inner| inner.stopped).await;
        self.lock().exit_code
    }

    async fn wait_until(&self, condition: impl Fn(&Inner) -> bool) {
        loop {
            let notified = self.changed.notified();
            if condition(&*self.lock()) {
                return;
            }
            // The periodic timeout keeps the wait interruptible even if a
            // notification is missed.
            let _ = tokio::time::timeout(WAIT_POLL, notified).await;
        }
    }
}

/// Status reply served on the session's control socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    /// Session identifier.
    pub session_id: String,
    /// Lifecycle phase at the time of the query.
    pub phase: LifecyclePhase,
    /// Child process id, if known.
    pub pid: Option<u32>,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Control endpoint of the supervised application.
    pub child_endpoint: String,
}
