//! Periodic reminder of how to stop a blocking session.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::config::ReminderConfig;
use crate::util::join_bounded;

/// When and how often the reminder is printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSchedule {
    /// Delay before the first reminder.
    pub initial_delay: Duration,
    /// Pause between reminders.
    pub interval: Duration,
    /// Total number of reminders.
    pub count: u32,
    /// Keyword the operator should type.
    pub keyword: String,
}

impl From<&ReminderConfig> for ReminderSchedule {
    fn from(config: &ReminderConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            interval: Duration::from_secs(config.interval_seconds),
            count: config.count,
            keyword: config.keyword.clone(),
        }
    }
}

/// Render the reminder line for `keyword`.
#[must_use]
pub fn reminder_message(keyword: &str) -> String {
    format!("REMINDER: Type '{keyword}' on a line by itself to shutdown this application")
}

/// Handle to a running reminder task. Dropping it cancels the task.
pub struct ReminderTicker {
    cancel: CancellationToken,
    ticks: Arc<AtomicU32>,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for ReminderTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ReminderTicker {
    /// Start the reminder task.
    #[must_use]
    pub fn spawn(schedule: ReminderSchedule) -> Self {
        let cancel = CancellationToken::new();
        let ticks = Arc::new(AtomicU32::new(0));

        let task = run(schedule, cancel.clone(), Arc::clone(&ticks))
            .instrument(info_span!("reminder"));

        Self {
            cancel,
            ticks,
            join_handle: Some(tokio::spawn(task)),
        }
    }

    /// Reminders printed so far.
    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Shared counter behind [`ticks`](Self::ticks); outlives the handle.
    #[must_use]
    pub fn tick_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.ticks)
    }

    /// Token that stops the ticker when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the ticker and wait at most `grace` for it to exit.
    pub async fn stop(mut self, grace: Duration) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            join_bounded(handle, grace, "reminder").await;
        }
    }
}

async fn run(schedule: ReminderSchedule, cancel: CancellationToken, ticks: Arc<AtomicU32>) {
    let mut delay = schedule.initial_delay;
    for _ in 0..schedule.count {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("reminder cancelled");
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }
        info!("{}", reminder_message(&schedule.keyword));
        ticks.fetch_add(1, Ordering::SeqCst);
        delay = schedule.interval;
    }
}
