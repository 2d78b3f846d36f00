//! Small task helpers shared by the background components.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

/// Wait up to `timeout` for a background task to finish.
///
/// A task still running when the timeout elapses is aborted and abandoned.
/// Returns `true` when the task finished on its own.
pub async fn join_bounded(handle: JoinHandle<()>, timeout: Duration, task: &str) -> bool {
    let abort = handle.abort_handle();
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            if !err.is_cancelled() {
                warn!(task, %err, "background task ended abnormally");
            }
            true
        }
        Err(_elapsed) => {
            warn!(task, ?timeout, "background task did not finish in time; abandoning it");
            abort.abort();
            false
        }
    }
}
