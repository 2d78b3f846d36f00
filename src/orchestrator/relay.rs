//! Stream relay: pumps the child's stdout and stderr into a line sink.
//!
//! Each stream gets its own task. A pump ends when its stream reaches EOF
//! or when the relay is stopped; stopping waits a bounded time for pumps to
//! finish and abandons any that do not.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::util::join_bounded;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl Display for StreamKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Destination for relayed lines.
pub trait LineSink: Send + Sync {
    /// Consume one line (without its terminator).
    fn consume_line(&self, stream: StreamKind, line: &str);
}

/// Sink that logs every line at `info` under the `child` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn consume_line(&self, stream: StreamKind, line: &str) {
        info!(target: "child", %stream, "{line}");
    }
}

/// Running pumps for one child.
pub struct StreamRelay {
    cancel: CancellationToken,
    pumps: Vec<JoinHandle<()>>,
    drain_timeout: Duration,
}

impl Drop for StreamRelay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl StreamRelay {
    /// Start a pump for each stream that is present.
    pub fn start<O, E>(
        stdout: Option<O>,
        stderr: Option<E>,
        sink: Arc<dyn LineSink>,
        drain_timeout: Duration,
    ) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let mut pumps = Vec::with_capacity(2);

        if let Some(out) = stdout {
            pumps.push(tokio::spawn(pump(
                StreamKind::Stdout,
                out,
                Arc::clone(&sink),
                cancel.clone(),
            )));
        }
        if let Some(err) = stderr {
            pumps.push(tokio::spawn(pump(
                StreamKind::Stderr,
                err,
                Arc::clone(&sink),
                cancel.clone(),
            )));
        }

        Self {
            cancel,
            pumps,
            drain_timeout,
        }
    }

    /// Whether every pump has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.pumps.iter().all(JoinHandle::is_finished)
    }

    /// Signal both pumps to close and wait up to the drain timeout.
    ///
    /// Once this returns no pump delivers further lines. Returns `true` when
    /// every pump finished in time.
    pub async fn stop(mut self) -> bool {
        self.cancel.cancel();
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        let mut all_joined = true;
        for handle in std::mem::take(&mut self.pumps) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            all_joined &= join_bounded(handle, remaining, "stream_pump").await;
        }
        all_joined
    }

    /// Let the pumps run to end of input, bounded by the drain timeout,
    /// then close whatever is left.
    ///
    /// Used once the child has exited, when EOF is imminent. Returns `true`
    /// when every pump reached EOF in time.
    pub async fn drain(mut self) -> bool {
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        let mut all_joined = true;
        for handle in std::mem::take(&mut self.pumps) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            all_joined &= join_bounded(handle, remaining, "stream_pump").await;
        }
        self.cancel.cancel();
        all_joined
    }
}

async fn pump<R>(kind: StreamKind, stream: R, sink: Arc<dyn LineSink>, cancel: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(stream = %kind, "pump closed");
                return;
            }
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!(stream = %kind, "child stream reached end of input");
                return;
            }
            Ok(_) => {
                if cancel.is_cancelled() {
                    return;
                }
                let line = String::from_utf8_lossy(&buf);
                sink.consume_line(kind, line.trim_end_matches(['\n', '\r']));
            }
            Err(err) => {
                warn!(stream = %kind, %err, "failed reading child stream");
                return;
            }
        }
    }
}
