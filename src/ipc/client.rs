//! Control socket client.
//!
//! Connects to a [`ControlEndpoint`], sends one command token, and reads the
//! reply line. Connection failures surface as
//! [`AppError::ControlConnection`] so callers can treat "nothing is
//! listening" as the expected outcome when the target has already exited.

use std::future::Future;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{ControlEndpoint, Service, ACK_REPLY, SHUTDOWN_COMMAND, STATUS_COMMAND, UNKNOWN_REPLY};
use crate::{AppError, Result};

/// Upper bound on waiting for the reply line once connected.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of a control endpoint.
///
/// Keeps purely local state about whether a shutdown handshake has already
/// succeeded, so redundant triggers do not send the command twice.
#[derive(Debug)]
pub struct ControlClient {
    endpoint: ControlEndpoint,
    connect_timeout: Duration,
    shutdown: AtomicBool,
    closed: AtomicBool,
}

impl ControlClient {
    /// Create a client for `endpoint`. No connection is made yet.
    #[must_use]
    pub fn new(endpoint: ControlEndpoint, connect_timeout: Duration) -> Self {
        Self {
            endpoint,
            connect_timeout,
            shutdown: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// The endpoint this client addresses.
    #[must_use]
    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    /// Send the shutdown command and record the handshake on success.
    ///
    /// # Errors
    ///
    /// - `AppError::ControlConnection` — the target is unreachable, refused
    ///   the connection, or did not accept it within the connect timeout.
    /// - `AppError::Ipc` — the exchange failed after connecting, or the
    ///   target does not understand the command.
    pub async fn send_shutdown(&self) -> Result<()> {
        let reply = self.send_command(SHUTDOWN_COMMAND).await?;
        if reply == UNKNOWN_REPLY {
            return Err(AppError::Ipc(format!(
                "{} does not accept the {SHUTDOWN_COMMAND} command",
                self.endpoint
            )));
        }
        if !reply.is_empty() && reply != ACK_REPLY {
            debug!(endpoint = %self.endpoint, reply, "unexpected shutdown reply; treating as acknowledged");
        }

        self.shutdown.store(true, Ordering::SeqCst);
        info!(endpoint = %self.endpoint, "shutdown command delivered");
        Ok(())
    }

    /// Ask the target to describe itself; returns the raw reply line.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`send_shutdown`](Self::send_shutdown).
    pub async fn query_status(&self) -> Result<String> {
        let reply = self.send_command(STATUS_COMMAND).await?;
        if reply == UNKNOWN_REPLY {
            return Err(AppError::Ipc(format!(
                "{} does not accept the {STATUS_COMMAND} command",
                self.endpoint
            )));
        }
        Ok(reply)
    }

    /// Whether a shutdown handshake succeeded or the client was closed.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst)
    }

    /// Mark the client closed so later triggers skip the network call.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Connect, write `command`, and read one reply line.
    ///
    /// An empty string is returned when the peer closes without replying.
    async fn send_command(&self, command: &str) -> Result<String> {
        let address = (self.endpoint.host.as_str(), self.endpoint.port);
        let mut stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) if is_connect_failure(&err) => {
                return Err(AppError::ControlConnection(format!(
                    "cannot connect to {}: {err}",
                    self.endpoint
                )));
            }
            Ok(Err(err)) => {
                return Err(AppError::Ipc(format!(
                    "failed to open control connection to {}: {err}",
                    self.endpoint
                )));
            }
            Err(_elapsed) => {
                return Err(AppError::ControlConnection(format!(
                    "connect to {} timed out after {:?}",
                    self.endpoint, self.connect_timeout
                )));
            }
        };

        let mut request_line = command.to_owned();
        request_line.push('\n');
        stream
            .write_all(request_line.as_bytes())
            .await
            .map_err(|err| AppError::Ipc(format!("failed to send '{command}': {err}")))?;
        stream
            .flush()
            .await
            .map_err(|err| AppError::Ipc(format!("failed to send '{command}': {err}")))?;

        let mut reader = BufReader::new(stream);
        let mut reply_line = String::new();
        match tokio::time::timeout(REPLY_TIMEOUT, reader.read_line(&mut reply_line)).await {
            Ok(Ok(_)) => Ok(reply_line.trim().to_owned()),
            // The peer may close right after acting on the command.
            Ok(Err(err)) if err.kind() == ErrorKind::ConnectionReset => Ok(String::new()),
            Ok(Err(err)) => Err(AppError::Ipc(format!("failed to read reply to '{command}': {err}"))),
            Err(_elapsed) => Err(AppError::Ipc(format!(
                "no reply to '{command}' from {} within {REPLY_TIMEOUT:?}",
                self.endpoint
            ))),
        }
    }
}

impl Service for ControlClient {
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.send_shutdown())
    }

    fn is_shutdown(&self) -> bool {
        ControlClient::is_shutdown(self)
    }
}

fn is_connect_failure(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::AddrNotAvailable
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::TimedOut
    )
}
