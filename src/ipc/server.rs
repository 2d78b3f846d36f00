//! Control socket server.
//!
//! Listens on a TCP endpoint and accepts line-delimited command tokens.
//! Each recognized token is dispatched synchronously to the handler
//! registered for it; the handler's return value is written back as the
//! reply line. Unrecognized tokens are logged, answered with
//! [`UNKNOWN_REPLY`], and never dispatched.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::{ControlEndpoint, UNKNOWN_REPLY};
use crate::util::join_bounded;
use crate::{AppError, Result};

/// Idle limit for a connected client that never sends its command.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Handler invoked for a control command; returns the reply line.
pub type CommandHandler = Arc<dyn Fn() -> String + Send + Sync>;

/// Mapping of command names to their handlers.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, CommandHandler>,
}

impl Debug for CommandRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}

impl CommandRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous handler.
    #[must_use]
    pub fn with_handler<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.handlers.insert(name.to_owned(), Arc::new(handler));
        self
    }

    /// Run the handler registered for `command`, if any.
    #[must_use]
    pub fn dispatch(&self, command: &str) -> Option<String> {
        self.handlers.get(command).map(|handler| handler())
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A running control server. Dropping it cancels the accept loop.
pub struct ControlServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ControlServer {
    /// Address the listener is actually bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the accept loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Close the listener and wait up to `timeout` for the accept loop.
    pub async fn stop(mut self, timeout: Duration) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            join_bounded(handle, timeout, "control_server").await;
        }
    }
}

/// Bind the control socket and spawn its accept loop.
///
/// The loop runs until `ct` (or the returned server's own token) is
/// cancelled. Binding to port 0 picks an ephemeral port; see
/// [`ControlServer::local_addr`].
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be bound.
pub async fn spawn_control_server(
    endpoint: &ControlEndpoint,
    registry: CommandRegistry,
    ct: CancellationToken,
) -> Result<ControlServer> {
    let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|err| AppError::Ipc(format!("failed to bind control socket {endpoint}: {err}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|err| AppError::Ipc(format!("failed to read control socket address: {err}")))?;

    info!(%local_addr, commands = ?registry.commands(), "control server listening");

    let cancel = ct.child_token();
    let loop_cancel = cancel.clone();
    let registry = Arc::new(registry);

    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = loop_cancel.cancelled() => {
                        info!("control server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer)) => {
                                let registry = Arc::clone(&registry);
                                tokio::spawn(handle_connection(stream, peer, registry));
                            }
                            Err(err) => {
                                warn!(%err, "control accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(info_span!("control_server", %local_addr)),
    );

    Ok(ControlServer {
        local_addr,
        cancel,
        join_handle: Some(handle),
    })
}

/// Handle a single control client connection.
async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Arc<CommandRegistry>) {
    let span = info_span!("control_conn", %peer);
    async move {
        let (reader, mut writer) = stream.into_split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match tokio::time::timeout(READ_TIMEOUT, buf_reader.read_line(&mut line)).await {
                Ok(Ok(0)) => break, // EOF
                Ok(Ok(_)) => {
                    let command = line.trim();
                    if command.is_empty() {
                        continue;
                    }

                    let reply = if let Some(reply) = registry.dispatch(command) {
                        info!(command, "control command dispatched");
                        reply
                    } else {
                        warn!(command, "ignoring unknown control command");
                        UNKNOWN_REPLY.to_owned()
                    };

                    let mut reply_line = reply;
                    reply_line.push('\n');
                    if let Err(err) = writer.write_all(reply_line.as_bytes()).await {
                        debug!(%err, "failed to write control reply");
                        break;
                    }
                }
                Ok(Err(err)) => {
                    warn!(%err, "control read error");
                    break;
                }
                Err(_elapsed) => {
                    debug!("control client idle; closing connection");
                    break;
                }
            }
        }
    }
    .instrument(span)
    .await;
}
