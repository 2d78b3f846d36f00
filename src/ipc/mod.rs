//! Control channel between operators, the supervising session, and the
//! child application.
//!
//! A client opens a short-lived TCP connection, writes one command token
//! terminated by `\n`, reads one reply line, and closes.
//!
//! ## Protocol
//!
//! Request:
//! ```text
//! shutdown
//! status
//! ```
//!
//! Response (one line):
//! ```text
//! ok
//! {"session_id":"…","phase":"running","pid":4242,…}
//! unknown
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::Result;

pub mod client;
pub mod server;

/// Command asking the receiver to shut down gracefully.
pub const SHUTDOWN_COMMAND: &str = "shutdown";

/// Read-only command asking the receiver to describe itself.
pub const STATUS_COMMAND: &str = "status";

/// Reply sent when a command was accepted.
pub const ACK_REPLY: &str = "ok";

/// Reply sent for commands with no registered handler.
pub const UNKNOWN_REPLY: &str = "unknown";

/// Socket address of a control endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlEndpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port; 0 lets a server pick an ephemeral port.
    pub port: u16,
}

impl ControlEndpoint {
    /// Construct an endpoint from host and port.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Loopback endpoint on the given port.
    #[must_use]
    pub fn loopback(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }
}

impl Display for ControlEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Anything that can be asked to shut down and report whether it has.
///
/// Implemented by the session supervisor and by the control client that
/// proxies the child application.
pub trait Service: Send + Sync {
    /// Request a graceful shutdown.
    ///
    /// # Errors
    ///
    /// Implementation specific; control proxies return
    /// `AppError::ControlConnection` when the target is already gone.
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Whether shutdown has already completed or been handed off.
    fn is_shutdown(&self) -> bool;
}
