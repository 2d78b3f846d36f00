#![forbid(unsafe_code)]

//! `appbooter` — launches an embedded application container as a child
//! process, relays its output, and coordinates graceful shutdown over a
//! loopback control socket.

pub mod booter;
pub mod config;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod orchestrator;
pub mod platform;
pub mod util;

pub use config::BooterConfig;
pub use errors::{AppError, Result};
