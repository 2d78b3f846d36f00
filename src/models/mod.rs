//! Domain models for launch and session state.

pub mod launch;
pub mod session;
