//! Child process orchestration.
//!
//! Covers launch command assembly, output relaying, the operator reminder,
//! and the session supervisor that coordinates shutdown.

pub mod relay;
pub mod reminder;
pub mod spawner;
pub mod supervisor;
