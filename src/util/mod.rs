//! Shared utilities.

pub mod jitter;
pub mod telemetry;

pub use jitter::{jitter, spread};
pub use telemetry::init_tracing;
