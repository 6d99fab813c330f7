//! Configuration models for controllers and backoff.

pub mod controller;

pub use controller::{ControllerConfig, RateLimiterConfig, MAX_BACKOFF_DELAY_SECS};
