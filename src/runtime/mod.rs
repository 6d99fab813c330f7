//! Process-level run control.

pub mod stop;

pub use stop::{stop_channel, StopHandle, StopSignal};
