//! Stop signalling for workers and informers.
//!
//! A stop signal is a `crossbeam_channel` receiver nobody ever sends on. It
//! fires when the matching [`StopHandle`] is stopped or dropped, which
//! disconnects the channel and unblocks every clone at once.

use std::time::Duration;

use crossbeam_channel::{bounded, never, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Owning side of a stop signal. Stopping or dropping it fires the signal.
#[derive(Debug)]
pub struct StopHandle {
    _tx: Sender<()>,
}

impl StopHandle {
    /// Fire the stop signal.
    pub fn stop(self) {
        drop(self);
    }
}

/// Receiving side of a stop signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
}

/// Create a connected stop handle and signal.
#[must_use]
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = bounded(0);
    (StopHandle { _tx: tx }, StopSignal { rx })
}

impl StopSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        Self { rx: never() }
    }

    /// Block until the signal fires.
    pub fn wait(&self) {
        while self.rx.recv().is_ok() {}
    }

    /// Block until the signal fires or `timeout` elapses. Returns true if it fired.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// The underlying receiver, for use in `crossbeam_channel::select!`.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
