//! Error types for the reconciliation engine.

use thiserror::Error;

/// Outcome of a failed reconciliation.
///
/// The variant decides what the worker does with the key: a permanent failure is
/// dropped and its backoff history reset, a transient one is requeued with backoff.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Cannot succeed without external intervention. Never retried.
    #[error(transparent)]
    Permanent(anyhow::Error),
    /// Anything else. Retried with increasing backoff.
    #[error(transparent)]
    Transient(anyhow::Error),
}

impl ReconcileError {
    /// Wrap an error so that the key is not requeued.
    pub fn permanent<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Permanent(err.into())
    }

    /// Wrap an error so that the key is requeued with backoff.
    pub fn transient<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Transient(err.into())
    }

    /// Returns true for [`ReconcileError::Permanent`].
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// Borrow the wrapped error.
    #[must_use]
    pub const fn inner(&self) -> &anyhow::Error {
        match self {
            Self::Permanent(e) | Self::Transient(e) => e,
        }
    }
}

/// Plain errors are transient unless explicitly wrapped.
impl From<anyhow::Error> for ReconcileError {
    fn from(err: anyhow::Error) -> Self {
        Self::Transient(err)
    }
}

/// Returns true if the error was wrapped with [`ReconcileError::permanent`].
#[must_use]
pub const fn is_permanent_error(err: &ReconcileError) -> bool {
    err.is_permanent()
}

/// Errors produced by the engine itself (as opposed to the reconciler).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The stop signal fired before an informer reported synced.
    #[error("failed to wait for cache at index {index} to sync")]
    CacheSyncFailed {
        /// Position of the informer in the list passed by the caller.
        index: usize,
    },
    /// An OS thread could not be spawned.
    #[error("failed to spawn thread `{name}`: {source}")]
    Spawn {
        /// Thread name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A worker could not build its async runtime.
    #[error("worker {worker_id} failed to build its runtime: {source}")]
    Runtime {
        /// Index of the worker.
        worker_id: usize,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A worker thread terminated by panicking outside a reconcile call.
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}
