//! Watch capabilities and the startup sync barrier.
//!
//! Workers must not run against a cold cache. [`start_informers`] and
//! [`run_informers`] start every informer on its own thread and return once
//! all of them report an initial full listing, or the stop signal fires.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::EngineError;
use crate::runtime::StopSignal;

/// How often [`wait_for_cache_sync`] re-checks `has_synced`.
pub const CACHE_SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A watch stream that fills a local cache.
pub trait Informer: Send + Sync + 'static {
    /// Run until `stop` fires.
    fn run(&self, stop: StopSignal);
    /// Whether the initial listing has been delivered.
    fn has_synced(&self) -> bool;
}

/// Read access to a cache of watched objects.
pub trait Store<O>: Send + Sync {
    /// Snapshot of every cached object.
    fn list(&self) -> Vec<O>;
}

impl<O, S> Store<O> for Arc<S>
where
    S: Store<O> + ?Sized,
{
    fn list(&self) -> Vec<O> {
        (**self).list()
    }
}

/// Poll `has_synced` until it reports true (returns true) or `stop` fires
/// first (returns false).
pub fn wait_for_cache_sync<F>(stop: &StopSignal, has_synced: F) -> bool
where
    F: Fn() -> bool,
{
    loop {
        if has_synced() {
            return true;
        }
        if stop.wait_timeout(CACHE_SYNC_POLL_INTERVAL) {
            return false;
        }
    }
}

fn spawn_informer(
    index: usize,
    informer: &Arc<dyn Informer>,
    stop: &StopSignal,
) -> Result<JoinHandle<()>, EngineError> {
    let name = format!("informer-{index}");
    let informer = Arc::clone(informer);
    let stop = stop.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            debug!(index, "informer started");
            informer.run(stop);
            debug!(index, "informer stopped");
        })
        .map_err(|source| EngineError::Spawn { name, source })
}

fn wait_all_synced(stop: &StopSignal, informers: &[Arc<dyn Informer>]) -> Result<(), EngineError> {
    for (index, informer) in informers.iter().enumerate() {
        if !wait_for_cache_sync(stop, || informer.has_synced()) {
            warn!(index, "stopped before informer synced");
            return Err(EngineError::CacheSyncFailed { index });
        }
    }
    Ok(())
}

/// Start every informer and block until all have synced.
///
/// Informer threads are detached; they exit when `stop` fires.
///
/// # Errors
///
/// `EngineError::CacheSyncFailed` naming the first informer still unsynced
/// when `stop` fired, or `EngineError::Spawn`.
pub fn start_informers(
    stop: &StopSignal,
    informers: &[Arc<dyn Informer>],
) -> Result<(), EngineError> {
    for (index, informer) in informers.iter().enumerate() {
        spawn_informer(index, informer, stop)?;
    }
    wait_all_synced(stop, informers)
}

/// Joins the threads started by [`run_informers`].
#[derive(Debug)]
#[must_use = "dropping the handle detaches the informer threads"]
pub struct InformersHandle {
    threads: Vec<JoinHandle<()>>,
}

impl InformersHandle {
    /// Block until every informer has returned from `run`.
    pub fn wait(self) {
        for (index, thread) in self.threads.into_iter().enumerate() {
            if thread.join().is_err() {
                warn!(index, "informer panicked");
            }
        }
    }
}

/// Like [`start_informers`], but also returns a handle that waits for the
/// informers to terminate. The handle is returned whether or not the sync
/// barrier succeeded.
pub fn run_informers(
    stop: &StopSignal,
    informers: &[Arc<dyn Informer>],
) -> (InformersHandle, Result<(), EngineError>) {
    let mut handle = InformersHandle {
        threads: Vec::with_capacity(informers.len()),
    };
    for (index, informer) in informers.iter().enumerate() {
        match spawn_informer(index, informer, stop) {
            Ok(thread) => handle.threads.push(thread),
            Err(e) => return (handle, Err(e)),
        }
    }
    let synced = wait_all_synced(stop, informers);
    (handle, synced)
}
