//! In-process informer over an [`InMemoryStore`].
//!
//! Producers mutate the store through the informer, which records a delta
//! on a channel. `run` first delivers the store's contents as adds, flags
//! itself synced, then dispatches deltas to every registered handler until
//! stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::core::handlers::ResourceEventHandler;
use crate::core::informer::{Informer, Store};
use crate::core::key::ResourceKey;
use crate::core::object::{ObjectMeta, Observed};
use crate::infra::store::memory::InMemoryStore;
use crate::runtime::StopSignal;

enum Delta<O> {
    Added(O),
    Updated { old: O, new: O },
    Deleted(Observed<O>),
}

/// Informer whose source of truth is an in-memory store.
pub struct InMemoryInformer<O> {
    store: Arc<InMemoryStore<O>>,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler<O>>>>,
    deltas_tx: Sender<Delta<O>>,
    deltas_rx: Receiver<Delta<O>>,
    synced: AtomicBool,
}

impl<O> InMemoryInformer<O>
where
    O: ObjectMeta + Clone + Send + Sync + 'static,
{
    /// Informer over an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    /// Informer over an existing store.
    #[must_use]
    pub fn with_store(store: Arc<InMemoryStore<O>>) -> Self {
        let (deltas_tx, deltas_rx) = unbounded();
        Self {
            store,
            handlers: RwLock::new(Vec::new()),
            deltas_tx,
            deltas_rx,
            synced: AtomicBool::new(false),
        }
    }

    /// The backing store, e.g. for a global resync.
    #[must_use]
    pub fn store(&self) -> Arc<InMemoryStore<O>> {
        Arc::clone(&self.store)
    }

    /// Register a handler. Handlers added after `run` started miss the
    /// initial listing.
    pub fn add_event_handler(&self, handler: impl ResourceEventHandler<O> + 'static) {
        self.handlers.write().push(Arc::new(handler));
    }

    /// Insert or replace an object and notify handlers.
    pub fn apply(&self, obj: O) {
        let delta = match self.store.upsert(obj.clone()) {
            Some(old) => Delta::Updated { old, new: obj },
            None => Delta::Added(obj),
        };
        self.publish(delta);
    }

    /// Remove an object and notify handlers. No-op if absent.
    pub fn delete(&self, key: &ResourceKey) {
        if let Some(obj) = self.store.remove(key) {
            self.publish(Delta::Deleted(Observed::Live(obj)));
        }
    }

    /// Remove an object whose deletion was missed, notifying handlers with a
    /// tombstone carrying its last known state.
    pub fn delete_final_state_unknown(&self, key: &ResourceKey) {
        if let Some(obj) = self.store.remove(key) {
            self.publish(Delta::Deleted(Observed::tombstone(key.to_string(), obj)));
        }
    }

    fn publish(&self, delta: Delta<O>) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.deltas_tx.send(delta);
    }

    fn dispatch(&self, delta: &Delta<O>) {
        let handlers = self.handlers.read();
        match delta {
            Delta::Added(obj) => {
                let obj = Observed::Live(obj.clone());
                handlers.iter().for_each(|h| h.on_add(&obj));
            }
            Delta::Updated { old, new } => {
                let old = Observed::Live(old.clone());
                let new = Observed::Live(new.clone());
                handlers.iter().for_each(|h| h.on_update(&old, &new));
            }
            Delta::Deleted(obj) => handlers.iter().for_each(|h| h.on_delete(obj)),
        }
    }
}

impl<O> Default for InMemoryInformer<O>
where
    O: ObjectMeta + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Informer for InMemoryInformer<O>
where
    O: ObjectMeta + Clone + Send + Sync + 'static,
{
    fn run(&self, stop: StopSignal) {
        // The listing below already reflects anything published so far.
        while self.deltas_rx.try_recv().is_ok() {}
        let initial = self.store.list();
        debug!(objects = initial.len(), "informer delivering initial listing");
        for obj in initial {
            self.dispatch(&Delta::Added(obj));
        }
        self.synced.store(true, Ordering::Release);

        loop {
            select! {
                recv(self.deltas_rx) -> delta => match delta {
                    Ok(delta) => self.dispatch(&delta),
                    Err(_) => break,
                },
                recv(stop.receiver()) -> _ => break,
            }
        }
        trace!("informer loop exited");
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}
