//! The controller: feeds keys from a rate-limited work queue to a
//! [`Reconciler`] on a fixed pool of worker threads.
//!
//! ```text
//! watch events -> enqueue_* -> WorkQueue -> workers -> Reconciler
//!                                  ^                      |
//!                                  +-- add_rate_limited --+ (transient error)
//! ```
//!
//! Each worker is a dedicated OS thread with its own single-threaded tokio
//! runtime, so reconcilers may be async without blocking the caller's runtime.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::core::context::{ContextConfig, ReconcileContext};
use crate::core::informer::Store;
use crate::core::key::ResourceKey;
use crate::core::object::ObjectMeta;
use crate::core::{EngineError, ReconcileError, Reconciler};
use crate::infra::queue::{default_controller_rate_limiter, RateLimiter, WorkQueue};
use crate::runtime::StopSignal;
use crate::util::{jitter, spread};

/// Worker count used by [`start_all`](crate::builders::start_all).
pub const DEFAULT_THREADS_PER_CONTROLLER: usize = 2;

/// Per-item spread of a global resync.
pub const DEFAULT_RESYNC_JITTER_BASE: Duration = Duration::from_secs(1);

/// How often a stopping controller checks whether its queue has drained.
pub const DEFAULT_DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Calls `done` for the checked-out key however processing ends.
struct DoneGuard<'a> {
    queue: &'a WorkQueue<ResourceKey>,
    key: &'a ResourceKey,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Drives reconciliation for one resource type.
///
/// Cloning is cheap; clones share the reconciler and the work queue.
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    work_queue: Arc<WorkQueue<ResourceKey>>,
    context: ContextConfig,
    resync_jitter_base: Duration,
    drain_poll_interval: Duration,
}

impl<R: Reconciler> Clone for Controller<R> {
    fn clone(&self) -> Self {
        Self {
            reconciler: Arc::clone(&self.reconciler),
            work_queue: Arc::clone(&self.work_queue),
            context: self.context.clone(),
            resync_jitter_base: self.resync_jitter_base,
            drain_poll_interval: self.drain_poll_interval,
        }
    }
}

impl<R: Reconciler> Controller<R> {
    /// Controller over a queue named `work_queue_name` using the default
    /// controller backoff.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Spawn` if the queue's delay thread cannot start.
    pub fn new(reconciler: R, work_queue_name: &str) -> Result<Self, EngineError> {
        Self::with_rate_limiter(reconciler, work_queue_name, default_controller_rate_limiter())
    }

    /// Controller with a custom backoff policy.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Spawn` if the queue's delay thread cannot start.
    pub fn with_rate_limiter(
        reconciler: R,
        work_queue_name: &str,
        rate_limiter: impl RateLimiter<ResourceKey> + 'static,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            reconciler: Arc::new(reconciler),
            work_queue: Arc::new(WorkQueue::new(work_queue_name, rate_limiter)?),
            context: ContextConfig::default(),
            resync_jitter_base: DEFAULT_RESYNC_JITTER_BASE,
            drain_poll_interval: DEFAULT_DRAIN_POLL_INTERVAL,
        })
    }

    /// Configuration handed to every reconcile call.
    #[must_use]
    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// Per-item spread of a global resync.
    #[must_use]
    pub const fn with_resync_jitter_base(mut self, base: Duration) -> Self {
        self.resync_jitter_base = base;
        self
    }

    /// Poll interval while waiting for the queue to drain on stop.
    #[must_use]
    pub const fn with_drain_poll_interval(mut self, interval: Duration) -> Self {
        self.drain_poll_interval = interval;
        self
    }

    /// The reconciler fed by this controller.
    #[must_use]
    pub const fn reconciler(&self) -> &Arc<R> {
        &self.reconciler
    }

    /// The underlying work queue.
    #[must_use]
    pub fn work_queue(&self) -> &WorkQueue<ResourceKey> {
        &self.work_queue
    }

    /// Configuration handed to every reconcile call.
    #[must_use]
    pub const fn context(&self) -> &ContextConfig {
        &self.context
    }

    /// Work queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.work_queue.name()
    }

    /// Enqueue the object's own key. Tombstones resolve to the key of the
    /// object they wrap.
    pub fn enqueue<O>(&self, obj: &O)
    where
        O: ObjectMeta + ?Sized,
    {
        self.enqueue_key(ResourceKey::from_object(obj));
    }

    /// Enqueue the object's own key after `delay`.
    pub fn enqueue_after<O>(&self, obj: &O, delay: Duration)
    where
        O: ObjectMeta + ?Sized,
    {
        self.enqueue_key_after(ResourceKey::from_object(obj), delay);
    }

    /// Handler that ignores the observed object and always enqueues `key`.
    pub fn enqueue_sentinel<O>(&self, key: ResourceKey) -> impl Fn(&O) + Send + Sync + Clone
    where
        O: ?Sized,
    {
        let controller = self.clone();
        move |_: &O| controller.enqueue_key(key.clone())
    }

    /// Enqueue the key of the object's controlling owner, in the object's
    /// namespace. No-op without a controller owner reference.
    pub fn enqueue_controller_of<O>(&self, obj: &O)
    where
        O: ObjectMeta + ?Sized,
    {
        if let Some(owner) = obj.controller_of() {
            self.enqueue_key(ResourceKey::new(
                obj.namespace().unwrap_or_default(),
                owner.name.clone(),
            ));
        }
    }

    /// Handler that enqueues the parent named by the object's labels.
    ///
    /// The parent's name is read from `name_label`. Its namespace is read
    /// from `namespace_label` when given, otherwise the object's own
    /// namespace is used. Objects missing a label are skipped.
    pub fn enqueue_label_of_namespace_scoped_resource<O>(
        &self,
        namespace_label: Option<&str>,
        name_label: &str,
    ) -> impl Fn(&O) + Send + Sync + Clone
    where
        O: ObjectMeta + ?Sized,
    {
        let controller = self.clone();
        let namespace_label = namespace_label.map(str::to_owned);
        let name_label = name_label.to_owned();
        move |obj: &O| {
            let labels = obj.labels();
            let Some(parent_name) = labels.get(&name_label) else {
                debug!(
                    object = %ResourceKey::from_object(obj),
                    label = %name_label,
                    "object does not have a referring name label"
                );
                return;
            };
            let parent_namespace = match &namespace_label {
                Some(namespace_label) => match labels.get(namespace_label) {
                    Some(namespace) => namespace.as_str(),
                    None => {
                        debug!(
                            object = %ResourceKey::from_object(obj),
                            label = %namespace_label,
                            "object does not have a referring namespace label"
                        );
                        return;
                    }
                },
                None => obj.namespace().unwrap_or_default(),
            };
            controller.enqueue_key(ResourceKey::new(parent_namespace, parent_name.clone()));
        }
    }

    /// Handler that enqueues the cluster-scoped parent named by the object's
    /// `name_label`. Objects without the label are skipped.
    pub fn enqueue_label_of_cluster_scoped_resource<O>(
        &self,
        name_label: &str,
    ) -> impl Fn(&O) + Send + Sync + Clone
    where
        O: ObjectMeta + ?Sized,
    {
        let controller = self.clone();
        let name_label = name_label.to_owned();
        move |obj: &O| match obj.labels().get(&name_label) {
            Some(parent_name) => {
                controller.enqueue_key(ResourceKey::cluster_scoped(parent_name.clone()));
            }
            None => debug!(
                object = %ResourceKey::from_object(obj),
                label = %name_label,
                "object does not have a referring name label"
            ),
        }
    }

    /// Put `key` on the work queue.
    pub fn enqueue_key(&self, key: ResourceKey) {
        let key_str = key.to_string();
        self.work_queue.add(key);
        debug!(key = %key_str, depth = self.work_queue.len(), "Adding to queue");
    }

    /// Put `key` on the work queue after `delay`.
    pub fn enqueue_key_after(&self, key: ResourceKey, delay: Duration) {
        let key_str = key.to_string();
        self.work_queue.add_after(key, delay);
        debug!(key = %key_str, ?delay, depth = self.work_queue.len(), "Adding to queue");
    }

    /// Start `threadiness` workers and block until `stop` fires.
    ///
    /// On stop the queue is shut down, the call waits for it to drain, and
    /// then joins every worker. In-flight reconciles run to completion. The
    /// drain wait ends early if every worker has already exited.
    ///
    /// # Errors
    ///
    /// `EngineError::InvalidConfig` for zero workers, `EngineError::Spawn` if a
    /// worker thread cannot start, `EngineError::Runtime` if a worker could
    /// not build its runtime, `EngineError::WorkerPanicked` if a worker died
    /// outside a reconcile call.
    pub fn run(&self, threadiness: usize, stop: &StopSignal) -> Result<(), EngineError> {
        if threadiness == 0 {
            return Err(EngineError::InvalidConfig(
                "threadiness must be greater than 0".into(),
            ));
        }

        info!(queue = %self.name(), threadiness, "Starting controller and workers");
        let mut workers = Vec::with_capacity(threadiness);
        for worker_id in 0..threadiness {
            match self.spawn_worker(worker_id) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    error!(queue = %self.name(), worker_id, error = %e, "Failed to start worker");
                    self.work_queue.shut_down();
                    self.wait_for_drain(&workers);
                    // The spawn failure is reported over any worker error.
                    let _ = Self::join_workers(workers);
                    return Err(e);
                }
            }
        }
        info!(queue = %self.name(), "Started workers");

        stop.wait();
        info!(queue = %self.name(), "Shutting down workers");

        self.work_queue.shut_down();
        self.wait_for_drain(&workers);
        Self::join_workers(workers)?;
        info!(queue = %self.name(), "Workers stopped");
        Ok(())
    }

    /// Poll until the queue is empty or no worker is left to empty it.
    fn wait_for_drain<W>(&self, workers: &[JoinHandle<W>]) {
        while !self.work_queue.is_empty() {
            if workers.iter().all(JoinHandle::is_finished) {
                warn!(
                    queue = %self.name(),
                    remaining = self.work_queue.len(),
                    "All workers exited before the queue drained"
                );
                return;
            }
            thread::sleep(self.drain_poll_interval);
        }
    }

    fn join_workers(workers: Vec<JoinHandle<Result<(), EngineError>>>) -> Result<(), EngineError> {
        let mut result = Ok(());
        for (worker_id, worker) in workers.into_iter().enumerate() {
            let outcome = worker.join().unwrap_or_else(|payload| {
                warn!(worker_id, panic = panic_message(payload.as_ref()), "Worker panicked");
                Err(EngineError::WorkerPanicked(worker_id))
            });
            if let Err(e) = outcome {
                result = result.and(Err(e));
            }
        }
        result
    }

    fn spawn_worker(
        &self,
        worker_id: usize,
    ) -> Result<JoinHandle<Result<(), EngineError>>, EngineError> {
        let controller = self.clone();
        let name = format!("{}-worker-{worker_id}", self.name());
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || -> Result<(), EngineError> {
                debug!(worker_id, "Worker thread started");
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|source| {
                        error!(worker_id, error = %source, "Failed to create worker runtime");
                        EngineError::Runtime { worker_id, source }
                    })?;
                while controller.process_next_work_item(&rt) {}
                debug!(worker_id, "Worker thread exiting");
                Ok(())
            })
            .map_err(|source| EngineError::Spawn { name, source })
    }

    /// Take one key off the queue and reconcile it. Returns false once the
    /// queue has shut down and drained.
    fn process_next_work_item(&self, rt: &tokio::runtime::Runtime) -> bool {
        let Some(key) = self.work_queue.get() else {
            return false;
        };
        let _done = DoneGuard {
            queue: &self.work_queue,
            key: &key,
        };
        let key_str = key.to_string();
        debug!(key = %key_str, depth = self.work_queue.len(), "Processing from queue");

        let ctx = ReconcileContext::new(key.clone(), self.context.clone());
        let span = info_span!("reconcile", trace_id = %ctx.trace_id(), key = %key_str);
        let start = Instant::now();

        let reconcile = self.reconciler.reconcile(&ctx, &key_str).instrument(span.clone());
        let result = catch_unwind(AssertUnwindSafe(|| rt.block_on(reconcile))).unwrap_or_else(
            |payload| {
                Err(ReconcileError::transient(anyhow::anyhow!(
                    "reconciler panicked: {}",
                    panic_message(payload.as_ref())
                )))
            },
        );

        let _entered = span.enter();
        let handled = catch_unwind(AssertUnwindSafe(|| match result {
            Ok(()) => {
                self.work_queue.forget(&key);
                info!(elapsed = ?start.elapsed(), "Reconcile succeeded");
            }
            Err(err) => {
                self.handle_err(&err, &key);
                info!(elapsed = ?start.elapsed(), "Reconcile failed");
            }
        }));
        if let Err(payload) = handled {
            error!(
                key = %key_str,
                panic = panic_message(payload.as_ref()),
                "Failed to record reconcile outcome"
            );
        }
        true
    }

    fn handle_err(&self, err: &ReconcileError, key: &ResourceKey) {
        if err.is_permanent() {
            error!(key = %key, error = %err, "Reconcile error (permanent)");
            self.work_queue.forget(key);
            return;
        }

        error!(key = %key, error = %err, "Reconcile error");
        // Run may already have returned if the queue drained while this key
        // was in flight.
        if self.work_queue.shutting_down() {
            self.work_queue.forget(key);
            return;
        }
        self.work_queue.add_rate_limited(key.clone());
        debug!(
            key = %key,
            requeues = self.work_queue.num_requeues(key),
            depth = self.work_queue.len(),
            "Requeuing key due to non-permanent error"
        );
    }

    /// Re-enqueue every object in `store`, spread over a jittered delay.
    /// Returns how many objects were enqueued.
    pub fn global_resync<O, S>(&self, store: &S) -> usize
    where
        O: ObjectMeta,
        S: Store<O> + ?Sized,
    {
        self.filtered_global_resync(|_: &O| true, store)
    }

    /// Re-enqueue every object in `store` accepted by `predicate`. Each gets a
    /// delay drawn from `[0, len(store) * resync_jitter_base)`. No-op once
    /// the queue is shutting down. Returns how many objects were enqueued.
    pub fn filtered_global_resync<O, S, F>(&self, predicate: F, store: &S) -> usize
    where
        O: ObjectMeta,
        S: Store<O> + ?Sized,
        F: Fn(&O) -> bool,
    {
        if self.work_queue.shutting_down() {
            return 0;
        }
        let objects = store.list();
        let max_delay = spread(self.resync_jitter_base, objects.len());
        let mut rng = rand::rng();
        let mut enqueued = 0;
        for obj in objects.iter().filter(|obj| predicate(obj)) {
            self.enqueue_after(obj, jitter(max_delay, &mut rng));
            enqueued += 1;
        }
        info!(
            queue = %self.name(),
            listed = objects.len(),
            enqueued,
            ?max_delay,
            "Global resync"
        );
        enqueued
    }
}
