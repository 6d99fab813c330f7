//! Reconciliation primitives: keys, objects, errors, the controller and its
//! event plumbing.

pub mod context;
pub mod controller;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod informer;
pub mod key;
pub mod object;
pub mod recorder;

pub use context::{ContextConfig, ReconcileContext, DEFAULT_RESYNC_PERIOD};
pub use controller::{
    Controller, DEFAULT_DRAIN_POLL_INTERVAL, DEFAULT_RESYNC_JITTER_BASE,
    DEFAULT_THREADS_PER_CONTROLLER,
};
pub use error::{is_permanent_error, EngineError, ReconcileError};
pub use executor::Reconciler;
pub use handlers::{
    filter, filter_with_name, filter_with_name_and_namespace, handle_all, pass_new,
    EventHandlerFuncs, FilteringEventHandler, ResourceEventHandler,
};
pub use informer::{
    run_informers, start_informers, wait_for_cache_sync, Informer, InformersHandle, Store,
    CACHE_SYNC_POLL_INTERVAL,
};
pub use key::ResourceKey;
pub use object::{
    deletion_handling_accessor, DeletedFinalStateUnknown, GroupVersionKind, ObjectMeta,
    ObjectRecord, Observed, OwnerReference,
};
pub use recorder::{EventRecorder, EventType, InMemoryEventRecorder, RecordedEvent};
