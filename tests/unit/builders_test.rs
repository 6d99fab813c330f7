//! Tests for builder modules

use async_trait::async_trait;
use parking_lot::Mutex;
use reconcile_engine::builders::{
    build_controller, start_all, start_all_with_threadiness, RunnableController,
};
use reconcile_engine::config::ControllerConfig;
use reconcile_engine::core::{
    ContextConfig, EngineError, ReconcileContext, ReconcileError, Reconciler, ResourceKey,
    DEFAULT_THREADS_PER_CONTROLLER,
};
use reconcile_engine::runtime::{stop_channel, StopSignal};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Collecting {
    keys: Mutex<Vec<String>>,
}

#[async_trait]
impl Reconciler for Collecting {
    async fn reconcile(&self, _ctx: &ReconcileContext, key: &str) -> Result<(), ReconcileError> {
        self.keys.lock().push(key.to_string());
        Ok(())
    }
}

struct Failing;

impl RunnableController for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn run(&self, _threadiness: usize, _stop: &StopSignal) -> Result<(), EngineError> {
        Err(EngineError::InvalidConfig("broken".to_string()))
    }
}

#[test]
fn test_build_controller_names_queue_after_config() {
    let cfg = ControllerConfig::new("volumes");
    let controller = build_controller(&cfg, Collecting::default(), ContextConfig::new()).unwrap();
    assert_eq!(RunnableController::name(&controller), "volumes");
    assert_eq!(controller.work_queue().name(), "volumes");
}

#[test]
fn test_build_controller_rejects_empty_name() {
    let cfg = ControllerConfig::new("");
    let result = build_controller(&cfg, Collecting::default(), ContextConfig::new());
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

#[test]
fn test_start_all_runs_every_controller_until_stop() {
    let volumes =
        build_controller(&ControllerConfig::new("volumes"), Collecting::default(), ContextConfig::new())
            .unwrap();
    let snapshots = build_controller(
        &ControllerConfig::new("snapshots"),
        Collecting::default(),
        ContextConfig::new(),
    )
    .unwrap();
    volumes.enqueue_key(ResourceKey::new("ns", "vol"));
    snapshots.enqueue_key(ResourceKey::new("ns", "snap"));

    let (handle, stop) = stop_channel();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.stop();
    });
    start_all(&stop, &[&volumes, &snapshots]).unwrap();
    stopper.join().unwrap();

    assert_eq!(*volumes.reconciler().keys.lock(), ["ns/vol"]);
    assert_eq!(*snapshots.reconciler().keys.lock(), ["ns/snap"]);
}

#[test]
fn test_start_all_reports_first_error() {
    let ok = build_controller(&ControllerConfig::new("ok"), Collecting::default(), ContextConfig::new())
        .unwrap();
    let (handle, stop) = stop_channel();
    handle.stop();

    let result = start_all_with_threadiness(&stop, 1, &[&ok, &Failing]);
    assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
}

/// Records the worker count it was asked to run with.
#[derive(Default)]
struct CountingWorkers {
    threadiness: Mutex<Option<usize>>,
}

impl RunnableController for CountingWorkers {
    fn name(&self) -> &str {
        "counting"
    }

    fn run(&self, threadiness: usize, _stop: &StopSignal) -> Result<(), EngineError> {
        *self.threadiness.lock() = Some(threadiness);
        Ok(())
    }
}

#[test]
fn test_start_all_uses_default_threads_per_controller() {
    let counting = CountingWorkers::default();
    let (handle, stop) = stop_channel();
    handle.stop();

    start_all(&stop, &[&counting]).unwrap();
    assert_eq!(*counting.threadiness.lock(), Some(DEFAULT_THREADS_PER_CONTROLLER));
}
