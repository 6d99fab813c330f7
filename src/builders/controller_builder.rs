//! Build controllers from [`ControllerConfig`] and run several side by side.

use std::thread;

use tracing::{error, info};

use crate::config::ControllerConfig;
use crate::core::{
    ContextConfig, Controller, EngineError, Reconciler, ResourceKey,
    DEFAULT_THREADS_PER_CONTROLLER,
};
use crate::infra::queue::rate_limiter_from_config;
use crate::runtime::StopSignal;

/// Build a controller for `reconciler` from validated configuration.
///
/// The work queue is named after `cfg.name` and uses the configured backoff.
/// `context` supplies the event recorder; its resync period is replaced by
/// the configured one.
///
/// # Errors
///
/// `EngineError::InvalidConfig` if `cfg` fails validation, or
/// `EngineError::Spawn` if the queue's delay thread cannot start.
pub fn build_controller<R>(
    cfg: &ControllerConfig,
    reconciler: R,
    context: ContextConfig,
) -> Result<Controller<R>, EngineError>
where
    R: Reconciler,
{
    cfg.validate()
        .map_err(|e| EngineError::InvalidConfig(format!("controller `{}`: {e}", cfg.name)))?;

    let limiter = rate_limiter_from_config::<ResourceKey>(&cfg.rate_limiter);
    let controller = Controller::with_rate_limiter(reconciler, &cfg.name, limiter)?
        .with_context(context.with_resync_period(cfg.resync_period()))
        .with_resync_jitter_base(cfg.resync_jitter_base())
        .with_drain_poll_interval(cfg.drain_poll_interval());
    Ok(controller)
}

/// A controller that can be driven without knowing its reconciler type.
pub trait RunnableController: Send + Sync {
    /// Name used for the controller's threads and logs.
    fn name(&self) -> &str;

    /// Run `threadiness` workers until `stop` fires.
    ///
    /// # Errors
    ///
    /// See [`Controller::run`].
    fn run(&self, threadiness: usize, stop: &StopSignal) -> Result<(), EngineError>;
}

impl<R: Reconciler> RunnableController for Controller<R> {
    fn name(&self) -> &str {
        Self::name(self)
    }

    fn run(&self, threadiness: usize, stop: &StopSignal) -> Result<(), EngineError> {
        Self::run(self, threadiness, stop)
    }
}

/// Run every controller with [`DEFAULT_THREADS_PER_CONTROLLER`] workers each
/// and block until all of them have stopped.
///
/// # Errors
///
/// Returns the first controller error. The others still run to completion.
pub fn start_all(
    stop: &StopSignal,
    controllers: &[&dyn RunnableController],
) -> Result<(), EngineError> {
    start_all_with_threadiness(stop, DEFAULT_THREADS_PER_CONTROLLER, controllers)
}

/// Like [`start_all`] with `threadiness` workers per controller.
///
/// # Errors
///
/// Returns the first controller error. The others still run to completion.
pub fn start_all_with_threadiness(
    stop: &StopSignal,
    threadiness: usize,
    controllers: &[&dyn RunnableController],
) -> Result<(), EngineError> {
    info!(controllers = controllers.len(), threadiness, "Starting controllers");
    thread::scope(|scope| {
        let mut runners = Vec::with_capacity(controllers.len());
        for (index, controller) in controllers.iter().enumerate() {
            let name = format!("{}-controller", controller.name());
            let runner = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(scope, move || controller.run(threadiness, stop))
                .map_err(|source| EngineError::Spawn { name, source })?;
            runners.push((index, runner));
        }

        let mut result = Ok(());
        for (index, runner) in runners {
            let outcome = runner
                .join()
                .unwrap_or(Err(EngineError::WorkerPanicked(index)));
            if let Err(e) = outcome {
                error!(index, error = %e, "Controller exited with error");
                result = result.and(Err(e));
            }
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimiterConfig;
    use crate::core::{ReconcileContext, ReconcileError};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Reconciler for Noop {
        async fn reconcile(&self, _ctx: &ReconcileContext, _key: &str) -> Result<(), ReconcileError> {
            Ok(())
        }
    }

    #[test]
    fn test_build_controller_applies_config() {
        let cfg = ControllerConfig::new("volumes")
            .with_resync_period(std::time::Duration::from_secs(60));
        let controller = build_controller(&cfg, Noop, ContextConfig::new()).unwrap();
        assert_eq!(controller.name(), "volumes");
        assert_eq!(
            controller.context().resync_period(),
            std::time::Duration::from_secs(60)
        );
        assert_eq!(
            controller.context().tracker_lease(),
            std::time::Duration::from_secs(180)
        );
    }

    #[test]
    fn test_build_controller_rejects_invalid_config() {
        let cfg = ControllerConfig::new("volumes").with_rate_limiter(RateLimiterConfig {
            qps: 0.0,
            ..RateLimiterConfig::default()
        });
        assert!(matches!(
            build_controller(&cfg, Noop, ContextConfig::new()),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
