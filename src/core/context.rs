//! Per-reconciliation context.
//!
//! Values a reconciler may need beyond its key (resync period, event
//! recorder) are carried explicitly in a [`ContextConfig`] owned by the
//! controller and cloned into every [`ReconcileContext`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::core::key::ResourceKey;
use crate::core::recorder::EventRecorder;

/// Resync period used when none is configured.
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(10 * 60 * 60);

/// Configuration threaded through to every reconcile call.
#[derive(Clone, Default)]
pub struct ContextConfig {
    resync_period: Option<Duration>,
    event_recorder: Option<Arc<dyn EventRecorder>>,
}

impl ContextConfig {
    /// Empty configuration: default resync period, no recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a resync period.
    #[must_use]
    pub const fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = Some(period);
        self
    }

    /// Attach an event recorder.
    #[must_use]
    pub fn with_event_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.event_recorder = Some(recorder);
        self
    }

    /// Configured resync period, or [`DEFAULT_RESYNC_PERIOD`].
    #[must_use]
    pub fn resync_period(&self) -> Duration {
        self.resync_period.unwrap_or(DEFAULT_RESYNC_PERIOD)
    }

    /// Lease after which tracked references are considered stale: three
    /// resync periods.
    #[must_use]
    pub fn tracker_lease(&self) -> Duration {
        self.resync_period().saturating_mul(3)
    }

    /// The attached event recorder, if any.
    #[must_use]
    pub fn event_recorder(&self) -> Option<&Arc<dyn EventRecorder>> {
        self.event_recorder.as_ref()
    }
}

impl fmt::Debug for ContextConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConfig")
            .field("resync_period", &self.resync_period)
            .field("event_recorder", &self.event_recorder.is_some())
            .finish()
    }
}

/// Context handed to one reconcile call.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    trace_id: Uuid,
    key: ResourceKey,
    config: ContextConfig,
}

impl ReconcileContext {
    /// Context for `key` with a fresh trace id.
    #[must_use]
    pub fn new(key: ResourceKey, config: ContextConfig) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            key,
            config,
        }
    }

    /// Trace id shared by every log line of this call.
    #[must_use]
    pub const fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Key being reconciled.
    #[must_use]
    pub const fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Controller-level configuration.
    #[must_use]
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Shorthand for `config().resync_period()`.
    #[must_use]
    pub fn resync_period(&self) -> Duration {
        self.config.resync_period()
    }

    /// Shorthand for `config().tracker_lease()`.
    #[must_use]
    pub fn tracker_lease(&self) -> Duration {
        self.config.tracker_lease()
    }

    /// Shorthand for `config().event_recorder()`.
    #[must_use]
    pub fn event_recorder(&self) -> Option<&Arc<dyn EventRecorder>> {
        self.config.event_recorder()
    }
}
