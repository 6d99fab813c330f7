//! The reconciler capability driven by the controller's workers.

use async_trait::async_trait;

use super::{ReconcileContext, ReconcileError};

/// Converges actual state toward desired state for one key.
///
/// Calls for the same key never overlap. The engine does not cancel an
/// in-flight call: long-running implementations must bound their own work.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use reconcile_engine::core::{ReconcileContext, ReconcileError, Reconciler};
///
/// #[derive(Clone)]
/// struct VolumeReconciler;
///
/// #[async_trait]
/// impl Reconciler for VolumeReconciler {
///     async fn reconcile(&self, ctx: &ReconcileContext, key: &str) -> Result<(), ReconcileError> {
///         if key.is_empty() {
///             return Err(ReconcileError::permanent(anyhow::anyhow!("empty key")));
///         }
///         tracing::info!(resync = ?ctx.resync_period(), "volume in sync");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Reconcile the resource identified by `key` (`namespace/name` or `name`).
    ///
    /// # Errors
    ///
    /// A [`ReconcileError::Permanent`] drops the key; anything else requeues it
    /// with backoff.
    ///
    /// # Threading
    ///
    /// Called from a dedicated worker thread that drives the future on its
    /// own single-threaded tokio runtime.
    async fn reconcile(&self, ctx: &ReconcileContext, key: &str) -> Result<(), ReconcileError>;
}
