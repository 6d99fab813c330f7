//! # Reconcile Engine
//!
//! A generic reconciliation engine for controllers that converge actual state
//! toward desired state, one resource key at a time.
//!
//! Watch events are turned into [`ResourceKey`](core::ResourceKey)s and placed
//! on a deduplicating, rate-limited [`WorkQueue`](infra::WorkQueue). A pool of
//! worker threads takes keys off the queue and hands them to a user supplied
//! [`Reconciler`](core::Reconciler). Failures classified as transient are
//! retried with backoff; permanent ones are dropped.
//!
//! ## Key Features
//!
//! - **Deduplication**: a key is queued or in flight at most once
//! - **Serialized keys**: two workers never reconcile the same key concurrently
//! - **Backoff**: per-key exponential delay combined with an overall token bucket
//! - **Sync barrier**: workers start only after every informer has listed once
//! - **Graceful stop**: the queue drains and in-flight work finishes before `run` returns
//!
//! ## Example
//!
//! ```rust,ignore
//! use reconcile_engine::builders::build_controller;
//! use reconcile_engine::config::ControllerConfig;
//! use reconcile_engine::core::{handle_all, start_informers, ContextConfig, Informer};
//! use reconcile_engine::infra::InMemoryInformer;
//! use reconcile_engine::runtime::stop_channel;
//! use std::sync::Arc;
//!
//! let cfg = ControllerConfig::from_env("volumes")?;
//! let controller = build_controller(&cfg, VolumeReconciler, ContextConfig::new())?;
//!
//! let informer = Arc::new(InMemoryInformer::new());
//! let enqueue = controller.clone();
//! informer.add_event_handler(handle_all(move |obj| enqueue.enqueue(obj)));
//!
//! let (stop_handle, stop) = stop_channel();
//! start_informers(&stop, &[informer as Arc<dyn Informer>])?;
//! controller.run(cfg.effective_threadiness(), &stop)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Keys, objects, errors, the controller and its event plumbing.
pub mod core;
/// Configuration models for controllers and backoff.
pub mod config;
/// Builders to construct controllers from configuration.
pub mod builders;
/// In-process queue and cache implementations.
pub mod infra;
/// Stop signalling.
pub mod runtime;
/// Shared utilities.
pub mod util;
