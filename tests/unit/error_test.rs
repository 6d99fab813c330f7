//! Tests for error types

use reconcile_engine::core::{is_permanent_error, EngineError, ReconcileError};
use std::error::Error;

#[test]
fn test_invalid_config_error() {
    let err = EngineError::InvalidConfig("threadiness must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: threadiness must be greater than 0"
    );
}

#[test]
fn test_cache_sync_failed_error() {
    let err = EngineError::CacheSyncFailed { index: 2 };
    assert_eq!(format!("{}", err), "failed to wait for cache at index 2 to sync");
}

#[test]
fn test_spawn_error_keeps_source() {
    let err = EngineError::Spawn {
        name: "volumes-worker-0".to_string(),
        source: std::io::Error::other("out of threads"),
    };
    assert!(format!("{}", err).contains("volumes-worker-0"));
    assert!(err.source().is_some());
}

#[test]
fn test_worker_panicked_error() {
    let err = EngineError::WorkerPanicked(3);
    assert_eq!(format!("{}", err), "worker 3 panicked");
}

#[test]
fn test_permanent_wrapping_survives_context() {
    let err = ReconcileError::permanent(anyhow::anyhow!("bad size").context("volume ns/a"));
    assert!(is_permanent_error(&err));
    assert_eq!(format!("{}", err), "volume ns/a");
    assert_eq!(format!("{:#}", err.inner()), "volume ns/a: bad size");
}

#[test]
fn test_transient_is_not_permanent() {
    let err = ReconcileError::transient(std::io::Error::other("connection reset"));
    assert!(!is_permanent_error(&err));
    assert_eq!(format!("{}", err), "connection reset");
}
