//! Tests for configuration validation

use reconcile_engine::config::{ControllerConfig, RateLimiterConfig};
use std::time::Duration;

#[test]
fn test_controller_config_defaults() {
    let cfg = ControllerConfig::new("volumes");
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.threadiness, 2);
    assert_eq!(cfg.resync_period(), Duration::from_secs(10 * 60 * 60));
    assert_eq!(cfg.resync_jitter_base(), Duration::from_secs(1));
    assert_eq!(cfg.drain_poll_interval(), Duration::from_millis(100));
    assert_eq!(cfg.rate_limiter, RateLimiterConfig::default());
}

#[test]
fn test_controller_config_invalid_name() {
    assert!(ControllerConfig::new("  ").validate().is_err());
}

#[test]
fn test_controller_config_invalid_resync_period() {
    let cfg = ControllerConfig::new("volumes").with_resync_period(Duration::ZERO);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_rate_limiter_config_invalid_values() {
    let zero_base = RateLimiterConfig {
        base_delay_ms: 0,
        ..RateLimiterConfig::default()
    };
    assert!(zero_base.validate().is_err());

    let base_above_cap = RateLimiterConfig {
        base_delay_ms: 5_000,
        max_delay_secs: 1,
        ..RateLimiterConfig::default()
    };
    assert!(base_above_cap.validate().is_err());

    let nan_qps = RateLimiterConfig {
        qps: f64::NAN,
        ..RateLimiterConfig::default()
    };
    assert!(nan_qps.validate().is_err());

    let zero_burst = RateLimiterConfig {
        burst: 0,
        ..RateLimiterConfig::default()
    };
    assert!(zero_burst.validate().is_err());
}

#[test]
fn test_controller_config_from_json() {
    let json = r#"{
        "name": "snapshots",
        "threadiness": 4,
        "resync_period_secs": 600,
        "rate_limiter": { "base_delay_ms": 10, "burst": 20 }
    }"#;

    let cfg = ControllerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.name, "snapshots");
    assert_eq!(cfg.effective_threadiness(), 4);
    assert_eq!(cfg.resync_period(), Duration::from_secs(600));
    assert_eq!(cfg.resync_jitter_base_ms, 1000);
    assert_eq!(cfg.rate_limiter.base_delay_ms, 10);
    assert_eq!(cfg.rate_limiter.burst, 20);
    assert_eq!(cfg.rate_limiter.max_delay_secs, 1000);
}

#[test]
fn test_controller_config_from_json_rejects_invalid() {
    assert!(ControllerConfig::from_json_str(r#"{ "name": "" }"#).is_err());
    assert!(ControllerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_controller_config_serde_roundtrip_keeps_custom_values() {
    let cfg = ControllerConfig::new("volumes")
        .with_threadiness(8)
        .with_resync_jitter_base(Duration::from_millis(250));
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(ControllerConfig::from_json_str(&json).unwrap(), cfg);
}
