//! Controller and backoff configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::context::DEFAULT_RESYNC_PERIOD;

/// Upper bound for [`RateLimiterConfig::max_delay_secs`]: one week.
pub const MAX_BACKOFF_DELAY_SECS: u64 = 7 * 24 * 60 * 60;

const fn default_threadiness() -> usize {
    2
}

const fn default_resync_period_secs() -> u64 {
    DEFAULT_RESYNC_PERIOD.as_secs()
}

const fn default_resync_jitter_base_ms() -> u64 {
    1000
}

const fn default_drain_poll_interval_ms() -> u64 {
    100
}

/// Backoff applied to keys whose reconciliation failed transiently.
///
/// The effective delay is the larger of the per-key exponential backoff and
/// the overall token bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Delay after the first failure, in milliseconds. Doubles per failure.
    pub base_delay_ms: u64,
    /// Upper bound of the per-key delay, in seconds.
    pub max_delay_secs: u64,
    /// Sustained retries per second across all keys.
    pub qps: f64,
    /// Retries allowed before the `qps` limit applies.
    pub burst: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_secs: 1000,
            qps: 10.0,
            burst: 100,
        }
    }
}

impl RateLimiterConfig {
    /// Validate backoff values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be greater than 0".into());
        }
        if self.max_delay_secs > MAX_BACKOFF_DELAY_SECS {
            return Err(format!(
                "max_delay_secs must not exceed {MAX_BACKOFF_DELAY_SECS}"
            ));
        }
        if Duration::from_millis(self.base_delay_ms) > Duration::from_secs(self.max_delay_secs) {
            return Err("base_delay_ms must not exceed max_delay_secs".into());
        }
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Err("qps must be a positive number".into());
        }
        if self.burst == 0 {
            return Err("burst must be greater than 0".into());
        }
        Ok(())
    }
}

/// Configuration of one controller instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Work queue name; prefixes worker thread names.
    pub name: String,
    /// Number of workers. `0` means one per CPU.
    #[serde(default = "default_threadiness")]
    pub threadiness: usize,
    /// Resync period handed to reconcilers, in seconds.
    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,
    /// Per-item spread of a global resync, in milliseconds.
    #[serde(default = "default_resync_jitter_base_ms")]
    pub resync_jitter_base_ms: u64,
    /// How often a stopping controller checks whether its queue has drained.
    #[serde(default = "default_drain_poll_interval_ms")]
    pub drain_poll_interval_ms: u64,
    /// Backoff for transient failures.
    #[serde(default)]
    pub rate_limiter: RateLimiterConfig,
}

impl ControllerConfig {
    /// Defaults for a controller called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            threadiness: default_threadiness(),
            resync_period_secs: default_resync_period_secs(),
            resync_jitter_base_ms: default_resync_jitter_base_ms(),
            drain_poll_interval_ms: default_drain_poll_interval_ms(),
            rate_limiter: RateLimiterConfig::default(),
        }
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_threadiness(mut self, threadiness: usize) -> Self {
        self.threadiness = threadiness;
        self
    }

    /// Set the resync period.
    #[must_use]
    pub const fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period_secs = period.as_secs();
        self
    }

    /// Set the per-item resync jitter base.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_resync_jitter_base(mut self, base: Duration) -> Self {
        self.resync_jitter_base_ms = base.as_millis() as u64;
        self
    }

    /// Set the backoff configuration.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiterConfig) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Worker count with `0` resolved to the number of CPUs.
    #[must_use]
    pub fn effective_threadiness(&self) -> usize {
        if self.threadiness == 0 {
            num_cpus::get()
        } else {
            self.threadiness
        }
    }

    /// Resync period as a duration.
    #[must_use]
    pub const fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    /// Resync jitter base as a duration.
    #[must_use]
    pub const fn resync_jitter_base(&self) -> Duration {
        Duration::from_millis(self.resync_jitter_base_ms)
    }

    /// Drain poll interval as a duration.
    #[must_use]
    pub const fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    /// Validate controller configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        if self.resync_period_secs == 0 {
            return Err("resync_period_secs must be greater than 0".into());
        }
        if self.drain_poll_interval_ms == 0 {
            return Err("drain_poll_interval_ms must be greater than 0".into());
        }
        self.rate_limiter
            .validate()
            .map_err(|e| format!("rate_limiter invalid: {e}"))
    }

    /// Parse controller configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `RECONCILE_*` environment variables, loading
    /// a `.env` file first if one exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation message.
    pub fn from_env(default_name: &str) -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(default_name, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(default_name: &str, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<V: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            target: &mut V,
        ) -> Result<(), String> {
            if let Some(raw) = lookup(key) {
                *target = raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("{key}: cannot parse `{raw}`"))?;
            }
            Ok(())
        }

        let mut cfg = Self::new(lookup("RECONCILE_NAME").unwrap_or_else(|| default_name.into()));
        parse(&lookup, "RECONCILE_THREADINESS", &mut cfg.threadiness)?;
        parse(&lookup, "RECONCILE_RESYNC_PERIOD_SECS", &mut cfg.resync_period_secs)?;
        parse(&lookup, "RECONCILE_RESYNC_JITTER_BASE_MS", &mut cfg.resync_jitter_base_ms)?;
        parse(&lookup, "RECONCILE_DRAIN_POLL_INTERVAL_MS", &mut cfg.drain_poll_interval_ms)?;
        parse(&lookup, "RECONCILE_BACKOFF_BASE_DELAY_MS", &mut cfg.rate_limiter.base_delay_ms)?;
        parse(&lookup, "RECONCILE_BACKOFF_MAX_DELAY_SECS", &mut cfg.rate_limiter.max_delay_secs)?;
        parse(&lookup, "RECONCILE_BACKOFF_QPS", &mut cfg.rate_limiter.qps)?;
        parse(&lookup, "RECONCILE_BACKOFF_BURST", &mut cfg.rate_limiter.burst)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
