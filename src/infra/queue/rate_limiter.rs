//! Backoff policies for requeued items.
//!
//! A [`RateLimiter`] lives inside the work queue's state and is only ever
//! touched with the queue lock held, so implementations take `&mut self`
//! and need no synchronization of their own.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use crate::config::RateLimiterConfig;

/// Decides how long an item waits before it is retried.
pub trait RateLimiter<T>: Send {
    /// Delay for the next retry of `item`. Records the failure.
    fn when(&mut self, item: &T) -> Duration;
    /// Drop all failure history for `item`.
    fn forget(&mut self, item: &T);
    /// Number of failures recorded for `item` since it was last forgotten.
    fn num_requeues(&self, item: &T) -> u32;
}

/// Per-item exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug)]
pub struct ItemExponentialFailureRateLimiter<T> {
    failures: HashMap<T, u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> ItemExponentialFailureRateLimiter<T> {
    /// Create a limiter with the given base and cap.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            failures: HashMap::new(),
            base_delay,
            max_delay,
        }
    }
}

impl<T> RateLimiter<T> for ItemExponentialFailureRateLimiter<T>
where
    T: Eq + Hash + Clone + Send,
{
    fn when(&mut self, item: &T) -> Duration {
        let failures = self.failures.entry(item.clone()).or_insert(0);
        let exp = *failures;
        *failures = failures.saturating_add(1);

        1u32.checked_shl(exp)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |backoff| backoff.min(self.max_delay))
    }

    fn forget(&mut self, item: &T) {
        self.failures.remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.failures.get(item).copied().unwrap_or(0)
    }
}

/// Token bucket shared by every item: at most `burst` immediate retries,
/// then `qps` per second overall.
#[derive(Debug)]
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl BucketRateLimiter {
    /// Create a full bucket.
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            qps,
            burst,
            tokens: burst,
            last: Instant::now(),
        }
    }

    fn reserve(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = elapsed.mul_add(self.qps, self.tokens).min(self.burst);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 || self.qps <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(-self.tokens / self.qps).unwrap_or(Duration::MAX)
    }
}

impl<T> RateLimiter<T> for BucketRateLimiter {
    fn when(&mut self, _item: &T) -> Duration {
        self.reserve(Instant::now())
    }

    fn forget(&mut self, _item: &T) {}

    fn num_requeues(&self, _item: &T) -> u32 {
        0
    }
}

/// Combines limiters by taking the longest delay among them.
pub struct MaxOfRateLimiter<T> {
    limiters: Vec<Box<dyn RateLimiter<T>>>,
}

impl<T> MaxOfRateLimiter<T> {
    /// Combine the given limiters.
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter<T>>>) -> Self {
        Self { limiters }
    }
}

impl<T> RateLimiter<T> for MaxOfRateLimiter<T> {
    fn when(&mut self, item: &T) -> Duration {
        self.limiters
            .iter_mut()
            .map(|limiter| limiter.when(item))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&mut self, item: &T) {
        for limiter in &mut self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// Build the limiter described by `cfg`: per-item exponential backoff
/// combined with an overall token bucket.
#[must_use]
pub fn rate_limiter_from_config<T>(cfg: &RateLimiterConfig) -> MaxOfRateLimiter<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(cfg.base_delay_ms),
            Duration::from_secs(cfg.max_delay_secs),
        )),
        Box::new(BucketRateLimiter::new(cfg.qps, cfg.burst)),
    ])
}

/// Exponential 5ms..1000s per item, 10 qps with a burst of 100 overall.
#[must_use]
pub fn default_controller_rate_limiter<T>() -> MaxOfRateLimiter<T>
where
    T: Eq + Hash + Clone + Send + 'static,
{
    rate_limiter_from_config(&RateLimiterConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_doubles_then_caps() {
        let mut rl = ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
        );
        let delays: Vec<_> = (0..6).map(|_| rl.when(&"a")).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8, 10, 10].map(Duration::from_millis).to_vec()
        );
        assert_eq!(rl.num_requeues(&"a"), 6);

        rl.forget(&"a");
        assert_eq!(rl.num_requeues(&"a"), 0);
        assert_eq!(rl.when(&"a"), Duration::from_millis(1));
    }

    #[test]
    fn test_exponential_backoff_is_per_item() {
        let mut rl = ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(1),
            Duration::from_secs(1),
        );
        rl.when(&"a");
        rl.when(&"a");
        assert_eq!(rl.when(&"b"), Duration::from_millis(1));
    }

    #[test]
    fn test_exponential_backoff_saturates_at_cap() {
        let mut rl = ItemExponentialFailureRateLimiter::new(
            Duration::from_secs(1),
            Duration::from_secs(1000),
        );
        let last = (0..100).map(|_| rl.when(&1u8)).last();
        assert_eq!(last, Some(Duration::from_secs(1000)));
    }

    #[test]
    fn test_bucket_allows_burst_then_spaces_out() {
        let mut rl = BucketRateLimiter::new(10.0, 2);
        let now = rl.last;
        assert_eq!(rl.reserve(now), Duration::ZERO);
        assert_eq!(rl.reserve(now), Duration::ZERO);
        let third = rl.reserve(now);
        assert!(third > Duration::from_millis(90) && third <= Duration::from_millis(100));
        let fourth = rl.reserve(now);
        assert!(fourth > third);
    }

    #[test]
    fn test_bucket_with_tiny_qps_saturates() {
        let mut rl = BucketRateLimiter::new(f64::MIN_POSITIVE, 1);
        let now = rl.last;
        assert_eq!(rl.reserve(now), Duration::ZERO);
        assert_eq!(rl.reserve(now), Duration::MAX);
    }

    #[test]
    fn test_max_of_takes_longest() {
        let mut rl: MaxOfRateLimiter<&str> = MaxOfRateLimiter::new(vec![
            Box::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(5),
                Duration::from_secs(1),
            )),
            Box::new(ItemExponentialFailureRateLimiter::new(
                Duration::from_millis(1),
                Duration::from_millis(2),
            )),
        ]);
        assert_eq!(rl.when(&"a"), Duration::from_millis(5));
        assert_eq!(rl.when(&"a"), Duration::from_millis(10));
        assert_eq!(rl.num_requeues(&"a"), 2);
        rl.forget(&"a");
        assert_eq!(rl.num_requeues(&"a"), 0);
    }
}
