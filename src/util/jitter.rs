//! Randomized delay spread.

use std::time::Duration;

use rand::Rng;

/// Pick a delay uniformly from `[0, max)`. A zero `max` yields zero.
pub fn jitter<R>(max: Duration, rng: &mut R) -> Duration
where
    R: Rng,
{
    if max.is_zero() {
        return Duration::ZERO;
    }
    rng.random_range(Duration::ZERO..max)
}

/// Spread for `count` items at `base` each, saturating at `Duration::MAX`.
#[must_use]
pub fn spread(base: Duration, count: usize) -> Duration {
    base.saturating_mul(u32::try_from(count).unwrap_or(u32::MAX))
}
