//! Work queue and its backoff policies.

pub mod memory;
pub mod rate_limiter;

pub use memory::{QueueItem, WorkQueue, MAX_SCHEDULE_DELAY};
pub use rate_limiter::{
    default_controller_rate_limiter, rate_limiter_from_config, BucketRateLimiter,
    ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
};
