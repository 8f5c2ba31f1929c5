use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::num::NonZeroU32;

use super::client::RateLimitConfig;

type DirectLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket in front of one exchange client. Zero rates fall back to one request per second.
pub struct RateLimiter {
    name: &'static str,
    bucket: DirectLimiter,
}

impl RateLimiter {
    pub fn new(name: &'static str, config: &RateLimitConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(rate);
        Self {
            name,
            bucket: DirectLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        }
    }

    /// Takes a token, sleeping until one is available.
    pub async fn acquire(&self) {
        if self.bucket.check().is_ok() {
            return;
        }
        log::debug!("{} rate limit reached, waiting for a token", self.name);
        self.bucket.until_ready().await;
    }

    pub fn try_acquire(&self) -> bool {
        self.bucket.check().is_ok()
    }
}
