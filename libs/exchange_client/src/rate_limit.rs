//! Per-exchange request throttling.
//!
//! Public market-data endpoints and signed wallet endpoints are metered
//! separately by every supported exchange, so each adapter holds two buckets.

use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use common::ExchangeId;

type DirectLimiter = GovLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Dual rate limiter: one bucket for public calls, one for signed calls.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    public_limiter: Arc<DirectLimiter>,
    private_limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    /// Conservative per-second limits for each exchange.
    pub fn for_exchange(exchange: ExchangeId) -> Self {
        match exchange {
            ExchangeId::Binance => Self::with_limits(20, 5),
            ExchangeId::Okx => Self::with_limits(10, 3),
            ExchangeId::Kucoin => Self::with_limits(10, 3),
            ExchangeId::Gate => Self::with_limits(10, 5),
            // Kraken's private counter decays slowly.
            ExchangeId::Kraken => Self::with_limits(1, 1),
        }
    }

    /// Create with custom per-second limits. Zero is treated as one.
    pub fn with_limits(public_per_sec: u32, private_per_sec: u32) -> Self {
        let public_quota =
            Quota::per_second(NonZeroU32::new(public_per_sec).unwrap_or(NonZeroU32::MIN));
        let private_quota =
            Quota::per_second(NonZeroU32::new(private_per_sec).unwrap_or(NonZeroU32::MIN));

        Self {
            public_limiter: Arc::new(GovLimiter::direct(public_quota)),
            private_limiter: Arc::new(GovLimiter::direct(private_quota)),
        }
    }

    /// Wait until a public slot is available.
    pub async fn wait_public(&self) {
        self.public_limiter.until_ready().await;
    }

    /// Wait until a signed-request slot is available.
    pub async fn wait_private(&self) {
        self.private_limiter.until_ready().await;
    }

    #[cfg(test)]
    fn try_public(&self) -> bool {
        self.public_limiter.check().is_ok()
    }

    #[cfg(test)]
    fn try_private(&self) -> bool {
        self.private_limiter.check().is_ok()
    }
}
