//! Process-wide spacing between remote calls.
//!
//! Quote providers tolerate a steady trickle of requests but reset
//! connections under bursts, so every remote call in the process goes
//! through one gate that enforces a minimum interval between issuances,
//! regardless of which task is fetching.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Global rate gate: no two acquisitions complete closer together than the
/// configured interval. Cloning shares the underlying limiter.
#[derive(Clone)]
pub struct RateGate {
    limiter: Arc<DirectRateLimiter>,
    min_interval: Duration,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        let period = min_interval.max(Duration::from_millis(1));
        let quota = Quota::with_period(period)
            .expect("period is always greater than zero")
            .allow_burst(NonZeroU32::MIN);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            min_interval,
        }
    }

    /// Wait until the gate allows the next remote call. Blocks only the
    /// calling task.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
