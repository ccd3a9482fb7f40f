use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

use crate::data_source::SourceError;

/// Request budget and deadlines for one vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPolicy {
    pub vendor: &'static str,
    pub quota_window: Duration,
    pub quota_limit: u32,
    /// Longest a call waits for rate budget before failing as rate limited.
    pub max_wait: Duration,
    pub request_timeout: Duration,
}

impl VendorPolicy {
    pub fn corelogic_default() -> Self {
        Self {
            vendor: "corelogic",
            quota_window: Duration::from_secs(60),
            quota_limit: 120,
            max_wait: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn reinz_default() -> Self {
        Self {
            vendor: "reinz",
            quota_window: Duration::from_secs(60),
            quota_limit: 60,
            max_wait: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared per-vendor rate limiter.
#[derive(Clone)]
pub struct RateGate {
    vendor: &'static str,
    limiter: Arc<DirectRateLimiter>,
    max_wait: Duration,
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("vendor", &self.vendor)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}

impl RateGate {
    pub fn new(
        vendor: &'static str,
        quota_window: Duration,
        quota_limit: u32,
        max_wait: Duration,
    ) -> Self {
        Self {
            vendor,
            limiter: Arc::new(RateLimiter::direct(quota_from_window(quota_window, quota_limit))),
            max_wait,
        }
    }

    pub fn from_policy(policy: &VendorPolicy) -> Self {
        Self::new(
            policy.vendor,
            policy.quota_window,
            policy.quota_limit,
            policy.max_wait,
        )
    }

    /// Takes one unit of budget without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits up to `max_wait` for budget.
    pub async fn acquire(&self) -> Result<(), SourceError> {
        if self.try_acquire() {
            return Ok(());
        }

        tracing::debug!(vendor = self.vendor, "waiting for rate budget");
        tokio::time::timeout(self.max_wait, self.limiter.until_ready())
            .await
            .map_err(|_| {
                SourceError::rate_limited(format!(
                    "{} rate budget exhausted for {}ms",
                    self.vendor,
                    self.max_wait.as_millis()
                ))
            })
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let safe_limit = quota_limit.max(1);
    let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
