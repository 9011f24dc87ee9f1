use governor::{
    Quota,
    RateLimiter,
    DefaultDirectRateLimiter,
    Jitter
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{HttpConfig, RateLimitConfig};

/// Builds a reqwest client bounded by the configured connect and read timeouts.
pub fn build_http_client(http: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(http.connect_timeout())
        .timeout(http.read_timeout())
        .build()
}

/// Rate-limited HTTP client shared by every call against the identity system
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    client: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl RateLimitedHttpClient {
    /// Create a new rate-limited HTTP client
    pub fn new(http: &HttpConfig, rate_limit: &RateLimitConfig) -> reqwest::Result<Self> {
        let per_second = NonZeroU32::new(rate_limit.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(rate_limit.burst_capacity).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Ok(Self {
            client: build_http_client(http)?,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// The underlying client, for calls that bypass the limiter
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Waits for a rate-limit permit, then sends the request
    pub async fn execute_with_rate_limit(
        &self,
        request: reqwest::RequestBuilder,
    ) -> reqwest::Result<reqwest::Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        debug!("Executing identity API request with rate limiting");
        request.send().await
    }

    /// Takes a permit if one is free right now, without waiting
    pub fn try_acquire(&self) -> bool {
        self.rate_limiter.check().is_ok()
    }
}
