//! HTTP client utilities.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Shared HTTP client with optional client-side rate limiting
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_user_agent(
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            timeout,
        )
    }

    /// Create a new HTTP client with a custom user agent
    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            limiter: None,
        })
    }

    /// Limit outgoing requests to `per_second` (0 disables the limit)
    pub fn rate_limit_per_second(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));
        self
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a POST request.
    ///
    /// The request is not rate limited; callers wait in [`HttpClient::until_ready`]
    /// first so the wait can be kept out of any per-call deadline.
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Wait for a rate-limit permit
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_unlimited_client_is_always_ready() {
        let client = HttpClient::new(Duration::from_secs(1)).unwrap();
        let started = Instant::now();
        for _ in 0..20 {
            client.until_ready().await;
        }
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_permits() {
        let client = HttpClient::new(Duration::from_secs(1))
            .unwrap()
            .rate_limit_per_second(4);
        let started = Instant::now();
        // A burst of four passes, the fifth waits for the next slot
        for _ in 0..5 {
            client.until_ready().await;
        }
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
