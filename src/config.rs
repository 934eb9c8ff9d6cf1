//! Client configuration: transport, retry policy, backoff and circuit breaker.

use anyhow::{Context, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::http::{
    BackoffStrategy, DefaultRetryPolicy, ExponentialBackoff, LinearBackoff, NoBackoff, Retrier,
    RetryPolicy,
};

/// Timeout applied to the default HTTP client and to the breaker.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = "account-client";

/// Options for [`AccountClient`](crate::account::AccountClient).
///
/// Retries are switched off unless configured.
#[derive(Clone)]
pub struct ClientConfig {
    pub http_client: Option<Client>,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub backoff: Arc<dyn BackoffStrategy>,
    pub breaker: BreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_client: None,
            retry_policy: Arc::new(DefaultRetryPolicy::default()),
            backoff: Arc::new(NoBackoff),
            breaker: BreakerConfig {
                timeout: DEFAULT_TIMEOUT,
                ..BreakerConfig::default()
            },
        }
    }
}

impl ClientConfig {
    /// Retries transport failures and statuses of 500 or above up to `max_retries` times.
    pub fn with_retries_on_default_policy(mut self, max_retries: u32) -> Self {
        self.retry_policy = Arc::new(DefaultRetryPolicy::new(max_retries));
        self
    }

    /// Replaces the retry policy.
    pub fn with_custom_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    /// Uses the given client instead of the default one with a 10 second timeout.
    ///
    /// The breaker timeout is not derived from the client and stays at
    /// [`DEFAULT_TIMEOUT`]. A client with a longer timeout also needs a matching
    /// `timeout` passed to [`with_breaker_config`](Self::with_breaker_config),
    /// otherwise the breaker cuts its calls short.
    pub fn with_custom_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Waits `initial_delay * multiplier^n` before retry `n`.
    pub fn with_exponential_backoff(mut self, initial_delay: Duration, multiplier: u32) -> Self {
        self.backoff = Arc::new(ExponentialBackoff::new(initial_delay, multiplier));
        self
    }

    /// Waits a fixed `delay` before every retry.
    pub fn with_linear_backoff(mut self, delay: Duration) -> Self {
        self.backoff = Arc::new(LinearBackoff::new(delay));
        self
    }

    /// Replaces the backoff strategy.
    pub fn with_custom_backoff(mut self, backoff: impl BackoffStrategy + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    /// Replaces the circuit breaker thresholds and timeout.
    pub fn with_breaker_config(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Builds a retrier sharing this config's policy and backoff.
    pub fn retrier(&self) -> Retrier {
        Retrier::new(Arc::clone(&self.retry_policy), Arc::clone(&self.backoff))
    }

    /// Returns the configured HTTP client, building the default one if needed.
    pub fn build_http_client(&self) -> Result<Client> {
        match &self.http_client {
            Some(client) => Ok(client.clone()),
            None => Client::builder()
                .user_agent(USER_AGENT)
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .context("Failed to build HTTP client"),
        }
    }
}
