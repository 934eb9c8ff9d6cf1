//! Runs a request through a retry policy and a backoff strategy.

use anyhow::{Result, anyhow};
use log::{debug, warn};
use reqwest::{Body, Request, Response};
use std::future::Future;
use std::sync::Arc;

use super::backoff::BackoffStrategy;
use super::policy::RetryPolicy;

/// Repeats a single-attempt operation while its policy asks for it.
///
/// The retrier holds only shared, read-only configuration; one instance serves
/// any number of concurrent calls.
#[derive(Clone)]
pub struct Retrier {
    policy: Arc<dyn RetryPolicy>,
    backoff: Arc<dyn BackoffStrategy>,
}

impl Retrier {
    /// Creates a retrier from a shared policy and backoff strategy.
    pub fn new(policy: Arc<dyn RetryPolicy>, backoff: Arc<dyn BackoffStrategy>) -> Self {
        Self { policy, backoff }
    }

    /// Returns the number of retries allowed after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.policy.max_retries()
    }

    /// Performs `request` via `perform`, retrying as the policy allows.
    ///
    /// The request body is buffered once and a fresh copy is attached before
    /// every attempt. When the retry budget runs out the last outcome is
    /// returned as-is, including a response carrying an error status.
    #[tracing::instrument(skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn execute<F, Fut>(&self, mut request: Request, perform: F) -> Result<Response>
    where
        F: Fn(Request) -> Fut,
        Fut: Future<Output = Result<Response>>,
    {
        // The transport consumes the body on every attempt
        let body = match request.body_mut().take() {
            Some(body) => Some(body.as_bytes().map(<[u8]>::to_vec).ok_or_else(|| {
                anyhow!("failed to copy request body: streaming bodies cannot be replayed")
            })?),
            None => None,
        };

        let max_retries = self.policy.max_retries();
        let mut retries = 0;
        let mut outcome = perform(fresh_attempt(&request, body.as_deref())?).await;

        loop {
            let (error, response) = match &outcome {
                Ok(response) => (None, Some(response)),
                Err(err) => (Some(err), None),
            };

            if !self.policy.should_retry(error, response) {
                break;
            }

            let reason = describe(&outcome);
            if retries >= max_retries {
                debug!("retry budget of {} exhausted, last outcome: {}", max_retries, reason);
                break;
            }

            let delay = self.backoff.delay(retries);
            warn!(
                "attempt {}/{} failed ({}), retrying in {}ms...",
                retries + 1,
                max_retries + 1,
                reason,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;

            debug!("discarding outcome of attempt {}", retries + 1);
            outcome = perform(fresh_attempt(&request, body.as_deref())?).await;
            retries += 1;
        }

        outcome
    }
}

/// Clones the body-less template and attaches an unconsumed copy of the body.
fn fresh_attempt(template: &Request, body: Option<&[u8]>) -> Result<Request> {
    let mut request = template
        .try_clone()
        .ok_or_else(|| anyhow!("failed to clone request for {}", template.url()))?;
    if let Some(bytes) = body {
        *request.body_mut() = Some(Body::from(bytes.to_vec()));
    }
    Ok(request)
}

fn describe(outcome: &Result<Response>) -> String {
    match outcome {
        Ok(response) => format!("HTTP {}", response.status().as_u16()),
        Err(err) => format!("{:#}", err),
    }
}
