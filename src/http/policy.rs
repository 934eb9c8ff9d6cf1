//! Retry policies deciding whether an attempt outcome deserves another try.

use reqwest::Response;

use super::error::is_transport_error;

/// Decides whether a failed attempt is retried, and how many retries are allowed.
///
/// A policy receives whatever the last attempt produced: an error, a response, or
/// (in theory) neither. Policies carry configuration only and are shared by
/// concurrent calls.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, error: Option<&anyhow::Error>, response: Option<&Response>) -> bool;

    /// Attempts allowed after the first one.
    fn max_retries(&self) -> u32;
}

/// Retries transport failures and responses with a status of 500 or above.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultRetryPolicy {
    max_retries: u32,
}

impl DefaultRetryPolicy {
    /// Creates a policy allowing `max_retries` attempts after the first one.
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn should_retry(&self, error: Option<&anyhow::Error>, response: Option<&Response>) -> bool {
        let transport_failure = error.is_some_and(is_transport_error);
        let server_error = response.is_some_and(|r| r.status().as_u16() >= 500);

        transport_failure || server_error
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Retries every response whose status is at or above `min_status`; never retries errors.
///
/// `StatusPolicy::new(400, n)` also retries client errors, which helps against
/// upstreams that answer 4xx while still warming up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    min_status: u16,
    max_retries: u32,
}

impl StatusPolicy {
    /// Creates a policy retrying any response whose status is at least `min_status`.
    pub fn new(min_status: u16, max_retries: u32) -> Self {
        Self {
            min_status,
            max_retries,
        }
    }
}

impl RetryPolicy for StatusPolicy {
    fn should_retry(&self, _error: Option<&anyhow::Error>, response: Option<&Response>) -> bool {
        response.is_some_and(|r| r.status().as_u16() >= self.min_status)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
pub(crate) fn response_with_status(status: u16) -> Response {
    Response::from(
        http::Response::builder()
            .status(status)
            .body(Vec::<u8>::new())
            .unwrap(),
    )
}
