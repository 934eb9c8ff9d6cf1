//! Error types produced by the request pipeline and classification of
//! upstream error responses.

use serde::Deserialize;
use std::time::Duration;

/// Failures where no usable response was obtained.
#[derive(Debug)]
pub enum TransportError {
    /// The HTTP exchange could not be completed (connect, DNS, timeout, ...)
    Send(reqwest::Error),
    /// The circuit breaker rejected the call before any attempt was made
    CircuitOpen(String),
    /// The circuit breaker gave up waiting for the call
    Timeout(Duration),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Send(err) => write!(f, "failed to make request to an api: {}", err),
            TransportError::CircuitOpen(name) => write!(f, "circuit '{}' is open", name),
            TransportError::Timeout(after) => {
                write!(f, "request timed out after {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Send(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Send(err)
    }
}

/// An error response (status >= 400) returned by the upstream API.
///
/// `message` is empty when the upstream sent no body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub status_code: u16,
    pub message: String,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}: error: {}", self.status_code, self.message)
    }
}

impl std::error::Error for RequestError {}

#[derive(Deserialize)]
struct ErrorBody {
    error_message: String,
}

/// Builds a [`RequestError`] from an error response.
///
/// The upstream is not consistent about error bodies across status codes, so
/// anything that is not `{"error_message": ...}` is kept verbatim as the message.
pub fn classify(body: &[u8], status_code: u16) -> RequestError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.error_message,
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };

    RequestError {
        status_code,
        message,
    }
}

/// Returns the [`RequestError`] carried anywhere in the error chain.
pub fn find_request_error(err: &anyhow::Error) -> Option<&RequestError> {
    err.chain().find_map(|cause| cause.downcast_ref::<RequestError>())
}

/// Returns true if the error chain carries a failed HTTP exchange.
pub fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<TransportError>(),
            Some(TransportError::Send(_))
        )
    })
}
