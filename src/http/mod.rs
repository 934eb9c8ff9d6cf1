//! HTTP request pipeline: retry policies, backoff, body replay and error
//! classification.

mod backoff;
mod client;
mod error;
mod policy;
mod retrier;

pub use backoff::{BackoffStrategy, ExponentialBackoff, LinearBackoff, NoBackoff};
pub use client::HttpClient;
pub use error::{RequestError, TransportError, classify, find_request_error, is_transport_error};
pub use policy::{DefaultRetryPolicy, RetryPolicy, StatusPolicy};
pub use retrier::Retrier;
