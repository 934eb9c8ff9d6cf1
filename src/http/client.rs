//! HTTP client with built-in retry logic and error classification.

use anyhow::{Context, Result};
use log::debug;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Request};

use super::error::{TransportError, classify};
use super::retrier::Retrier;

const JSON_TYPE: &str = "application/json";

/// Sends requests through a [`Retrier`] and turns error statuses into
/// [`RequestError`](super::RequestError)s.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    retrier: Retrier,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client and retrier.
    pub fn new(client: Client, retrier: Retrier) -> Self {
        Self { client, retrier }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends the request and returns the raw response body.
    ///
    /// Responses with status >= 400 become a `RequestError` after the retry
    /// budget is spent; transport failures stay wrapped in a `TransportError`.
    #[tracing::instrument(skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn send(&self, mut request: Request) -> Result<Vec<u8>> {
        if !request.headers().contains_key(CONTENT_TYPE) {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(JSON_TYPE));
        }

        let response = self
            .retrier
            .execute(request, |req| {
                let client = self.client.clone();
                async move {
                    client
                        .execute(req)
                        .await
                        .map_err(TransportError::from)
                        .map_err(anyhow::Error::from)
                }
            })
            .await
            .context("failed to send request")?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .context("failed to read response body")?;
        debug!("received HTTP {} with {} bytes", status.as_u16(), body.len());

        if status.as_u16() >= 400 {
            return Err(classify(&body, status.as_u16()).into());
        }

        Ok(body.to_vec())
    }
}
