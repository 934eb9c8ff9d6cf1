use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::debug;
use reqwest::{Method, Request, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use uuid::Uuid;

use super::models::{AccountResponse, CreateAccountRequest};
use crate::breaker::{CircuitBreaker, DEFAULT_COMMAND_NAME};
use crate::config::ClientConfig;
use crate::http::HttpClient;

/// Operations on the organisation accounts resource.
///
/// Error responses surface as [`RequestError`](crate::http::RequestError)
/// somewhere in the returned error chain; transport failures and open circuits
/// do not carry one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn create_account(&self, request: &CreateAccountRequest) -> Result<AccountResponse>;
    async fn fetch_account(&self, id: Uuid) -> Result<AccountResponse>;
    async fn delete_account(&self, id: Uuid, version: i64) -> Result<()>;
}

/// Account API client. Every call is retried per the configured policy and
/// guarded by a circuit breaker.
#[derive(Clone)]
pub struct AccountClient {
    base_url: String,
    http: HttpClient,
    breaker: Arc<CircuitBreaker>,
}

impl AccountClient {
    /// Creates a client for the API rooted at `base_url`
    /// (e.g. `http://localhost:8080/v1`).
    ///
    /// Fails without any network activity if `base_url` is not an absolute
    /// http(s) URL.
    #[tracing::instrument(skip(config))]
    pub fn new(base_url: &str, config: ClientConfig) -> Result<Self> {
        let parsed =
            Url::parse(base_url).with_context(|| format!("invalid url provided: {}", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
            bail!("invalid url provided: {}", base_url);
        }

        let http = HttpClient::new(config.build_http_client()?, config.retrier());
        let breaker = Arc::new(CircuitBreaker::new(DEFAULT_COMMAND_NAME, config.breaker));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            breaker,
        })
    }

    /// Replaces the client's breaker, e.g. to share one between several clients.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    /// Returns the base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the breaker guarding this client's calls.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    fn accounts_url(&self) -> String {
        format!("{}/organisation/accounts", self.base_url)
    }

    fn request(&self, method: Method, url: &str) -> Result<reqwest::RequestBuilder> {
        let url = Url::parse(url).with_context(|| format!("invalid request url: {}", url))?;
        Ok(self.http.inner().request(method, url))
    }

    async fn send_request(&self, request: Request) -> Result<Vec<u8>> {
        self.breaker
            .call(|| self.http.send(request))
            .await
            .context("failed to send request to an api")
    }

    async fn send_for<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let body = self.send_request(request).await?;
        serde_json::from_slice(&body).context("failed to unmarshal response body")
    }
}

#[async_trait]
impl AccountApi for AccountClient {
    #[tracing::instrument(skip(self, request), fields(id = %request.data.id))]
    async fn create_account(&self, request: &CreateAccountRequest) -> Result<AccountResponse> {
        debug!("Creating account {}...", request.data.id);

        let body = serde_json::to_vec(request).context("failed to serialize account body")?;
        let request = self
            .request(Method::POST, &self.accounts_url())?
            .body(body)
            .build()
            .context("failed to create a request to create a new account")?;

        self.send_for(request)
            .await
            .context("failed to send create account request")
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_account(&self, id: Uuid) -> Result<AccountResponse> {
        debug!("Fetching account {}...", id);

        let request = self
            .request(Method::GET, &format!("{}/{}", self.accounts_url(), id))?
            .build()
            .context("failed to create fetch account request")?;

        self.send_for(request)
            .await
            .context("failed to send fetch account request")
    }

    #[tracing::instrument(skip(self))]
    async fn delete_account(&self, id: Uuid, version: i64) -> Result<()> {
        debug!("Deleting account {} at version {}...", id, version);

        let request = self
            .request(Method::DELETE, &format!("{}/{}", self.accounts_url(), id))?
            .query(&[("version", version)])
            .build()
            .context("failed to create delete account request")?;

        self.send_request(request)
            .await
            .context("failed to send delete account request")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::models::{AccountAttributes, CreateAccountData};
    use crate::breaker::CircuitState;
    use crate::http::{RequestError, StatusPolicy, TransportError, find_request_error};
    use mockito::Matcher;
    use std::time::Duration;

    fn create_request() -> CreateAccountRequest {
        CreateAccountRequest {
            data: CreateAccountData::new(
                Uuid::new_v4(),
                AccountAttributes {
                    country: Some("GB".to_string()),
                    bank_id: Some("400300".to_string()),
                    bank_id_code: Some("GBDSC".to_string()),
                    bic: Some("NWBKGB22".to_string()),
                    name: vec!["Samantha Holder".to_string()],
                    ..Default::default()
                },
            ),
        }
    }

    fn response_body(request: &CreateAccountRequest) -> String {
        let data = &request.data;
        serde_json::json!({
            "data": {
                "id": data.id,
                "organisation_id": data.organisation_id,
                "type": data.kind,
                "version": 0,
                "attributes": data.attributes,
                "created_on": "2021-10-26T10:20:30.000Z",
                "modified_on": "2021-10-26T10:20:30.000Z"
            }
        })
        .to_string()
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(AccountClient::new("invalidURL", ClientConfig::default()).is_err());
        assert!(AccountClient::new("ftp://some-api.com", ClientConfig::default()).is_err());
    }

    #[test]
    fn test_new_accepts_valid_url() {
        let client = AccountClient::new("http://some-api.com/v1/", ClientConfig::default()).unwrap();
        assert_eq!(client.base_url(), "http://some-api.com/v1");
        assert_eq!(client.breaker().name(), DEFAULT_COMMAND_NAME);
    }

    #[tokio::test]
    async fn test_create_then_fetch_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let request = create_request();
        let id = request.data.id;

        let create_mock = server
            .mock("POST", "/v1/organisation/accounts")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "data": {"id": id, "type": "accounts"}
            })))
            .with_status(201)
            .with_body(response_body(&request))
            .create_async()
            .await;
        let fetch_mock = server
            .mock("GET", format!("/v1/organisation/accounts/{}", id).as_str())
            .with_status(200)
            .with_body(response_body(&request))
            .create_async()
            .await;

        let client =
            AccountClient::new(&format!("{}/v1", server.url()), ClientConfig::default()).unwrap();

        let created = client.create_account(&request).await.unwrap();
        let fetched = client.fetch_account(id).await.unwrap();

        create_mock.assert_async().await;
        fetch_mock.assert_async().await;
        assert_eq!(created.data.id, id);
        assert_eq!(fetched.data.id, id);
        assert_eq!(fetched.data.organisation_id, request.data.organisation_id);
        assert_eq!(fetched.data.attributes, request.data.attributes);
    }

    #[tokio::test]
    async fn test_create_returns_classified_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/organisation/accounts")
            .with_status(400)
            .with_body(r#"{"error_message":"validation failure list:\ncountry in body is required"}"#)
            .create_async()
            .await;

        let client = AccountClient::new(&server.url(), ClientConfig::default()).unwrap();
        let err = client.create_account(&create_request()).await.unwrap_err();

        let request_error = find_request_error(&err).unwrap();
        assert_eq!(request_error.status_code, 400);
        assert!(request_error.message.contains("country in body is required"));
        assert!(err.to_string().contains("create account"));
    }

    #[tokio::test]
    async fn test_delete_then_fetch_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let id = Uuid::new_v4();
        let path = format!("/organisation/accounts/{}", id);

        let delete_mock = server
            .mock("DELETE", path.as_str())
            .match_query(Matcher::UrlEncoded("version".into(), "0".into()))
            .with_status(204)
            .create_async()
            .await;
        let _fetch_mock = server
            .mock("GET", path.as_str())
            .with_status(404)
            .create_async()
            .await;

        let client = AccountClient::new(&server.url(), ClientConfig::default()).unwrap();

        client.delete_account(id, 0).await.unwrap();
        let err = client.fetch_account(id).await.unwrap_err();

        delete_mock.assert_async().await;
        assert_eq!(
            find_request_error(&err),
            Some(&RequestError {
                status_code: 404,
                message: String::new(),
            })
        );
    }

    #[tokio::test]
    async fn test_delete_version_conflict() {
        let mut server = mockito::Server::new_async().await;
        let id = Uuid::new_v4();
        let _m = server
            .mock("DELETE", format!("/organisation/accounts/{}", id).as_str())
            .match_query(Matcher::UrlEncoded("version".into(), "3".into()))
            .with_status(409)
            .with_body(r#"{"error_message":"invalid version"}"#)
            .create_async()
            .await;

        let client = AccountClient::new(&server.url(), ClientConfig::default()).unwrap();
        let err = client.delete_account(id, 3).await.unwrap_err();

        let request_error = find_request_error(&err).unwrap();
        assert_eq!(request_error.status_code, 409);
        assert_eq!(request_error.message, "invalid version");
    }

    #[tokio::test]
    async fn test_fetch_retries_per_default_policy() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .with_status(500)
            .expect(4)
            .create_async()
            .await;

        let config = ClientConfig::default().with_retries_on_default_policy(3);
        let client = AccountClient::new(&server.url(), config).unwrap();
        let err = client.fetch_account(Uuid::new_v4()).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(find_request_error(&err).unwrap().status_code, 500);
    }

    #[test_log::test(tokio::test)]
    async fn test_concurrent_fetches_on_cloned_client_stay_independent() {
        let mut server = mockito::Server::new_async().await;
        let healthy = create_request();
        let recovering = create_request();
        let failing_id = Uuid::new_v4();
        let missing_id = Uuid::new_v4();
        let path = |id: Uuid| format!("/organisation/accounts/{}", id);

        let failing_mock = server
            .mock("GET", path(failing_id).as_str())
            .with_status(500)
            .with_body(r#"{"error_message":"down"}"#)
            .expect(3)
            .create_async()
            .await;
        let missing_mock = server
            .mock("GET", path(missing_id).as_str())
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let healthy_mock = server
            .mock("GET", path(healthy.data.id).as_str())
            .with_status(200)
            .with_body(response_body(&healthy))
            .expect(1)
            .create_async()
            .await;
        // Mocks with hits still expected take priority over later ones
        let unavailable_mock = server
            .mock("GET", path(recovering.data.id).as_str())
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let recovered_mock = server
            .mock("GET", path(recovering.data.id).as_str())
            .with_status(200)
            .with_body(response_body(&recovering))
            .expect(1)
            .create_async()
            .await;

        let config = ClientConfig::default()
            .with_retries_on_default_policy(2)
            .with_linear_backoff(Duration::from_millis(5));
        let client = AccountClient::new(&server.url(), config).unwrap();
        let (a, b, c, d) = (client.clone(), client.clone(), client.clone(), client);

        let (failing, missing, fetched, recovered) = tokio::join!(
            a.fetch_account(failing_id),
            b.fetch_account(missing_id),
            c.fetch_account(healthy.data.id),
            d.fetch_account(recovering.data.id),
        );

        assert_eq!(
            find_request_error(&failing.unwrap_err()),
            Some(&RequestError {
                status_code: 500,
                message: "down".to_string(),
            })
        );
        assert_eq!(find_request_error(&missing.unwrap_err()).unwrap().status_code, 404);
        assert_eq!(fetched.unwrap().data.id, healthy.data.id);
        assert_eq!(recovered.unwrap().data.id, recovering.data.id);

        failing_mock.assert_async().await;
        missing_mock.assert_async().await;
        healthy_mock.assert_async().await;
        unavailable_mock.assert_async().await;
        recovered_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_retries_with_custom_policy_and_same_body() {
        let mut server = mockito::Server::new_async().await;
        let request = create_request();
        let mock = server
            .mock("POST", "/organisation/accounts")
            .match_body(Matcher::Exact(serde_json::to_string(&request).unwrap()))
            .with_status(409)
            .expect(3)
            .create_async()
            .await;

        let config = ClientConfig::default()
            .with_custom_retry_policy(StatusPolicy::new(400, 2))
            .with_linear_backoff(Duration::from_millis(1));
        let client = AccountClient::new(&server.url(), config).unwrap();
        let err = client.create_account(&request).await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(find_request_error(&err).unwrap().status_code, 409);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_server_has_no_status() {
        let client = AccountClient::new("http://127.0.0.1:1", ClientConfig::default()).unwrap();
        let err = client.fetch_account(Uuid::new_v4()).await.unwrap_err();

        assert!(find_request_error(&err).is_none());
    }

    #[tokio::test]
    async fn test_fetch_invalid_json_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = AccountClient::new(&server.url(), ClientConfig::default()).unwrap();
        let err = client.fetch_account(Uuid::new_v4()).await.unwrap_err();

        assert!(format!("{:#}", err).contains("unmarshal"));
        assert!(find_request_error(&err).is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_breaker_stops_flooding_failing_api() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .with_status(500)
            .with_body("server error")
            .expect(20)
            .create_async()
            .await;

        let client = AccountClient::new(&server.url(), ClientConfig::default()).unwrap();

        for _ in 0..40 {
            assert!(client.fetch_account(Uuid::new_v4()).await.is_err());
        }

        mock.assert_async().await;
        assert_eq!(client.breaker().state(), CircuitState::Open);

        let err = client.fetch_account(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(
            err.chain().find_map(|c| c.downcast_ref::<TransportError>()),
            Some(TransportError::CircuitOpen(_))
        ));

        client.breaker().reset();
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_shared_breaker_trips_both_clients() {
        let breaker = Arc::new(CircuitBreaker::new(
            "shared",
            crate::breaker::BreakerConfig {
                request_volume_threshold: 1,
                ..Default::default()
            },
        ));
        let first = AccountClient::new("http://127.0.0.1:1", ClientConfig::default())
            .unwrap()
            .with_breaker(Arc::clone(&breaker));
        let second = AccountClient::new("http://127.0.0.1:1", ClientConfig::default())
            .unwrap()
            .with_breaker(Arc::clone(&breaker));

        assert!(first.fetch_account(Uuid::new_v4()).await.is_err());
        let err = second.fetch_account(Uuid::new_v4()).await.unwrap_err();

        assert!(format!("{:#}", err).contains("circuit 'shared' is open"));
    }
}
