//! HTTP client for the employee directory API.
//!
//! ## Resilience
//!
//! Every call is bounded by the configured timeout. Failed attempts are
//! retried up to `max_retries` times with linear backoff (`n * step`):
//!
//! | Failure | GET | POST |
//! |---------|-----|------|
//! | `429 Too Many Requests` | retry | retry |
//! | `5xx` | retry | no retry |
//! | connect error | retry | retry |
//! | timeout / other send error | retry | no retry |
//!
//! Record fetches consult the cache first and fall back to a stale cached
//! copy when the directory cannot be reached.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use gatepass_core::{Clock, ServiceNo, SystemClock};

use super::cache::{CacheLookup, DirectoryCache};
use super::record::{AuthBundle, DirectoryRecord, DirectorySession, Envelope};
use super::{DirectoryError, DirectoryGateway};
use crate::config::{DirectoryConfig, Secret};

const EMPLOYEE_DETAILS_PATH: &str = "GetEmployeeDetails";
const AUTHENTICATE_PATH: &str = "common/authenticate";
const SUPERVISOR_HIERARCHY_PATH: &str = "GetSupervisorHierachy";

/// Linear backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub step: Duration,
}

impl RetryPolicy {
    /// Wait before the `retry`-th retry (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.step.saturating_mul(retry)
    }

    fn should_retry_status(status: StatusCode, idempotent: bool) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || (idempotent && status.is_server_error())
    }

    fn should_retry_error(err: &reqwest::Error, idempotent: bool) -> bool {
        if err.is_connect() {
            return true;
        }
        idempotent && (err.is_timeout() || err.is_request())
    }
}

/// Why a single logical call failed after retries.
#[derive(Debug)]
enum CallError {
    Status(StatusCode),
    Transport(String),
    Body(String),
}

impl core::fmt::Display for CallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CallError::Status(status) => write!(f, "unexpected status {status}"),
            CallError::Transport(msg) => write!(f, "transport error: {msg}"),
            CallError::Body(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

/// [`DirectoryGateway`] over the directory's REST API.
pub struct HttpDirectoryGateway<C: Clock = SystemClock> {
    http: ReqwestClient,
    enabled: bool,
    base_url: String,
    client_id: String,
    client_secret: Secret,
    auth_type_id: String,
    retry: RetryPolicy,
    cache: DirectoryCache<C>,
}

impl HttpDirectoryGateway<SystemClock> {
    pub fn new(config: &DirectoryConfig) -> Result<Self, DirectoryError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> HttpDirectoryGateway<C> {
    pub fn with_clock(config: &DirectoryConfig, clock: C) -> Result<Self, DirectoryError> {
        let http = ReqwestClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DirectoryError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .as_ref()
            .map(|u| u.as_str().trim_end_matches('/').to_string());

        Ok(Self {
            http,
            enabled: config.enabled && base_url.is_some(),
            base_url: base_url.unwrap_or_default(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_type_id: config.auth_type_id.clone(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                step: config.retry_step,
            },
            cache: DirectoryCache::with_clock(config.cache_ttl, config.cache_capacity, clock),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn with_client_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("clientId", &self.client_id)
            .header("clientSecret", self.client_secret.expose())
            .header("authenticationTypeId", &self.auth_type_id)
    }

    /// Execute with the retry policy. Returns the first non-retryable or
    /// final response; non-2xx statuses are errors.
    async fn send(&self, builder: RequestBuilder, idempotent: bool) -> Result<Response, CallError> {
        let attempts = self.retry.max_retries + 1;

        for attempt in 1..=attempts {
            let request = builder
                .try_clone()
                .ok_or_else(|| CallError::Transport("request body cannot be cloned".into()))?
                .build()
                .map_err(|e| CallError::Transport(e.to_string()))?;

            let method = request.method().clone();
            let path = request.url().path().to_string();
            debug!(attempt, %method, %path, "sending directory request");

            let last = attempt == attempts;
            match self.http.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if !last && RetryPolicy::should_retry_status(status, idempotent) {
                        debug!(attempt, %method, %path, %status, "retrying directory request");
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(CallError::Status(status));
                }
                Err(err) => {
                    if !last && RetryPolicy::should_retry_error(&err, idempotent) {
                        debug!(attempt, %method, %path, error = %err, "retrying directory request");
                        self.backoff(attempt).await;
                        continue;
                    }
                    return Err(CallError::Transport(err.to_string()));
                }
            }
        }

        Err(CallError::Transport("retries exhausted".into()))
    }

    async fn backoff(&self, retry: u32) {
        let delay = self.retry.delay(retry);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// `Ok(None)` when the directory answered but has no such employee.
    async fn fetch_remote(&self, service_no: &ServiceNo) -> Result<Option<DirectoryRecord>, CallError> {
        let builder = self
            .with_client_headers(self.http.get(self.url(EMPLOYEE_DETAILS_PATH)))
            .query(&[("queryParameter", "serviceNumber"), ("queryValue", service_no.as_str())]);

        let envelope: Envelope<Vec<DirectoryRecord>> = self
            .send(builder, true)
            .await?
            .json()
            .await
            .map_err(|e| CallError::Body(e.to_string()))?;

        if envelope.is_success == Some(false) {
            return Ok(None);
        }
        Ok(envelope.data_bundle.and_then(|records| records.into_iter().next()))
    }
}

#[async_trait]
impl<C: Clock + 'static> DirectoryGateway for HttpDirectoryGateway<C> {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[instrument(skip(self, service_no), fields(service_no = %service_no))]
    async fn fetch_by_service_no(&self, service_no: &ServiceNo) -> Result<DirectoryRecord, DirectoryError> {
        if !self.enabled {
            return Err(DirectoryError::Disabled);
        }
        if let CacheLookup::Fresh(record) = self.cache.lookup(service_no) {
            return Ok(record);
        }

        match self.fetch_remote(service_no).await {
            Ok(Some(record)) => {
                self.cache.insert(service_no.clone(), record.clone());
                Ok(record)
            }
            Ok(None) => Err(DirectoryError::NotFound),
            Err(err) => {
                warn!(error = %err, "employee lookup failed");
                match self.cache.get_any(service_no) {
                    Some(record) => {
                        warn!("serving stale directory record");
                        Ok(record)
                    }
                    None => Err(DirectoryError::NotFound),
                }
            }
        }
    }

    #[instrument(skip(self, password))]
    async fn authenticate(&self, username: &str, password: &str) -> Result<DirectorySession, DirectoryError> {
        if !self.enabled {
            return Err(DirectoryError::Disabled);
        }

        let builder = self
            .with_client_headers(self.http.post(self.url(AUTHENTICATE_PATH)))
            .json(&Credentials { username, password });

        let response = self.send(builder, false).await.map_err(|err| {
            warn!(error = %err, "directory authentication failed");
            DirectoryError::Rejected
        })?;

        let envelope: Envelope<AuthBundle> = response.json().await.map_err(|err| {
            warn!(error = %err, "directory authentication returned a malformed body");
            DirectoryError::Rejected
        })?;

        match (envelope.is_success, envelope.data_bundle) {
            (Some(true), Some(bundle)) => match bundle.token.filter(|t| !t.is_empty()) {
                Some(token) => Ok(DirectorySession {
                    token,
                    user: bundle.user.unwrap_or_default(),
                    expires_in: bundle.expires_in,
                }),
                None => Err(DirectoryError::Rejected),
            },
            _ => Err(DirectoryError::Rejected),
        }
    }

    #[instrument(skip(self, service_no), fields(service_no = %service_no))]
    async fn supervisor_hierarchy(&self, service_no: &ServiceNo) -> Result<Vec<DirectoryRecord>, DirectoryError> {
        if !self.enabled {
            return Err(DirectoryError::Disabled);
        }

        let builder = self
            .with_client_headers(self.http.get(self.url(SUPERVISOR_HIERARCHY_PATH)))
            .query(&[("serviceNumber", service_no.as_str())]);

        let response = self.send(builder, true).await.map_err(|err| {
            warn!(error = %err, "supervisor lookup failed");
            DirectoryError::Unavailable(err.to_string())
        })?;

        let envelope: Envelope<Vec<DirectoryRecord>> = response.json().await.map_err(|err| {
            warn!(error = %err, "supervisor lookup returned a malformed body");
            DirectoryError::Unavailable("malformed supervisor response".into())
        })?;

        envelope.data_bundle.ok_or(DirectoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use gatepass_core::ManualClock;
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(server: &MockServer) -> DirectoryConfig {
        DirectoryConfig {
            client_id: "gatepass".into(),
            client_secret: Secret::new("s3cret"),
            timeout: Duration::from_secs(2),
            retry_step: Duration::from_millis(1),
            ..DirectoryConfig::enabled_at(Url::parse(&server.uri()).unwrap())
        }
    }

    fn sn(s: &str) -> ServiceNo {
        ServiceNo::parse(s).unwrap()
    }

    fn employee_body() -> serde_json::Value {
        json!({
            "isSuccess": true,
            "dataBundle": [{
                "EMPLOYEE_NUMBER": "012345",
                "EMPLOYEE_FIRST_NAME": "Jane",
                "EMPLOYEE_SURNAME": "Perera",
                "EMPLOYEE_SALARY_GRADE": "A.2."
            }]
        })
    }

    #[tokio::test]
    async fn fetch_sends_credentials_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/GetEmployeeDetails"))
            .and(query_param("queryParameter", "serviceNumber"))
            .and(query_param("queryValue", "012345"))
            .and(header("clientId", "gatepass"))
            .and(header("clientSecret", "s3cret"))
            .and(header("authenticationTypeId", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(employee_body()))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        let record = gateway.fetch_by_service_no(&sn("012345")).await.unwrap();
        assert_eq!(record.first_name.as_deref(), Some("Jane"));

        // second read is served from cache
        gateway.fetch_by_service_no(&sn("012345")).await.unwrap();
    }

    #[tokio::test]
    async fn get_retries_server_errors_until_success() {
        let server = MockServer::start().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_json(employee_body())
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        assert!(gateway.fetch_by_service_no(&sn("012345")).await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        assert_eq!(
            gateway.fetch_by_service_no(&sn("012345")).await,
            Err(DirectoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn stale_record_is_served_when_directory_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(employee_body()))
            .mount(&server)
            .await;

        let clock = ManualClock::default();
        let gateway = HttpDirectoryGateway::with_clock(&config(&server), clock.clone()).unwrap();
        let fresh = gateway.fetch_by_service_no(&sn("012345")).await.unwrap();

        clock.advance(chrono::Duration::hours(1));
        server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let stale = gateway.fetch_by_service_no(&sn("012345")).await.unwrap();
        assert_eq!(stale, fresh);
    }

    #[tokio::test]
    async fn empty_bundle_and_malformed_body_are_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("queryValue", "000001"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"isSuccess": true, "dataBundle": []})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("queryValue", "000002"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        assert_eq!(
            gateway.fetch_by_service_no(&sn("000001")).await,
            Err(DirectoryError::NotFound)
        );
        assert_eq!(
            gateway.fetch_by_service_no(&sn("000002")).await,
            Err(DirectoryError::NotFound)
        );
    }

    #[tokio::test]
    async fn disabled_gateway_does_no_io() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut cfg = config(&server);
        cfg.enabled = false;
        let gateway = HttpDirectoryGateway::new(&cfg).unwrap();

        assert!(!gateway.is_enabled());
        assert_eq!(
            gateway.fetch_by_service_no(&sn("012345")).await,
            Err(DirectoryError::Disabled)
        );
        assert_eq!(
            gateway.authenticate("jdoe", "pw").await,
            Err(DirectoryError::Disabled)
        );
        assert_eq!(
            gateway.supervisor_hierarchy(&sn("012345")).await,
            Err(DirectoryError::Disabled)
        );
    }

    #[tokio::test]
    async fn authenticate_returns_directory_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/common/authenticate"))
            .and(body_json(json!({"username": "jdoe", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isSuccess": true,
                "dataBundle": {
                    "token": "erp-token",
                    "user": {"username": "jdoe", "role": "admin", "email": "jdoe@corp.example"},
                    "expiresIn": 3600
                }
            })))
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        let session = gateway.authenticate("jdoe", "pw").await.unwrap();
        assert_eq!(session.token, "erp-token");
        assert!(session.user.is_admin());
        assert_eq!(session.expires_in, Some(json!(3600)));
    }

    #[tokio::test]
    async fn authenticate_rejects_unsuccessful_answers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isSuccess": false,
                "dataBundle": null
            })))
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        assert_eq!(
            gateway.authenticate("jdoe", "bad").await,
            Err(DirectoryError::Rejected)
        );
    }

    #[tokio::test]
    async fn post_is_not_retried_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        assert_eq!(
            gateway.authenticate("jdoe", "pw").await,
            Err(DirectoryError::Rejected)
        );
    }

    #[tokio::test]
    async fn post_is_retried_on_rate_limit() {
        let server = MockServer::start().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        Mock::given(method("POST"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(429)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({
                        "isSuccess": true,
                        "dataBundle": {"token": "t", "user": {"username": "jdoe"}}
                    }))
                }
            })
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        assert!(gateway.authenticate("jdoe", "pw").await.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn supervisor_hierarchy_lists_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/GetSupervisorHierachy"))
            .and(query_param("serviceNumber", "012345"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "isSuccess": true,
                "dataBundle": [
                    {"EMPLOYEE_NUMBER": "000100", "EMPLOYEE_FIRST_NAME": "Boss"},
                    {"EMPLOYEE_NUMBER": "000001", "EMPLOYEE_FIRST_NAME": "Big Boss"}
                ]
            })))
            .mount(&server)
            .await;

        let gateway = HttpDirectoryGateway::new(&config(&server)).unwrap();
        let chain = gateway.supervisor_hierarchy(&sn("012345")).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].employee_number.as_deref(), Some("000100"));
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy {
            max_retries: 3,
            step: Duration::from_secs(2),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(3), Duration::from_secs(6));
    }
}
