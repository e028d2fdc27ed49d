//! Main client implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::{AssistantsApi, ThreadsApi, VectorStoresApi};
use crate::error::{Error, ErrorResponse, Result};
use crate::lro::DEFAULT_POLL_INTERVAL;
use crate::transport::{
    ApiRequest, ApiResponse, BlockingStreamingResponse, BlockingTransport, ReqwestTransport,
    Response, StreamingResponse, Transport,
};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for streaming requests.
const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Assistants API client.
///
/// Hands out page collections and long-running operations. Every network
/// call comes in an async form and a `_blocking` form; which ones work
/// depends on the transports the client was built with.
///
/// # Example
///
/// ```no_run
/// use assistants_client::{AssistantsClient, ListOptions};
///
/// # async fn example() -> assistants_client::Result<()> {
/// let client = AssistantsClient::builder()
///     .base_url("http://localhost:8080/v1")
///     .auth_token("secret")
///     .build()?;
///
/// let messages = client.threads().messages("thread_abc", ListOptions::default());
/// let first = messages.get_page(messages.first_page_token(), &Default::default()).await?;
/// println!("{} messages on the first page", first.values().len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AssistantsClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
struct ClientInner {
    transport: Option<Arc<dyn Transport>>,
    blocking_transport: Option<Arc<dyn BlockingTransport>>,
    base_url: Option<Url>,
    poll_interval: Duration,
}

impl AssistantsClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL, when the client was built with one.
    pub fn base_url(&self) -> Option<&Url> {
        self.inner.base_url.as_ref()
    }

    /// Interval between status requests for polled operations.
    pub fn poll_interval(&self) -> Duration {
        self.inner.poll_interval
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the assistants API.
    pub fn assistants(&self) -> AssistantsApi {
        AssistantsApi::new(self.clone())
    }

    /// Access the threads API (messages and runs).
    pub fn threads(&self) -> ThreadsApi {
        ThreadsApi::new(self.clone())
    }

    /// Access the vector stores API (file batches).
    pub fn vector_stores(&self) -> VectorStoresApi {
        VectorStoresApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal request methods
    // ─────────────────────────────────────────────────────────────────────────

    fn transport(&self) -> Result<&dyn Transport> {
        self.inner
            .transport
            .as_deref()
            .ok_or_else(|| Error::Config("no async transport configured".to_string()))
    }

    fn blocking_transport(&self) -> Result<&dyn BlockingTransport> {
        self.inner.blocking_transport.as_deref().ok_or_else(|| {
            Error::Config(
                "no blocking transport configured; enable the `blocking` feature or supply one"
                    .to_string(),
            )
        })
    }

    /// Send a request, failing on non-success statuses.
    pub(crate) async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.transport()?.send(request).await?;
        check_status(response)
    }

    /// Blocking counterpart of [`send`](Self::send).
    pub(crate) fn send_blocking(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.blocking_transport()?.send(request)?;
        check_status(response)
    }

    /// Send a request and decode the JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Response<T>> {
        let raw = self.send(request).await?;
        let value = raw.json()?;
        Ok(Response { value, raw })
    }

    /// Blocking counterpart of [`send_json`](Self::send_json).
    pub(crate) fn send_json_blocking<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Response<T>> {
        let raw = self.send_blocking(request)?;
        let value = raw.json()?;
        Ok(Response { value, raw })
    }

    /// Send a request whose response is an event stream.
    pub(crate) async fn send_streaming(&self, request: ApiRequest) -> Result<StreamingResponse> {
        let response = self.transport()?.send_streaming(request).await?;
        if !(200..300).contains(&response.status) {
            let collected = response.collect().await?;
            return Err(error_from_response(&collected));
        }
        Ok(response)
    }

    /// Blocking counterpart of [`send_streaming`](Self::send_streaming).
    pub(crate) fn send_streaming_blocking(
        &self,
        request: ApiRequest,
    ) -> Result<BlockingStreamingResponse> {
        let response = self.blocking_transport()?.send_streaming(request)?;
        if !(200..300).contains(&response.status) {
            let collected = response.collect()?;
            return Err(error_from_response(&collected));
        }
        Ok(response)
    }
}

impl fmt::Debug for AssistantsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantsClient")
            .field("base_url", &self.inner.base_url)
            .field("poll_interval", &self.inner.poll_interval)
            .field("async", &self.inner.transport.is_some())
            .field("blocking", &self.inner.blocking_transport.is_some())
            .finish()
    }
}

/// Pass through success responses; turn anything else into an [`Error`].
pub(crate) fn check_status(response: ApiResponse) -> Result<ApiResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(error_from_response(&response))
    }
}

/// Extract an error from a failed response.
fn error_from_response(response: &ApiResponse) -> Error {
    let status = response.status;

    // Try to parse error response
    match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(err) => {
            if status == 404 {
                Error::NotFound(err.error.message)
            } else if status == 401 {
                Error::Auth(err.error.message)
            } else {
                Error::Api {
                    status,
                    code: err
                        .error
                        .code
                        .or(err.error.kind)
                        .unwrap_or_else(|| "unknown".to_string()),
                    message: err.error.message,
                }
            }
        }
        Err(_) => Error::Api {
            status,
            code: "unknown".to_string(),
            message: format!("HTTP {}", status),
        },
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    /// Options with no cancellation signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `token` at every wait and iteration boundary.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The cancellation signal, if one was given.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Whether the caller has asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Fail with [`Error::Cancelled`] if the caller has asked to stop.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Builder for creating an [`AssistantsClient`].
pub struct ClientBuilder {
    base_url: Option<String>,
    auth_token: Option<String>,
    timeout: Duration,
    stream_timeout: Duration,
    user_agent: Option<String>,
    poll_interval: Duration,
    transport: Option<Arc<dyn Transport>>,
    blocking_transport: Option<Arc<dyn BlockingTransport>>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth_token: None,
            timeout: DEFAULT_TIMEOUT,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            user_agent: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            transport: None,
            blocking_transport: None,
        }
    }

    /// Set the base URL of the API root (e.g. `https://host/v1`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the authentication token.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the streaming request timeout.
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the interval between status requests for polled operations.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Use a custom async transport instead of the reqwest one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom blocking transport.
    pub fn blocking_transport(mut self, transport: Arc<dyn BlockingTransport>) -> Self {
        self.blocking_transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<AssistantsClient> {
        // Parse and normalize base URL
        let base_url = match &self.base_url {
            Some(raw) => {
                let mut url = Url::parse(raw)?;
                if !url.path().ends_with('/') {
                    url.set_path(&format!("{}/", url.path()));
                }
                Some(url)
            }
            None => None,
        };

        let transport = match (&self.transport, &base_url) {
            (Some(transport), _) => Some(Arc::clone(transport)),
            (None, Some(url)) => {
                let http = reqwest::Client::builder()
                    .default_headers(self.default_headers()?)
                    .user_agent(self.user_agent_string())
                    .build()?;
                let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
                    http,
                    url.clone(),
                    self.timeout,
                    self.stream_timeout,
                ));
                Some(transport)
            }
            (None, None) => None,
        };

        let blocking_transport = match (&self.blocking_transport, &base_url) {
            (Some(transport), _) => Some(Arc::clone(transport)),
            (None, Some(url)) => self.default_blocking_transport(url)?,
            (None, None) => None,
        };

        if transport.is_none() && blocking_transport.is_none() {
            return Err(Error::Config("base_url is required".to_string()));
        }

        Ok(AssistantsClient {
            inner: Arc::new(ClientInner {
                transport,
                blocking_transport,
                base_url,
                poll_interval: self.poll_interval,
            }),
        })
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| Error::Config("Invalid auth token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn user_agent_string(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("assistants-client/{}", env!("CARGO_PKG_VERSION")))
    }

    #[cfg(feature = "blocking")]
    fn default_blocking_transport(&self, url: &Url) -> Result<Option<Arc<dyn BlockingTransport>>> {
        let http = reqwest::blocking::Client::builder()
            .default_headers(self.default_headers()?)
            .user_agent(self.user_agent_string())
            .build()?;
        Ok(Some(Arc::new(
            crate::transport::ReqwestBlockingTransport::new(
                http,
                url.clone(),
                self.timeout,
                self.stream_timeout,
            ),
        )))
    }

    #[cfg(not(feature = "blocking"))]
    fn default_blocking_transport(&self, _url: &Url) -> Result<Option<Arc<dyn BlockingTransport>>> {
        Ok(None)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("stream_timeout", &self.stream_timeout)
            .field("user_agent", &self.user_agent)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    #[test]
    fn test_builder_requires_base_url() {
        let result = ClientBuilder::new().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_with_base_url() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8080/v1")
            .build()
            .unwrap();

        assert_eq!(
            client.base_url().map(Url::as_str),
            Some("http://localhost:8080/v1/")
        );
        assert_eq!(client.poll_interval(), DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();

        assert_eq!(
            client.base_url().map(Url::as_str),
            Some("http://localhost:8080/v1/")
        );
    }

    #[test]
    fn test_builder_accepts_custom_transport_without_url() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = ClientBuilder::new()
            .transport(transport)
            .poll_interval(Duration::from_millis(5))
            .build()
            .unwrap();

        assert!(client.base_url().is_none());
        assert_eq!(client.poll_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_blocking_call_without_blocking_transport() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = ClientBuilder::new().transport(transport).build().unwrap();

        let result = client.send_blocking(ApiRequest::get("assistants"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_check_status_maps_error_envelope() {
        let body = r#"{"error": {"message": "No run found", "type": "invalid_request_error"}}"#;
        let err = check_status(ApiResponse::new(404, body)).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref m) if m == "No run found"));

        let body = r#"{"error": {"message": "busy", "type": "server_error", "code": "overloaded"}}"#;
        let err = check_status(ApiResponse::new(503, body)).unwrap_err();
        match err {
            Error::Api { status, code, .. } => {
                assert_eq!(status, 503);
                assert_eq!(code, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_status_without_envelope() {
        let err = check_status(ApiResponse::new(502, "bad gateway")).unwrap_err();
        assert!(matches!(err, Error::Api { status: 502, ref message, .. } if message == "HTTP 502"));
    }

    #[test]
    fn test_request_options_cancellation() {
        let token = CancellationToken::new();
        let options = RequestOptions::new().with_cancellation(token.clone());
        assert!(options.check_cancelled().is_ok());

        token.cancel();
        assert!(options.is_cancelled());
        assert!(matches!(options.check_cancelled(), Err(Error::Cancelled)));
        assert!(!RequestOptions::default().is_cancelled());
    }
}
