//! Request primitive consumed by the paging and operation runtime.
//!
//! Everything above this module speaks in [`ApiRequest`] and [`ApiResponse`].
//! A [`Transport`] (async) or [`BlockingTransport`] (sync) sends exactly one
//! request and hands back exactly one response; connection reuse, TLS and
//! retries are the transport's business. [`ReqwestTransport`] is the default
//! implementation, [`ReqwestBlockingTransport`] its blocking twin behind the
//! `blocking` feature.

use std::fmt;
use std::io::Read;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};

/// Body of a streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A single request against the API root.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API root, without a leading slash.
    pub path: String,
    /// Query parameters, in insertion order.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request with no query and no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into().trim_start_matches('/').to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body);
        request
    }

    /// Create a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a query parameter when a value is present.
    pub fn query_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Look up the first value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body bytes.
    pub body: Bytes,
}

impl ApiResponse {
    /// Create a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A decoded value together with the response it came from.
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded value.
    pub value: T,
    /// The raw response, kept for diagnostics.
    pub raw: ApiResponse,
}

impl<T> Response<T> {
    /// Discard the raw response.
    pub fn into_value(self) -> T {
        self.value
    }
}

/// A response whose body is consumed incrementally.
pub struct StreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body chunks.
    pub body: ByteStream,
}

impl StreamingResponse {
    /// Status and headers, with an empty body.
    pub fn head(&self) -> ApiResponse {
        ApiResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::new(),
        }
    }

    /// Read the whole body into memory.
    pub async fn collect(self) -> Result<ApiResponse> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        let mut body = Vec::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk);
        }
        Ok(ApiResponse {
            status: self.status,
            headers: self.headers,
            body: body.into(),
        })
    }
}

impl fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Blocking counterpart of [`StreamingResponse`].
pub struct BlockingStreamingResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body reader.
    pub body: Box<dyn Read + Send>,
}

impl BlockingStreamingResponse {
    /// Status and headers, with an empty body.
    pub fn head(&self) -> ApiResponse {
        ApiResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::new(),
        }
    }

    /// Read the whole body into memory.
    pub fn collect(mut self) -> Result<ApiResponse> {
        let mut body = Vec::new();
        self.body.read_to_end(&mut body)?;
        Ok(ApiResponse {
            status: self.status,
            headers: self.headers,
            body: body.into(),
        })
    }
}

impl fmt::Debug for BlockingStreamingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingStreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends one request and returns one response, asynchronously.
///
/// Implementations must not interpret status codes; a 4xx/5xx response is
/// still `Ok`. Only failures to obtain a response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and buffer the whole response.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Send a request and return the body as a byte stream.
    async fn send_streaming(&self, request: ApiRequest) -> Result<StreamingResponse>;
}

/// Sends one request and returns one response, blocking the caller.
pub trait BlockingTransport: Send + Sync {
    /// Send a request and buffer the whole response.
    fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Send a request and return the body as a reader.
    fn send_streaming(&self, request: ApiRequest) -> Result<BlockingStreamingResponse>;
}

fn join_url(base_url: &Url, request: &ApiRequest) -> Result<Url> {
    base_url.join(&request.path).map_err(Error::from)
}

fn event_stream_accept() -> HeaderValue {
    HeaderValue::from_static("text/event-stream")
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    stream_timeout: Duration,
}

impl ReqwestTransport {
    /// Create a transport. `base_url` must end with `/`.
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        timeout: Duration,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            timeout,
            stream_timeout,
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn builder(&self, request: &ApiRequest, timeout: Duration) -> Result<reqwest::RequestBuilder> {
        let url = join_url(&self.base_url, request)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .query(&request.query)
            .timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.builder(&request, self.timeout)?.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_streaming(&self, request: ApiRequest) -> Result<StreamingResponse> {
        let response = self
            .builder(&request, self.stream_timeout)?
            .header(ACCEPT, event_stream_accept())
            .send()
            .await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        Ok(StreamingResponse {
            status,
            headers,
            body: Box::pin(response.bytes_stream().map_err(Error::from)),
        })
    }
}

/// [`BlockingTransport`] backed by `reqwest::blocking`.
#[cfg(feature = "blocking")]
#[derive(Debug, Clone)]
pub struct ReqwestBlockingTransport {
    http: reqwest::blocking::Client,
    base_url: Url,
    timeout: Duration,
    stream_timeout: Duration,
}

#[cfg(feature = "blocking")]
impl ReqwestBlockingTransport {
    /// Create a transport. `base_url` must end with `/`.
    pub fn new(
        http: reqwest::blocking::Client,
        base_url: Url,
        timeout: Duration,
        stream_timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            timeout,
            stream_timeout,
        }
    }

    fn builder(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<reqwest::blocking::RequestBuilder> {
        let url = join_url(&self.base_url, request)?;
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .query(&request.query)
            .timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder)
    }
}

#[cfg(feature = "blocking")]
impl BlockingTransport for ReqwestBlockingTransport {
    fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.builder(&request, self.timeout)?.send()?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes()?;
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    fn send_streaming(&self, request: ApiRequest) -> Result<BlockingStreamingResponse> {
        let response = self
            .builder(&request, self.stream_timeout)?
            .header(ACCEPT, event_stream_accept())
            .send()?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        Ok(BlockingStreamingResponse {
            status,
            headers,
            body: Box::new(response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_strips_leading_slash() {
        let request = ApiRequest::get("/threads/t1/runs");
        assert_eq!(request.path, "threads/t1/runs");
        assert_eq!(request.method, Method::GET);
    }

    #[test]
    fn test_query_opt_skips_absent_values() {
        let request = ApiRequest::get("assistants")
            .query("limit", 20)
            .query_opt("after", None::<String>)
            .query_opt("order", Some("asc"));

        assert_eq!(request.query.len(), 2);
        assert_eq!(request.query_value("limit"), Some("20"));
        assert_eq!(request.query_value("order"), Some("asc"));
        assert_eq!(request.query_value("after"), None);
    }

    #[test]
    fn test_url_join() {
        let base = Url::parse("http://localhost:8080/v1/").unwrap();
        let url = join_url(&base, &ApiRequest::get("threads/t1/messages")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/threads/t1/messages");
    }

    #[test]
    fn test_response_success_range() {
        assert!(ApiResponse::new(200, "{}").is_success());
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(404, "").is_success());
    }

    #[tokio::test]
    async fn test_streaming_response_collect() {
        let chunks: Vec<Result<Bytes>> = vec![Ok(Bytes::from("ab")), Ok(Bytes::from("cd"))];
        let response = StreamingResponse {
            status: 500,
            headers: HeaderMap::new(),
            body: Box::pin(futures::stream::iter(chunks)),
        };
        let collected = response.collect().await.unwrap();
        assert_eq!(collected.status, 500);
        assert_eq!(&collected.body[..], b"abcd");
    }
}
