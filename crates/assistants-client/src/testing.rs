//! In-memory transport for tests.
//!
//! [`ScriptedTransport`] answers requests from a queue of canned responses,
//! in order, and records every request it sees. It implements both
//! [`Transport`] and [`BlockingTransport`], so one script can drive either
//! call style.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::client::AssistantsClient;
use crate::error::{Error, Result};
use crate::transport::{
    ApiRequest, ApiResponse, BlockingStreamingResponse, BlockingTransport, StreamingResponse,
    Transport,
};

/// Streaming bodies are handed out in chunks this small so that event
/// parsing has to cope with split frames.
const STREAM_CHUNK: usize = 16;

enum Scripted {
    Response(ApiResponse),
    Events(String),
    Failure(String),
}

/// A transport that replays a script.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    /// Create an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: Scripted) -> &Self {
        self.script.lock().unwrap().push_back(entry);
        self
    }

    /// Queue a JSON response.
    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push(Scripted::Response(ApiResponse::new(status, body.to_string())))
    }

    /// Queue a list page. `first_id`/`last_id` come from the items' `id`.
    pub fn push_page(&self, items: Vec<Value>, has_more: bool) -> &Self {
        let first_id = items.first().and_then(|item| item.get("id")).cloned();
        let last_id = items.last().and_then(|item| item.get("id")).cloned();
        self.push_json(
            200,
            json!({
                "object": "list",
                "data": items,
                "has_more": has_more,
                "first_id": first_id,
                "last_id": last_id,
            }),
        )
    }

    /// Queue an event-stream response built from `(event type, data)` pairs.
    pub fn push_events<'a>(&self, events: impl IntoIterator<Item = (&'a str, Value)>) -> &Self {
        let body: String = events
            .into_iter()
            .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
            .collect();
        self.push(Scripted::Events(body))
    }

    /// Queue an event-stream response with a literal body.
    pub fn push_raw_events(&self, body: impl Into<String>) -> &Self {
        self.push(Scripted::Events(body.into()))
    }

    /// Queue a transport failure.
    pub fn push_failure(&self, message: impl Into<String>) -> &Self {
        self.push(Scripted::Failure(message.into()))
    }

    /// All requests seen so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests matching a method and path.
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.path == path)
            .count()
    }

    /// Number of scripted entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    fn next(&self, request: ApiRequest) -> Result<Scripted> {
        self.requests.lock().unwrap().push(request);
        self.script.lock().unwrap().pop_front().ok_or_else(|| {
            Error::Transport("ScriptedTransport: no more responses available".to_string())
        })
    }
}

fn event_stream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        BlockingTransport::send(self, request)
    }

    async fn send_streaming(&self, request: ApiRequest) -> Result<StreamingResponse> {
        let (status, headers, body) = match self.next(request)? {
            Scripted::Response(response) => (response.status, response.headers, response.body),
            Scripted::Events(body) => (200, event_stream_headers(), Bytes::from(body)),
            Scripted::Failure(message) => return Err(Error::Transport(message)),
        };
        let chunks: Vec<Result<Bytes>> = body
            .chunks(STREAM_CHUNK)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(StreamingResponse {
            status,
            headers,
            body: Box::pin(futures::stream::iter(chunks)),
        })
    }
}

impl BlockingTransport for ScriptedTransport {
    fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        match self.next(request)? {
            Scripted::Response(response) => Ok(response),
            Scripted::Events(body) => Ok(ApiResponse {
                status: 200,
                headers: event_stream_headers(),
                body: Bytes::from(body),
            }),
            Scripted::Failure(message) => Err(Error::Transport(message)),
        }
    }

    fn send_streaming(&self, request: ApiRequest) -> Result<BlockingStreamingResponse> {
        let (status, headers, body) = match self.next(request)? {
            Scripted::Response(response) => (response.status, response.headers, response.body),
            Scripted::Events(body) => (200, event_stream_headers(), Bytes::from(body)),
            Scripted::Failure(message) => return Err(Error::Transport(message)),
        };
        Ok(BlockingStreamingResponse {
            status,
            headers,
            body: Box::new(Cursor::new(body)),
        })
    }
}

/// A client wired to `transport` for both call styles, polling without delay.
pub fn scripted_client(transport: &Arc<ScriptedTransport>) -> AssistantsClient {
    scripted_client_with_interval(transport, Duration::ZERO)
}

/// A client wired to `transport` with a custom poll interval.
pub fn scripted_client_with_interval(
    transport: &Arc<ScriptedTransport>,
    poll_interval: Duration,
) -> AssistantsClient {
    let transport_async: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
    let transport_blocking: Arc<dyn BlockingTransport> =
        Arc::clone(transport) as Arc<dyn BlockingTransport>;
    AssistantsClient::builder()
        .transport(transport_async)
        .blocking_transport(transport_blocking)
        .poll_interval(poll_interval)
        .build()
        .expect("scripted client always has a transport")
}

/// JSON for a thread run with the given status.
pub fn run_json(thread_id: &str, run_id: &str, status: &str) -> Value {
    json!({
        "id": run_id,
        "object": "thread.run",
        "thread_id": thread_id,
        "assistant_id": "asst_1",
        "status": status,
        "created_at": 1_700_000_000,
    })
}

/// JSON for a file batch with the given status.
pub fn batch_json(vector_store_id: &str, batch_id: &str, status: &str) -> Value {
    json!({
        "id": batch_id,
        "object": "vector_store.file_batch",
        "vector_store_id": vector_store_id,
        "status": status,
        "file_counts": {"in_progress": 0, "completed": 0, "failed": 0, "cancelled": 0, "total": 0},
        "created_at": 1_700_000_000,
    })
}
