//! Thread runs driven by a server-sent event stream.
//!
//! Run events are named `thread.run.<status>`; `thread.run.created` carries
//! the initial status in its payload. Every other event (messages, steps,
//! `done`, names this client does not know) is passed through by
//! [`StreamingRunOperation::next_update`] and ignored by the waits.

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use super::events::{BlockingEventStream, EventStream, ServerEvent};
use super::poller::{
    BlockingUpdateSource, OperationState, UpdateSource, WaitOutcome, wait, wait_blocking,
};
use super::rehydration::RunRehydrationToken;
use super::run::{
    RunState, cancel_request, run_path, steps_collection, steps_collection_from_token,
    submit_outputs_request,
};
use crate::client::{AssistantsClient, RequestOptions};
use crate::error::{Error, Result};
use crate::paging::{ListOptions, PageCollection, PageToken, RunStepsScope};
use crate::transport::{
    ApiRequest, ApiResponse, BlockingStreamingResponse, Response, StreamingResponse,
};
use crate::types::{RunStatus, RunStep, ThreadRun, ToolOutput};

const RUN_EVENT_PREFIX: &str = "thread.run.";

const NO_STREAM: &str =
    "no event stream is open; use wait_for_status_change or update_status instead";

/// Decode a run event. Returns `None` for events outside the run vocabulary.
fn decode_run_event(event: &ServerEvent) -> Result<Option<ThreadRun>> {
    let Some(name) = event.event_type.strip_prefix(RUN_EVENT_PREFIX) else {
        return Ok(None);
    };
    let status = match name {
        "created" => None,
        other => match RunStatus::from_name(other) {
            Some(status) => Some(status),
            None => return Ok(None),
        },
    };
    let mut run: ThreadRun = serde_json::from_str(&event.data).map_err(|e| {
        warn!(event_type = %event.event_type, error = %e, "unparseable run event");
        Error::Json(e)
    })?;
    if let Some(status) = status {
        run.status = status;
    }
    Ok(Some(run))
}

/// One event read from a run's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingUpdate {
    /// The event name, e.g. `thread.run.in_progress` or `thread.message.delta`.
    pub event_type: String,
    /// Raw event payload.
    pub data: String,
    /// The run carried by a run status event.
    pub run: Option<ThreadRun>,
}

impl StreamingUpdate {
    /// Parse the payload as JSON.
    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

/// Run status updates read off an async stream.
struct RunEvents<'a> {
    stream: &'a mut EventStream,
}

#[async_trait]
impl<'a> UpdateSource<Response<ThreadRun>> for RunEvents<'a> {
    async fn next_update(&mut self, options: &RequestOptions) -> Result<Option<Response<ThreadRun>>> {
        loop {
            options.check_cancelled()?;
            let Some(event) = self.stream.next_event().await else {
                return Ok(None);
            };
            let event = event?;
            match decode_run_event(&event)? {
                Some(run) => {
                    return Ok(Some(Response {
                        value: run,
                        raw: self.stream.head().clone(),
                    }));
                }
                None => trace!(event_type = %event.event_type, "skipping stream event"),
            }
        }
    }
}

/// Run status updates read off a blocking stream.
struct BlockingRunEvents<'a> {
    stream: &'a mut BlockingEventStream,
}

impl BlockingUpdateSource<Response<ThreadRun>> for BlockingRunEvents<'_> {
    fn next_update(&mut self, options: &RequestOptions) -> Result<Option<Response<ThreadRun>>> {
        loop {
            options.check_cancelled()?;
            let Some(event) = self.stream.next_event() else {
                return Ok(None);
            };
            let event = event?;
            match decode_run_event(&event)? {
                Some(run) => {
                    return Ok(Some(Response {
                        value: run,
                        raw: self.stream.head().clone(),
                    }));
                }
                None => trace!(event_type = %event.event_type, "skipping stream event"),
            }
        }
    }
}

/// A thread run whose status arrives over a server-sent event stream.
///
/// The stream is owned by the operation and closed as soon as a wait
/// returns, the stream ends, or reading it fails. Submitting tool outputs
/// opens a new stream for the same run. Streams opened through the async
/// methods are read by async methods; blocking methods read blocking
/// streams. An operation without an open stream (rehydrated, or after its
/// stream ended) can still be driven by [`update_status`](Self::update_status)
/// and [`wait_for_status_change`](Self::wait_for_status_change), which then
/// fetch the run directly.
pub struct StreamingRunOperation {
    client: AssistantsClient,
    state: RunState,
    events: Option<EventStream>,
    blocking_events: Option<BlockingEventStream>,
}

impl StreamingRunOperation {
    pub(crate) fn start(
        client: AssistantsClient,
        thread_id: String,
        response: StreamingResponse,
    ) -> Self {
        Self {
            client,
            state: RunState::new(thread_id, None),
            events: Some(EventStream::new(response)),
            blocking_events: None,
        }
    }

    pub(crate) fn start_blocking(
        client: AssistantsClient,
        thread_id: String,
        response: BlockingStreamingResponse,
    ) -> Self {
        Self {
            client,
            state: RunState::new(thread_id, None),
            events: None,
            blocking_events: Some(BlockingEventStream::new(response)),
        }
    }

    /// Resume a run known only by its ids, with no stream open.
    pub fn rehydrate(
        client: AssistantsClient,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            state: RunState::new(thread_id.into(), Some(run_id.into())),
            events: None,
            blocking_events: None,
        }
    }

    pub fn from_rehydration_token(client: AssistantsClient, token: &RunRehydrationToken) -> Self {
        Self::rehydrate(client, token.thread_id.clone(), token.run_id.clone())
    }

    pub fn thread_id(&self) -> &str {
        &self.state.thread_id
    }

    /// The run id; `None` until the first run event arrives.
    pub fn run_id(&self) -> Option<&str> {
        self.state.run_id.as_deref()
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.state.status
    }

    pub fn value(&self) -> Option<&ThreadRun> {
        self.state.value.as_ref()
    }

    pub fn raw_response(&self) -> Option<&ApiResponse> {
        self.state.raw.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    /// Whether the run is paused waiting for tool outputs not yet submitted.
    pub fn requires_action(&self) -> bool {
        self.state.requires_action()
    }

    pub fn has_open_stream(&self) -> bool {
        self.events.is_some() || self.blocking_events.is_some()
    }

    /// `None` until the run id is known.
    pub fn rehydration_token(&self) -> Option<RunRehydrationToken> {
        self.state.rehydration_token()
    }

    fn release(&mut self) {
        let had_stream = self.events.take().is_some() | self.blocking_events.take().is_some();
        if had_stream {
            debug!(thread_id = %self.state.thread_id, "closed run event stream");
        }
    }

    fn status_request(&self) -> Result<ApiRequest> {
        let run_id = self.state.known_run_id()?;
        Ok(ApiRequest::get(run_path(&self.state.thread_id, run_id)))
    }

    async fn fetch_status(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        options.check_cancelled()?;
        let response = self.client.send_json(self.status_request()?).await?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    fn fetch_status_blocking(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        options.check_cancelled()?;
        let response = self.client.send_json_blocking(self.status_request()?)?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Consume the stream until the run finishes or needs tool outputs.
    ///
    /// Fails with [`Error::IncompleteStream`] if the stream ends first; the
    /// run may still be going, so follow up with
    /// [`wait_for_status_change`](Self::wait_for_status_change). The stream
    /// is closed whichever way this returns.
    pub async fn wait_for_completion(&mut self, options: &RequestOptions) -> Result<WaitOutcome> {
        let result = match (self.state.outcome(), self.events.as_mut()) {
            (Some(outcome), _) => Ok(outcome),
            (None, Some(stream)) => wait(&mut self.state, &mut RunEvents { stream }, options).await,
            (None, None) => Err(Error::InvalidOperation(NO_STREAM.to_string())),
        };
        self.release();
        result
    }

    /// Blocking counterpart of [`wait_for_completion`](Self::wait_for_completion).
    pub fn wait_for_completion_blocking(&mut self, options: &RequestOptions) -> Result<WaitOutcome> {
        let result = match (self.state.outcome(), self.blocking_events.as_mut()) {
            (Some(outcome), _) => Ok(outcome),
            (None, Some(stream)) => {
                wait_blocking(&mut self.state, &mut BlockingRunEvents { stream }, options)
            }
            (None, None) => Err(Error::InvalidOperation(NO_STREAM.to_string())),
        };
        self.release();
        result
    }

    /// Return as soon as the run's status differs from the current one, or
    /// the run starts or stops waiting for tool outputs.
    ///
    /// Reads the stream when one is open, otherwise fetches the run once.
    /// When the stream ends without a change, returns the unchanged status.
    pub async fn wait_for_status_change(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        if self.is_completed() {
            self.release();
            return Ok(self.status());
        }
        let prior = (self.state.status, self.state.requires_action());
        let stream = match self.events.as_mut() {
            Some(stream) => stream,
            None => return self.fetch_status(options).await,
        };
        let mut source = RunEvents { stream };
        let changed = loop {
            match source.next_update(options).await {
                Ok(Some(update)) => {
                    self.state.apply_update(update);
                    if (self.state.status, self.state.requires_action()) != prior {
                        break Ok(true);
                    }
                }
                Ok(None) => break Ok(false),
                Err(error) => break Err(error),
            }
        };
        self.settle(changed)
    }

    /// Blocking counterpart of [`wait_for_status_change`](Self::wait_for_status_change).
    pub fn wait_for_status_change_blocking(
        &mut self,
        options: &RequestOptions,
    ) -> Result<Option<RunStatus>> {
        if self.is_completed() {
            self.release();
            return Ok(self.status());
        }
        let prior = (self.state.status, self.state.requires_action());
        let stream = match self.blocking_events.as_mut() {
            Some(stream) => stream,
            None => return self.fetch_status_blocking(options),
        };
        let mut source = BlockingRunEvents { stream };
        let changed = loop {
            match source.next_update(options) {
                Ok(Some(update)) => {
                    self.state.apply_update(update);
                    if (self.state.status, self.state.requires_action()) != prior {
                        break Ok(true);
                    }
                }
                Ok(None) => break Ok(false),
                Err(error) => break Err(error),
            }
        };
        self.settle(changed)
    }

    /// Close the stream unless the last read left it usable.
    fn settle(&mut self, stream_open: Result<bool>) -> Result<Option<RunStatus>> {
        match stream_open {
            Ok(true) if !self.is_completed() => Ok(self.status()),
            Ok(_) => {
                self.release();
                Ok(self.status())
            }
            Err(error) => {
                self.release();
                Err(error)
            }
        }
    }

    /// Apply the next run status update, from the stream or by fetching.
    pub async fn update_status(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        if self.is_completed() {
            return Ok(self.status());
        }
        let stream = match self.events.as_mut() {
            Some(stream) => stream,
            None => return self.fetch_status(options).await,
        };
        let next = RunEvents { stream }.next_update(options).await;
        match next {
            Ok(Some(update)) => {
                self.state.apply_update(update);
                self.settle(Ok(true))
            }
            Ok(None) => self.settle(Ok(false)),
            Err(error) => self.settle(Err(error)),
        }
    }

    /// Blocking counterpart of [`update_status`](Self::update_status).
    pub fn update_status_blocking(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        if self.is_completed() {
            return Ok(self.status());
        }
        let stream = match self.blocking_events.as_mut() {
            Some(stream) => stream,
            None => return self.fetch_status_blocking(options),
        };
        let next = BlockingRunEvents { stream }.next_update(options);
        match next {
            Ok(Some(update)) => {
                self.state.apply_update(update);
                self.settle(Ok(true))
            }
            Ok(None) => self.settle(Ok(false)),
            Err(error) => self.settle(Err(error)),
        }
    }

    fn observe(&mut self, event: ServerEvent, head: ApiResponse) -> Result<StreamingUpdate> {
        let run = decode_run_event(&event)?;
        if let Some(run) = &run {
            self.state.apply_update(Response {
                value: run.clone(),
                raw: head,
            });
        }
        Ok(StreamingUpdate {
            event_type: event.event_type,
            data: event.data,
            run,
        })
    }

    /// Read the next event of any kind, applying it if it is a run event.
    ///
    /// Returns `None` once the stream has ended or when none is open.
    pub async fn next_update(&mut self, options: &RequestOptions) -> Result<Option<StreamingUpdate>> {
        let Some(stream) = self.events.as_mut() else {
            return Ok(None);
        };
        let next = match options.check_cancelled() {
            Ok(()) => stream.next_event().await.map(|event| event.map(|e| (e, stream.head().clone()))),
            Err(error) => Some(Err(error)),
        };
        match next {
            Some(Ok((event, head))) => match self.observe(event, head) {
                Ok(update) => Ok(Some(update)),
                Err(error) => self.settle(Err(error)).map(|_| None),
            },
            Some(Err(error)) => self.settle(Err(error)).map(|_| None),
            None => {
                self.release();
                Ok(None)
            }
        }
    }

    /// Blocking counterpart of [`next_update`](Self::next_update).
    pub fn next_update_blocking(&mut self, options: &RequestOptions) -> Result<Option<StreamingUpdate>> {
        let Some(stream) = self.blocking_events.as_mut() else {
            return Ok(None);
        };
        let next = match options.check_cancelled() {
            Ok(()) => stream.next_event().map(|event| event.map(|e| (e, stream.head().clone()))),
            Err(error) => Some(Err(error)),
        };
        match next {
            Some(Ok((event, head))) => match self.observe(event, head) {
                Ok(update) => Ok(Some(update)),
                Err(error) => self.settle(Err(error)).map(|_| None),
            },
            Some(Err(error)) => self.settle(Err(error)).map(|_| None),
            None => {
                self.release();
                Ok(None)
            }
        }
    }

    /// Submit tool outputs and continue on a fresh event stream.
    ///
    /// Valid only while the run is in `requires_action` and no outputs have
    /// been submitted since; otherwise fails with [`Error::InvalidOperation`]
    /// without making a request.
    pub async fn submit_required_outputs(
        &mut self,
        tool_outputs: Vec<ToolOutput>,
        options: &RequestOptions,
    ) -> Result<()> {
        let run_id = self.state.ensure_requires_action()?.to_string();
        options.check_cancelled()?;
        let request =
            submit_outputs_request(&self.state.thread_id, &run_id, tool_outputs, Some(true))?;
        self.release();
        let response = self.client.send_streaming(request).await?;
        debug!(thread_id = %self.state.thread_id, run_id = %run_id, "reopened run event stream");
        self.events = Some(EventStream::new(response));
        self.state.outputs_submitted = true;
        Ok(())
    }

    /// Blocking counterpart of [`submit_required_outputs`](Self::submit_required_outputs).
    pub fn submit_required_outputs_blocking(
        &mut self,
        tool_outputs: Vec<ToolOutput>,
        options: &RequestOptions,
    ) -> Result<()> {
        let run_id = self.state.ensure_requires_action()?.to_string();
        options.check_cancelled()?;
        let request =
            submit_outputs_request(&self.state.thread_id, &run_id, tool_outputs, Some(true))?;
        self.release();
        let response = self.client.send_streaming_blocking(request)?;
        debug!(thread_id = %self.state.thread_id, run_id = %run_id, "reopened run event stream");
        self.blocking_events = Some(BlockingEventStream::new(response));
        self.state.outputs_submitted = true;
        Ok(())
    }

    fn cancel_run_request(&self) -> Result<ApiRequest> {
        if self.is_completed() {
            return Err(Error::InvalidOperation(format!(
                "run already finished as {}",
                self.state.status_name().unwrap_or_default()
            )));
        }
        Ok(cancel_request(&self.state.thread_id, self.state.known_run_id()?))
    }

    /// Ask the server to cancel the run. An open stream stays open and
    /// reports the cancellation.
    pub async fn cancel(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        let request = self.cancel_run_request()?;
        options.check_cancelled()?;
        let response = self.client.send_json(request).await?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Blocking counterpart of [`cancel`](Self::cancel).
    pub fn cancel_blocking(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        let request = self.cancel_run_request()?;
        options.check_cancelled()?;
        let response = self.client.send_json_blocking(request)?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Steps of this run. Fails until the run id is known.
    pub fn steps(&self, options: ListOptions) -> Result<PageCollection<RunStep, RunStepsScope>> {
        let run_id = self.state.known_run_id()?;
        Ok(steps_collection(&self.client, &self.state.thread_id, run_id, &options))
    }

    /// Steps of this run, resuming from a stored token.
    pub fn steps_from_token(
        &self,
        token: PageToken<RunStepsScope>,
    ) -> Result<PageCollection<RunStep, RunStepsScope>> {
        let run_id = self.state.known_run_id()?;
        steps_collection_from_token(&self.client, &self.state.thread_id, run_id, token)
    }
}

impl fmt::Debug for StreamingRunOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingRunOperation")
            .field("thread_id", &self.state.thread_id)
            .field("run_id", &self.state.run_id)
            .field("status", &self.state.status)
            .field("open_stream", &self.has_open_stream())
            .finish_non_exhaustive()
    }
}
