//! Polled thread runs.

use std::time::Duration;

use tracing::debug;

use super::poller::{OperationState, StatusPoller, WaitOutcome, wait, wait_blocking};
use super::rehydration::RunRehydrationToken;
use crate::client::{AssistantsClient, RequestOptions};
use crate::error::{Error, Result};
use crate::paging::{ListOptions, PageCollection, PageToken, RunStepsScope};
use crate::transport::{ApiRequest, ApiResponse, Response};
use crate::types::{RunStatus, RunStep, SubmitToolOutputsRequest, ThreadRun, ToolOutput};

pub(crate) fn run_path(thread_id: &str, run_id: &str) -> String {
    format!("threads/{thread_id}/runs/{run_id}")
}

pub(crate) fn submit_outputs_request(
    thread_id: &str,
    run_id: &str,
    tool_outputs: Vec<ToolOutput>,
    stream: Option<bool>,
) -> Result<ApiRequest> {
    let body = serde_json::to_value(SubmitToolOutputsRequest {
        tool_outputs,
        stream,
    })?;
    Ok(ApiRequest::post(
        format!("{}/submit_tool_outputs", run_path(thread_id, run_id)),
        body,
    ))
}

pub(crate) fn cancel_request(thread_id: &str, run_id: &str) -> ApiRequest {
    ApiRequest::post(
        format!("{}/cancel", run_path(thread_id, run_id)),
        serde_json::json!({}),
    )
}

pub(crate) fn steps_collection(
    client: &AssistantsClient,
    thread_id: &str,
    run_id: &str,
    options: &ListOptions,
) -> PageCollection<RunStep, RunStepsScope> {
    let scope = RunStepsScope {
        thread_id: thread_id.to_string(),
        run_id: run_id.to_string(),
    };
    PageCollection::new(client.clone(), PageToken::from_options(scope, options))
}

pub(crate) fn steps_collection_from_token(
    client: &AssistantsClient,
    thread_id: &str,
    run_id: &str,
    token: PageToken<RunStepsScope>,
) -> Result<PageCollection<RunStep, RunStepsScope>> {
    let scope = token.scope();
    if scope.thread_id != thread_id || scope.run_id != run_id {
        return Err(Error::InvalidOperation(format!(
            "page token belongs to run {}/{}, not {thread_id}/{run_id}",
            scope.thread_id, scope.run_id
        )));
    }
    Ok(PageCollection::new(client.clone(), token))
}

/// Last known state of a run.
#[derive(Debug, Clone)]
pub(crate) struct RunState {
    pub(crate) thread_id: String,
    pub(crate) run_id: Option<String>,
    pub(crate) value: Option<ThreadRun>,
    pub(crate) status: Option<RunStatus>,
    pub(crate) raw: Option<ApiResponse>,
    /// Tool outputs went out and no newer status has been seen yet.
    pub(crate) outputs_submitted: bool,
}

impl RunState {
    pub(crate) fn new(thread_id: String, run_id: Option<String>) -> Self {
        Self {
            thread_id,
            run_id,
            value: None,
            status: None,
            raw: None,
            outputs_submitted: false,
        }
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.status.is_some_and(RunStatus::is_terminal)
    }

    /// The run id, if outputs may be submitted now.
    pub(crate) fn ensure_requires_action(&self) -> Result<&str> {
        if self.status != Some(RunStatus::RequiresAction) || self.outputs_submitted {
            let status = self.status.map_or("unknown", RunStatus::as_str);
            return Err(Error::InvalidOperation(format!(
                "cannot submit tool outputs while run is {status}"
            )));
        }
        self.known_run_id()
    }

    pub(crate) fn known_run_id(&self) -> Result<&str> {
        self.run_id
            .as_deref()
            .ok_or_else(|| Error::InvalidOperation("run id is not known yet".to_string()))
    }

    pub(crate) fn rehydration_token(&self) -> Option<RunRehydrationToken> {
        self.run_id
            .as_ref()
            .map(|run_id| RunRehydrationToken::new(self.thread_id.clone(), run_id.clone()))
    }
}

impl OperationState for RunState {
    type Update = Response<ThreadRun>;

    fn has_stopped(&self) -> bool {
        self.is_completed()
    }

    fn requires_action(&self) -> bool {
        self.status == Some(RunStatus::RequiresAction) && !self.outputs_submitted
    }

    fn apply_update(&mut self, update: Response<ThreadRun>) {
        if self.is_completed() {
            debug!(thread_id = %self.thread_id, "ignoring update for finished run");
            return;
        }
        let Response { value, raw } = update;
        if self.run_id.is_none() {
            self.run_id = Some(value.id.clone());
        }
        debug!(
            thread_id = %self.thread_id,
            run_id = %value.id,
            status = %value.status,
            "run status updated"
        );
        self.status = Some(value.status);
        self.value = Some(value);
        self.raw = Some(raw);
        self.outputs_submitted = false;
    }

    fn status_name(&self) -> Option<String> {
        self.status.map(|status| status.as_str().to_string())
    }
}

/// A thread run driven by polling its status.
///
/// Once the run reaches a terminal status the operation is frozen: later
/// updates are ignored and waits return immediately. A wait also returns,
/// without completing, when the run needs tool outputs; submit them with
/// [`submit_required_outputs`](Self::submit_required_outputs) and wait again.
#[derive(Debug, Clone)]
pub struct RunOperation {
    client: AssistantsClient,
    run_id: String,
    state: RunState,
    poll_interval: Duration,
}

impl RunOperation {
    pub(crate) fn new(client: AssistantsClient, response: Response<ThreadRun>) -> Self {
        let poll_interval = client.poll_interval();
        let run_id = response.value.id.clone();
        let mut state = RunState::new(response.value.thread_id.clone(), Some(run_id.clone()));
        state.apply_update(response);
        Self {
            client,
            run_id,
            state,
            poll_interval,
        }
    }

    /// Resume a run known only by its ids. Nothing is fetched until the
    /// first status update, which happens without waiting.
    pub fn rehydrate(
        client: AssistantsClient,
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        let poll_interval = client.poll_interval();
        let run_id = run_id.into();
        Self {
            client,
            state: RunState::new(thread_id.into(), Some(run_id.clone())),
            run_id,
            poll_interval,
        }
    }

    /// Resume a run from a token produced by [`rehydration_token`](Self::rehydration_token).
    pub fn from_rehydration_token(client: AssistantsClient, token: &RunRehydrationToken) -> Self {
        Self::rehydrate(client, token.thread_id.clone(), token.run_id.clone())
    }

    /// Override the client's poll interval for this operation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.state.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Last observed status; `None` for a rehydrated run not yet fetched.
    pub fn status(&self) -> Option<RunStatus> {
        self.state.status
    }

    /// Last observed run.
    pub fn value(&self) -> Option<&ThreadRun> {
        self.state.value.as_ref()
    }

    /// Response the last observed run came from.
    pub fn raw_response(&self) -> Option<&ApiResponse> {
        self.state.raw.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    /// Whether the run is paused waiting for tool outputs.
    pub fn requires_action(&self) -> bool {
        self.state.requires_action()
    }

    pub fn rehydration_token(&self) -> RunRehydrationToken {
        RunRehydrationToken::new(self.state.thread_id.clone(), self.run_id.clone())
    }

    fn status_request(&self) -> ApiRequest {
        ApiRequest::get(run_path(&self.state.thread_id, &self.run_id))
    }

    fn poller(&self) -> StatusPoller<ThreadRun> {
        StatusPoller::new(self.client.clone(), self.status_request(), self.poll_interval)
            .fetch_immediately(self.state.status.is_none())
    }

    /// Fetch the run once and apply it.
    pub async fn update_status(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        if self.is_completed() {
            return Ok(self.status());
        }
        options.check_cancelled()?;
        let response = self.client.send_json(self.status_request()).await?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Blocking counterpart of [`update_status`](Self::update_status).
    pub fn update_status_blocking(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        if self.is_completed() {
            return Ok(self.status());
        }
        options.check_cancelled()?;
        let response = self.client.send_json_blocking(self.status_request())?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Poll until the run finishes or needs tool outputs.
    ///
    /// A failed poll ends the wait with that error; the last observed
    /// status is kept.
    pub async fn poll_until_done(&mut self, options: &RequestOptions) -> Result<WaitOutcome> {
        let mut poller = self.poller();
        wait(&mut self.state, &mut poller, options).await
    }

    /// Blocking counterpart of [`poll_until_done`](Self::poll_until_done).
    pub fn poll_until_done_blocking(&mut self, options: &RequestOptions) -> Result<WaitOutcome> {
        let mut poller = self.poller();
        wait_blocking(&mut self.state, &mut poller, options)
    }

    /// Submit tool outputs for a run in `requires_action`.
    ///
    /// Fails with [`Error::InvalidOperation`] in any other status, without
    /// making a request.
    pub async fn submit_required_outputs(
        &mut self,
        tool_outputs: Vec<ToolOutput>,
        options: &RequestOptions,
    ) -> Result<()> {
        self.state.ensure_requires_action()?;
        options.check_cancelled()?;
        let request = submit_outputs_request(&self.state.thread_id, &self.run_id, tool_outputs, None)?;
        let response = self.client.send_json(request).await?;
        self.state.apply_update(response);
        Ok(())
    }

    /// Blocking counterpart of [`submit_required_outputs`](Self::submit_required_outputs).
    pub fn submit_required_outputs_blocking(
        &mut self,
        tool_outputs: Vec<ToolOutput>,
        options: &RequestOptions,
    ) -> Result<()> {
        self.state.ensure_requires_action()?;
        options.check_cancelled()?;
        let request = submit_outputs_request(&self.state.thread_id, &self.run_id, tool_outputs, None)?;
        let response = self.client.send_json_blocking(request)?;
        self.state.apply_update(response);
        Ok(())
    }

    /// Ask the server to cancel the run.
    pub async fn cancel(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        self.ensure_not_finished()?;
        options.check_cancelled()?;
        let response = self
            .client
            .send_json(cancel_request(&self.state.thread_id, &self.run_id))
            .await?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Blocking counterpart of [`cancel`](Self::cancel).
    pub fn cancel_blocking(&mut self, options: &RequestOptions) -> Result<Option<RunStatus>> {
        self.ensure_not_finished()?;
        options.check_cancelled()?;
        let response = self
            .client
            .send_json_blocking(cancel_request(&self.state.thread_id, &self.run_id))?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    fn ensure_not_finished(&self) -> Result<()> {
        match self.status() {
            Some(status) if status.is_terminal() => Err(Error::InvalidOperation(format!(
                "run {} already finished as {status}",
                self.run_id
            ))),
            _ => Ok(()),
        }
    }

    /// Steps of this run.
    pub fn steps(&self, options: ListOptions) -> PageCollection<RunStep, RunStepsScope> {
        steps_collection(&self.client, &self.state.thread_id, &self.run_id, &options)
    }

    /// Steps of this run, resuming from a stored token.
    ///
    /// Fails with [`Error::InvalidOperation`] for a token of another run.
    pub fn steps_from_token(
        &self,
        token: PageToken<RunStepsScope>,
    ) -> Result<PageCollection<RunStep, RunStepsScope>> {
        steps_collection_from_token(&self.client, &self.state.thread_id, &self.run_id, token)
    }
}
