//! Threads API: messages and runs.

use tracing::debug;

use crate::client::{AssistantsClient, RequestOptions};
use crate::error::Result;
use crate::lro::{RunOperation, StreamingRunOperation};
use crate::paging::{ListOptions, MessagesScope, PageCollection, PageToken, RunsScope};
use crate::transport::ApiRequest;
use crate::types::{CreateRunRequest, ThreadMessage, ThreadRun};

/// Threads API client.
pub struct ThreadsApi {
    client: AssistantsClient,
}

impl ThreadsApi {
    pub(crate) fn new(client: AssistantsClient) -> Self {
        Self { client }
    }

    /// List the messages of a thread.
    pub fn messages(
        &self,
        thread_id: &str,
        options: ListOptions,
    ) -> PageCollection<ThreadMessage, MessagesScope> {
        let scope = MessagesScope {
            thread_id: thread_id.to_string(),
        };
        PageCollection::new(self.client.clone(), PageToken::from_options(scope, &options))
    }

    /// List messages starting at a stored page token.
    pub fn messages_from_token(
        &self,
        token: PageToken<MessagesScope>,
    ) -> PageCollection<ThreadMessage, MessagesScope> {
        PageCollection::new(self.client.clone(), token)
    }

    /// List the runs of a thread.
    pub fn runs(&self, thread_id: &str, options: ListOptions) -> PageCollection<ThreadRun, RunsScope> {
        let scope = RunsScope {
            thread_id: thread_id.to_string(),
        };
        PageCollection::new(self.client.clone(), PageToken::from_options(scope, &options))
    }

    /// List runs starting at a stored page token.
    pub fn runs_from_token(&self, token: PageToken<RunsScope>) -> PageCollection<ThreadRun, RunsScope> {
        PageCollection::new(self.client.clone(), token)
    }

    fn create_run_request(thread_id: &str, mut request: CreateRunRequest, stream: bool) -> Result<ApiRequest> {
        request.stream = stream.then_some(true);
        let body = serde_json::to_value(&request)?;
        Ok(ApiRequest::post(format!("threads/{}/runs", thread_id), body))
    }

    /// Start a run and track it by polling.
    pub async fn create_run(
        &self,
        thread_id: &str,
        request: CreateRunRequest,
        options: &RequestOptions,
    ) -> Result<RunOperation> {
        options.check_cancelled()?;
        let request = Self::create_run_request(thread_id, request, false)?;
        let response = self.client.send_json::<ThreadRun>(request).await?;
        debug!(thread_id, run_id = %response.value.id, "run created");
        Ok(RunOperation::new(self.client.clone(), response))
    }

    /// Blocking counterpart of [`create_run`](Self::create_run).
    pub fn create_run_blocking(
        &self,
        thread_id: &str,
        request: CreateRunRequest,
        options: &RequestOptions,
    ) -> Result<RunOperation> {
        options.check_cancelled()?;
        let request = Self::create_run_request(thread_id, request, false)?;
        let response = self.client.send_json_blocking::<ThreadRun>(request)?;
        debug!(thread_id, run_id = %response.value.id, "run created");
        Ok(RunOperation::new(self.client.clone(), response))
    }

    /// Start a run and follow it over an event stream.
    pub async fn create_run_streaming(
        &self,
        thread_id: &str,
        request: CreateRunRequest,
        options: &RequestOptions,
    ) -> Result<StreamingRunOperation> {
        options.check_cancelled()?;
        let request = Self::create_run_request(thread_id, request, true)?;
        let response = self.client.send_streaming(request).await?;
        debug!(thread_id, "run event stream opened");
        Ok(StreamingRunOperation::start(
            self.client.clone(),
            thread_id.to_string(),
            response,
        ))
    }

    /// Blocking counterpart of [`create_run_streaming`](Self::create_run_streaming).
    pub fn create_run_streaming_blocking(
        &self,
        thread_id: &str,
        request: CreateRunRequest,
        options: &RequestOptions,
    ) -> Result<StreamingRunOperation> {
        options.check_cancelled()?;
        let request = Self::create_run_request(thread_id, request, true)?;
        let response = self.client.send_streaming_blocking(request)?;
        debug!(thread_id, "run event stream opened");
        Ok(StreamingRunOperation::start_blocking(
            self.client.clone(),
            thread_id.to_string(),
            response,
        ))
    }

    /// Resume polling an existing run.
    pub fn run_operation(&self, thread_id: &str, run_id: &str) -> RunOperation {
        RunOperation::rehydrate(self.client.clone(), thread_id, run_id)
    }

    /// Resume an existing run as a streaming operation, with no stream open.
    pub fn streaming_run_operation(&self, thread_id: &str, run_id: &str) -> StreamingRunOperation {
        StreamingRunOperation::rehydrate(self.client.clone(), thread_id, run_id)
    }
}
