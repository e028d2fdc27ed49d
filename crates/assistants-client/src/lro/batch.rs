//! Vector store file batch ingestion.

use std::time::Duration;

use tracing::debug;

use super::poller::{OperationState, StatusPoller, wait, wait_blocking};
use super::rehydration::BatchRehydrationToken;
use crate::client::{AssistantsClient, RequestOptions};
use crate::error::{Error, Result};
use crate::paging::{BatchFilesScope, ListOptions, PageCollection, PageToken};
use crate::transport::{ApiRequest, ApiResponse, Response};
use crate::types::{BatchStatus, FileBatchJob, FileStatusFilter, VectorStoreFile};

#[derive(Debug, Clone, Default)]
struct BatchState {
    value: Option<FileBatchJob>,
    status: Option<BatchStatus>,
    raw: Option<ApiResponse>,
}

impl OperationState for BatchState {
    type Update = Response<FileBatchJob>;

    fn has_stopped(&self) -> bool {
        self.status.is_some_and(BatchStatus::is_terminal)
    }

    fn apply_update(&mut self, update: Response<FileBatchJob>) {
        if self.has_stopped() {
            return;
        }
        let Response { value, raw } = update;
        debug!(
            batch_id = %value.id,
            status = %value.status,
            completed = value.file_counts.completed,
            total = value.file_counts.total,
            "file batch status updated"
        );
        self.status = Some(value.status);
        self.value = Some(value);
        self.raw = Some(raw);
    }

    fn status_name(&self) -> Option<String> {
        self.status.map(|status| status.as_str().to_string())
    }
}

/// A batch of files being ingested into a vector store, driven by polling.
#[derive(Debug, Clone)]
pub struct FileBatchOperation {
    client: AssistantsClient,
    vector_store_id: String,
    batch_id: String,
    state: BatchState,
    poll_interval: Duration,
}

impl FileBatchOperation {
    pub(crate) fn new(client: AssistantsClient, response: Response<FileBatchJob>) -> Self {
        let poll_interval = client.poll_interval();
        let vector_store_id = response.value.vector_store_id.clone();
        let batch_id = response.value.id.clone();
        let mut state = BatchState::default();
        state.apply_update(response);
        Self {
            client,
            vector_store_id,
            batch_id,
            state,
            poll_interval,
        }
    }

    /// Resume a batch from its rehydration token. The first status update
    /// fetches without waiting.
    pub fn rehydrate(client: AssistantsClient, token: &BatchRehydrationToken) -> Self {
        let poll_interval = client.poll_interval();
        Self {
            client,
            vector_store_id: token.vector_store_id.clone(),
            batch_id: token.batch_id.clone(),
            state: BatchState::default(),
            poll_interval,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn vector_store_id(&self) -> &str {
        &self.vector_store_id
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn status(&self) -> Option<BatchStatus> {
        self.state.status
    }

    pub fn value(&self) -> Option<&FileBatchJob> {
        self.state.value.as_ref()
    }

    pub fn raw_response(&self) -> Option<&ApiResponse> {
        self.state.raw.as_ref()
    }

    /// Whether the batch completed, failed or was cancelled.
    pub fn is_completed(&self) -> bool {
        self.state.has_stopped()
    }

    /// Enough to rebuild this operation in another process.
    pub fn rehydration_token(&self) -> BatchRehydrationToken {
        BatchRehydrationToken::new(self.vector_store_id.clone(), self.batch_id.clone())
    }

    fn batch_path(&self) -> String {
        format!(
            "vector_stores/{}/file_batches/{}",
            self.vector_store_id, self.batch_id
        )
    }

    fn poller(&self) -> StatusPoller<FileBatchJob> {
        StatusPoller::new(
            self.client.clone(),
            ApiRequest::get(self.batch_path()),
            self.poll_interval,
        )
        .fetch_immediately(self.state.status.is_none())
    }

    /// Fetch the batch once and apply it.
    pub async fn update_status(&mut self, options: &RequestOptions) -> Result<Option<BatchStatus>> {
        if self.is_completed() {
            return Ok(self.status());
        }
        options.check_cancelled()?;
        let response = self.client.send_json(ApiRequest::get(self.batch_path())).await?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Blocking counterpart of [`update_status`](Self::update_status).
    pub fn update_status_blocking(&mut self, options: &RequestOptions) -> Result<Option<BatchStatus>> {
        if self.is_completed() {
            return Ok(self.status());
        }
        options.check_cancelled()?;
        let response = self
            .client
            .send_json_blocking(ApiRequest::get(self.batch_path()))?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Poll until the batch reaches a terminal status.
    pub async fn wait_for_completion(&mut self, options: &RequestOptions) -> Result<BatchStatus> {
        let mut poller = self.poller();
        wait(&mut self.state, &mut poller, options).await?;
        Ok(self.status().unwrap_or(BatchStatus::Unknown))
    }

    /// Blocking counterpart of [`wait_for_completion`](Self::wait_for_completion).
    pub fn wait_for_completion_blocking(&mut self, options: &RequestOptions) -> Result<BatchStatus> {
        let mut poller = self.poller();
        wait_blocking(&mut self.state, &mut poller, options)?;
        Ok(self.status().unwrap_or(BatchStatus::Unknown))
    }

    fn cancel_request(&self) -> Result<ApiRequest> {
        if let Some(status) = self.status().filter(|status| status.is_terminal()) {
            return Err(Error::InvalidOperation(format!(
                "file batch {} already finished as {status}",
                self.batch_id
            )));
        }
        Ok(ApiRequest::post(
            format!("{}/cancel", self.batch_path()),
            serde_json::json!({}),
        ))
    }

    /// Ask the server to stop ingesting the batch.
    pub async fn cancel(&mut self, options: &RequestOptions) -> Result<Option<BatchStatus>> {
        let request = self.cancel_request()?;
        options.check_cancelled()?;
        let response = self.client.send_json(request).await?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Blocking counterpart of [`cancel`](Self::cancel).
    pub fn cancel_blocking(&mut self, options: &RequestOptions) -> Result<Option<BatchStatus>> {
        let request = self.cancel_request()?;
        options.check_cancelled()?;
        let response = self.client.send_json_blocking(request)?;
        self.state.apply_update(response);
        Ok(self.status())
    }

    /// Files of this batch, optionally narrowed to one ingestion status.
    pub fn file_associations(
        &self,
        options: ListOptions,
        filter: Option<FileStatusFilter>,
    ) -> PageCollection<VectorStoreFile, BatchFilesScope> {
        let scope = BatchFilesScope {
            vector_store_id: self.vector_store_id.clone(),
            batch_id: self.batch_id.clone(),
            filter,
        };
        PageCollection::new(self.client.clone(), PageToken::from_options(scope, &options))
    }

    /// Files of this batch, resuming from a stored token.
    ///
    /// Fails with [`Error::InvalidOperation`] for a token of another batch.
    pub fn file_associations_from_token(
        &self,
        token: PageToken<BatchFilesScope>,
    ) -> Result<PageCollection<VectorStoreFile, BatchFilesScope>> {
        let scope = token.scope();
        if scope.vector_store_id != self.vector_store_id || scope.batch_id != self.batch_id {
            return Err(Error::InvalidOperation(format!(
                "page token belongs to batch {}/{}, not {}/{}",
                scope.vector_store_id, scope.batch_id, self.vector_store_id, self.batch_id
            )));
        }
        Ok(PageCollection::new(self.client.clone(), token))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::testing::{ScriptedTransport, batch_json, scripted_client};

    const BATCH_PATH: &str = "vector_stores/vs_1/file_batches/vsfb_1";

    fn operation(transport: &Arc<ScriptedTransport>, status: &str) -> FileBatchOperation {
        let body = batch_json("vs_1", "vsfb_1", status);
        let response = Response {
            value: serde_json::from_value(body.clone()).unwrap(),
            raw: ApiResponse::new(200, body.to_string()),
        };
        FileBatchOperation::new(scripted_client(transport), response)
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, batch_json("vs_1", "vsfb_1", "in_progress"))
            .push_json(200, batch_json("vs_1", "vsfb_1", "completed"));
        let mut operation = operation(&transport, "in_progress");

        let status = operation.wait_for_completion(&RequestOptions::new()).await.unwrap();

        assert_eq!(status, BatchStatus::Completed);
        assert!(operation.is_completed());
        assert_eq!(transport.count(Method::GET, BATCH_PATH), 2);
    }

    #[test]
    fn test_terminal_statuses() {
        for (status, terminal) in [
            ("in_progress", false),
            ("completed", true),
            ("cancelled", true),
            ("failed", true),
        ] {
            let transport = Arc::new(ScriptedTransport::new());
            assert_eq!(operation(&transport, status).is_completed(), terminal, "{status}");
        }
    }

    #[test]
    fn test_already_finished_makes_no_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut operation = operation(&transport, "failed")
            .with_poll_interval(Duration::from_secs(3600));

        let status = operation
            .wait_for_completion_blocking(&RequestOptions::new())
            .unwrap();

        assert_eq!(status, BatchStatus::Failed);
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_rehydrate_from_token_bytes() {
        use crate::lro::RehydrationToken;

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, batch_json("vs_1", "vsfb_1", "cancelled"));
        let bytes = operation(&transport, "in_progress")
            .rehydration_token()
            .to_bytes()
            .unwrap();

        let token = BatchRehydrationToken::from_bytes(&bytes).unwrap();
        let mut resumed = FileBatchOperation::rehydrate(scripted_client(&transport), &token)
            .with_poll_interval(Duration::from_secs(3600));
        assert_eq!(resumed.status(), None);

        let status = resumed
            .wait_for_completion_blocking(&RequestOptions::new())
            .unwrap();
        assert_eq!(status, BatchStatus::Cancelled);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, batch_json("vs_1", "vsfb_1", "cancelled"));
        let mut operation = operation(&transport, "in_progress");

        let status = operation.cancel(&RequestOptions::new()).await.unwrap();

        assert_eq!(status, Some(BatchStatus::Cancelled));
        assert_eq!(transport.count(Method::POST, &format!("{BATCH_PATH}/cancel")), 1);
        assert!(matches!(
            operation.cancel(&RequestOptions::new()).await,
            Err(Error::InvalidOperation(_))
        ));
    }

    #[tokio::test]
    async fn test_file_associations_with_filter() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_page(
            vec![json!({"id": "file_1", "vector_store_id": "vs_1", "status": "failed"})],
            false,
        );
        let operation = operation(&transport, "completed");

        let files = operation.file_associations(
            ListOptions::default().with_page_size(10),
            Some(FileStatusFilter::Failed),
        );
        let page = files
            .get_page(files.first_page_token(), &RequestOptions::new())
            .await
            .unwrap();

        assert_eq!(page.values()[0].id, "file_1");
        let request = &transport.requests()[0];
        assert_eq!(request.path, format!("{BATCH_PATH}/files"));
        assert_eq!(request.query_value("filter"), Some("failed"));
        assert_eq!(request.query_value("limit"), Some("10"));
    }

    #[test]
    fn test_file_associations_token_must_match_batch() {
        let transport = Arc::new(ScriptedTransport::new());
        let operation = operation(&transport, "completed");

        let foreign = PageToken::new(BatchFilesScope {
            vector_store_id: "vs_1".to_string(),
            batch_id: "vsfb_other".to_string(),
            filter: None,
        });
        assert!(matches!(
            operation.file_associations_from_token(foreign),
            Err(Error::InvalidOperation(_))
        ));

        let own = operation
            .file_associations(ListOptions::default(), Some(FileStatusFilter::Completed))
            .first_page_token()
            .clone()
            .with_after("file_9");
        let resumed = operation.file_associations_from_token(own).unwrap();
        assert_eq!(resumed.first_page_token().after(), Some("file_9"));
        assert_eq!(
            resumed.first_page_token().scope().filter,
            Some(FileStatusFilter::Completed)
        );
    }
}
