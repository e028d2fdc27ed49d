//! Vector stores API: file batches.

use crate::client::{AssistantsClient, RequestOptions};
use crate::error::Result;
use crate::lro::{BatchRehydrationToken, FileBatchOperation};
use crate::transport::ApiRequest;
use crate::types::{CreateFileBatchRequest, FileBatchJob};

/// Vector stores API client.
pub struct VectorStoresApi {
    client: AssistantsClient,
}

impl VectorStoresApi {
    pub(crate) fn new(client: AssistantsClient) -> Self {
        Self { client }
    }

    fn create_batch_request(vector_store_id: &str, file_ids: Vec<String>) -> Result<ApiRequest> {
        let body = serde_json::to_value(CreateFileBatchRequest { file_ids })?;
        Ok(ApiRequest::post(
            format!("vector_stores/{}/file_batches", vector_store_id),
            body,
        ))
    }

    /// Start ingesting files into a vector store.
    pub async fn create_file_batch(
        &self,
        vector_store_id: &str,
        file_ids: Vec<String>,
        options: &RequestOptions,
    ) -> Result<FileBatchOperation> {
        options.check_cancelled()?;
        let request = Self::create_batch_request(vector_store_id, file_ids)?;
        let response = self.client.send_json::<FileBatchJob>(request).await?;
        Ok(FileBatchOperation::new(self.client.clone(), response))
    }

    /// Blocking counterpart of [`create_file_batch`](Self::create_file_batch).
    pub fn create_file_batch_blocking(
        &self,
        vector_store_id: &str,
        file_ids: Vec<String>,
        options: &RequestOptions,
    ) -> Result<FileBatchOperation> {
        options.check_cancelled()?;
        let request = Self::create_batch_request(vector_store_id, file_ids)?;
        let response = self.client.send_json_blocking::<FileBatchJob>(request)?;
        Ok(FileBatchOperation::new(self.client.clone(), response))
    }

    /// Resume tracking a batch from its rehydration token.
    pub fn file_batch_operation(&self, token: &BatchRehydrationToken) -> FileBatchOperation {
        FileBatchOperation::rehydrate(self.client.clone(), token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{ScriptedTransport, batch_json, scripted_client};
    use crate::types::BatchStatus;

    #[test]
    fn test_create_file_batch_blocking() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_json(200, batch_json("vs_1", "vsfb_1", "in_progress"))
            .push_json(200, batch_json("vs_1", "vsfb_1", "completed"));
        let client = scripted_client(&transport);

        let mut operation = client
            .vector_stores()
            .create_file_batch_blocking(
                "vs_1",
                vec!["file_1".to_string(), "file_2".to_string()],
                &RequestOptions::new(),
            )
            .unwrap();
        assert_eq!(operation.batch_id(), "vsfb_1");

        let status = operation
            .wait_for_completion_blocking(&RequestOptions::new())
            .unwrap();
        assert_eq!(status, BatchStatus::Completed);

        let create = &transport.requests()[0];
        assert_eq!(create.path, "vector_stores/vs_1/file_batches");
        assert_eq!(create.body.as_ref().unwrap()["file_ids"][1], "file_2");
    }

    #[test]
    fn test_file_batch_operation_from_token() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = scripted_client(&transport);

        let operation = client
            .vector_stores()
            .file_batch_operation(&BatchRehydrationToken::new("vs_1", "vsfb_1"));

        assert_eq!(operation.vector_store_id(), "vs_1");
        assert_eq!(operation.status(), None);
        assert_eq!(transport.request_count(), 0);
    }
}
