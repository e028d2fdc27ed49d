//! Assistants API.

use crate::client::{AssistantsClient, RequestOptions};
use crate::error::Result;
use crate::paging::{AssistantsScope, ListOptions, PageCollection, PageToken};
use crate::transport::ApiRequest;
use crate::types::Assistant;

/// Assistants API client.
pub struct AssistantsApi {
    client: AssistantsClient,
}

impl AssistantsApi {
    pub(crate) fn new(client: AssistantsClient) -> Self {
        Self { client }
    }

    /// List assistants.
    pub fn list(&self, options: ListOptions) -> PageCollection<Assistant, AssistantsScope> {
        let token = PageToken::from_options(AssistantsScope::default(), &options);
        PageCollection::new(self.client.clone(), token)
    }

    /// List assistants starting at a stored page token.
    pub fn list_from_token(
        &self,
        token: PageToken<AssistantsScope>,
    ) -> PageCollection<Assistant, AssistantsScope> {
        PageCollection::new(self.client.clone(), token)
    }

    /// Get an assistant by ID.
    pub async fn get(&self, id: &str, options: &RequestOptions) -> Result<Assistant> {
        options.check_cancelled()?;
        let response = self
            .client
            .send_json(ApiRequest::get(format!("assistants/{}", id)))
            .await?;
        Ok(response.into_value())
    }

    /// Blocking counterpart of [`get`](Self::get).
    pub fn get_blocking(&self, id: &str, options: &RequestOptions) -> Result<Assistant> {
        options.check_cancelled()?;
        let response = self
            .client
            .send_json_blocking(ApiRequest::get(format!("assistants/{}", id)))?;
        Ok(response.into_value())
    }
}
