//! Paging and long-running operation runtime for the assistants REST API.
//!
//! This crate turns list endpoints into lazily fetched [`PageCollection`]s
//! addressed by serializable [`PageToken`]s, and tracks runs and vector
//! store file batches as long-running operations that advance by polling
//! or from a server-sent event stream.
//!
//! # Example
//!
//! ```no_run
//! use assistants_client::{
//!     AssistantsClient, CreateRunRequest, ListOptions, RequestOptions, Result, ToolOutput,
//!     WaitOutcome,
//! };
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<()> {
//! let client = AssistantsClient::builder()
//!     .base_url("http://localhost:8080/v1")
//!     .auth_token("secret")
//!     .build()?;
//! let options = RequestOptions::new();
//!
//! // Walk every message of a thread, fetching pages as needed
//! let messages = client.threads().messages("thread_abc", ListOptions::default());
//! let mut all = Box::pin(messages.all_values(options.clone()));
//! while let Some(message) = all.next().await {
//!     println!("{}", message?.id);
//! }
//!
//! // Start a run and drive it to completion
//! let mut run = client
//!     .threads()
//!     .create_run("thread_abc", CreateRunRequest::new("asst_abc"), &options)
//!     .await?;
//! while run.poll_until_done(&options).await? == WaitOutcome::ActionRequired {
//!     let outputs = run
//!         .value()
//!         .map(|run| run.required_tool_calls().to_vec())
//!         .unwrap_or_default()
//!         .into_iter()
//!         .map(|call| ToolOutput::new(call.id, "{}"))
//!         .collect();
//!     run.submit_required_outputs(outputs, &options).await?;
//! }
//! println!("run finished as {:?}", run.status());
//! # Ok(())
//! # }
//! ```
//!
//! # Call styles
//!
//! Every network call has an async form and a `_blocking` form. The
//! blocking forms need a blocking transport: enable the `blocking` feature
//! for the reqwest one, or supply your own through
//! [`ClientBuilder::blocking_transport`].
//!
//! # Resuming work
//!
//! - **Pages**: [`PageToken::encode`] / [`PageToken::decode`], then the
//!   `_from_token` entry points.
//! - **Operations**: [`RunRehydrationToken`] and [`BatchRehydrationToken`],
//!   then [`RunOperation::from_rehydration_token`] or
//!   [`FileBatchOperation::rehydrate`].

pub mod api;
pub mod client;
pub mod error;
pub mod lro;
pub mod paging;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod types;

pub use client::{AssistantsClient, ClientBuilder, RequestOptions};
pub use error::{Error, Result};
pub use lro::{
    BatchRehydrationToken, FileBatchOperation, RehydrationToken, RunOperation,
    RunRehydrationToken, StreamingRunOperation, StreamingUpdate, WaitOutcome,
};
pub use paging::{ListOptions, ListOrder, Page, PageCollection, PageResultEnumerator, PageToken};
pub use transport::{ApiRequest, ApiResponse, BlockingTransport, Response, Transport};
pub use types::*;
