//! Request and response types for the assistants API.
//!
//! Only the fields the paging and operation runtime reads are modelled
//! strictly; everything else is optional so that newer server payloads keep
//! deserializing.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Lists
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope of every list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEnvelope<T> {
    /// Items on this page, in server order.
    pub data: Vec<T>,
    /// Whether the server holds more items past this page.
    #[serde(default)]
    pub has_more: bool,
    /// Id of the first item on this page.
    #[serde(default)]
    pub first_id: Option<String>,
    /// Id of the last item on this page.
    #[serde(default)]
    pub last_id: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Assistants, messages, steps
// ─────────────────────────────────────────────────────────────────────────────

/// An assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    /// Assistant ID.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Model the assistant runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Creation time (unix seconds).
    #[serde(default)]
    pub created_at: i64,
}

/// A message within a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// Message ID.
    pub id: String,
    /// Owning thread.
    #[serde(default)]
    pub thread_id: String,
    /// Author role (`user` or `assistant`).
    #[serde(default)]
    pub role: String,
    /// Run that produced the message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Creation time (unix seconds).
    #[serde(default)]
    pub created_at: i64,
}

/// A step taken by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStep {
    /// Step ID.
    pub id: String,
    /// Owning run.
    #[serde(default)]
    pub run_id: String,
    /// Owning thread.
    #[serde(default)]
    pub thread_id: String,
    /// Step type (`message_creation` or `tool_calls`).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Step status.
    #[serde(default)]
    pub status: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Runs
// ─────────────────────────────────────────────────────────────────────────────

/// Status of a thread run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }

    /// Parse a wire name. Unrecognized names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let status = match name {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            _ => return None,
        };
        Some(status)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run of an assistant on a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRun {
    /// Run ID.
    pub id: String,
    /// Owning thread.
    pub thread_id: String,
    /// Assistant executing the run.
    #[serde(default)]
    pub assistant_id: String,
    /// Current status.
    pub status: RunStatus,
    /// What the caller must supply before the run can continue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_action: Option<RequiredAction>,
    /// Last error, for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RunError>,
    /// Model used by the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Creation time (unix seconds).
    #[serde(default)]
    pub created_at: i64,
}

impl ThreadRun {
    /// Tool calls the caller must answer, if the run requires action.
    pub fn required_tool_calls(&self) -> &[RequiredToolCall] {
        self.required_action
            .as_ref()
            .and_then(|action| action.submit_tool_outputs.as_ref())
            .map(|outputs| outputs.tool_calls.as_slice())
            .unwrap_or_default()
    }
}

/// Action required from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredAction {
    /// Action type (`submit_tool_outputs`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Tool calls awaiting outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_tool_outputs: Option<SubmitToolOutputsAction>,
}

/// Tool calls awaiting outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitToolOutputsAction {
    /// The pending calls.
    pub tool_calls: Vec<RequiredToolCall>,
}

/// A single tool call the run is waiting on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredToolCall {
    /// Tool call ID, echoed back in [`ToolOutput::tool_call_id`].
    pub id: String,
    /// Call type (`function`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Function name and arguments.
    pub function: FunctionCall,
}

/// A function invocation requested by the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// Error details of a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
}

/// Output for one required tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The call being answered.
    pub tool_call_id: String,
    /// The output, usually JSON text.
    pub output: String,
}

impl ToolOutput {
    /// Create a tool output.
    pub fn new(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
        }
    }
}

/// Request to start a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRunRequest {
    /// Assistant to run.
    pub assistant_id: String,
    /// Model override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Instructions override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Appended to the assistant's instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
    /// Request an event stream instead of a JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl CreateRunRequest {
    /// Create a request for the given assistant.
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            ..Default::default()
        }
    }

    /// Set the instructions override.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Request to submit tool outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector store file batches
// ─────────────────────────────────────────────────────────────────────────────

/// Status of a vector store file batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    InProgress,
    Completed,
    Cancelled,
    Failed,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl BatchStatus {
    /// Whether the batch can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Cancelled | BatchStatus::Failed
        )
    }

    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Completed => "completed",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Failed => "failed",
            BatchStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCounts {
    #[serde(default)]
    pub in_progress: u32,
    #[serde(default)]
    pub completed: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub cancelled: u32,
    #[serde(default)]
    pub total: u32,
}

/// A batch of files being ingested into a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBatchJob {
    /// Batch ID.
    pub id: String,
    /// Owning vector store.
    pub vector_store_id: String,
    /// Current status.
    pub status: BatchStatus,
    /// Per-status file counts.
    #[serde(default)]
    pub file_counts: FileCounts,
    /// Creation time (unix seconds).
    #[serde(default)]
    pub created_at: i64,
}

/// Request to create a file batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileBatchRequest {
    /// Files to ingest.
    pub file_ids: Vec<String>,
}

/// A file associated with a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreFile {
    /// File ID.
    pub id: String,
    /// Owning vector store.
    #[serde(default)]
    pub vector_store_id: String,
    /// Ingestion status.
    #[serde(default)]
    pub status: String,
    /// Bytes used in the store.
    #[serde(default)]
    pub usage_bytes: u64,
    /// Creation time (unix seconds).
    #[serde(default)]
    pub created_at: i64,
}

/// Filter for batch file listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatusFilter {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl FileStatusFilter {
    /// Wire name of the filter.
    pub fn as_str(self) -> &'static str {
        match self {
            FileStatusFilter::InProgress => "in_progress",
            FileStatusFilter::Completed => "completed",
            FileStatusFilter::Failed => "failed",
            FileStatusFilter::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_terminal_set() {
        let terminal = [
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
            RunStatus::Expired,
            RunStatus::Incomplete,
        ];
        for status in terminal {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::RequiresAction,
            RunStatus::Cancelling,
            RunStatus::Unknown,
        ] {
            assert!(!status.is_terminal(), "{status} should not be terminal");
        }
    }

    #[test]
    fn test_run_status_unknown_value() {
        let status: RunStatus = serde_json::from_str(r#""paused""#).unwrap();
        assert_eq!(status, RunStatus::Unknown);
        assert_eq!(RunStatus::from_name("paused"), None);
        assert_eq!(
            RunStatus::from_name("requires_action"),
            Some(RunStatus::RequiresAction)
        );
    }

    #[test]
    fn test_thread_run_required_tool_calls() {
        let run: ThreadRun = serde_json::from_value(serde_json::json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{}"}
                    }]
                }
            }
        }))
        .unwrap();

        assert_eq!(run.required_tool_calls().len(), 1);
        assert_eq!(run.required_tool_calls()[0].function.name, "get_weather");
    }

    #[test]
    fn test_list_envelope_defaults() {
        let envelope: ListEnvelope<Assistant> =
            serde_json::from_str(r#"{"data": [{"id": "asst_1"}]}"#).unwrap();
        assert_eq!(envelope.data.len(), 1);
        assert!(!envelope.has_more);
        assert!(envelope.last_id.is_none());
    }

    #[test]
    fn test_batch_status_terminal_set() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
    }
}
