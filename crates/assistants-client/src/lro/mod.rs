//! Long-running operations.
//!
//! Runs and file batches are tracked by operation objects that remember
//! the last observed state and advance it on demand, by polling or from a
//! server-sent event stream. Operations can be rebuilt in another process
//! from a rehydration token.

pub mod batch;
pub mod events;
pub mod poller;
pub mod rehydration;
pub mod run;
pub mod streaming_run;

pub use batch::FileBatchOperation;
pub use events::{BlockingEventStream, EventStream, ServerEvent};
pub use poller::{
    BlockingUpdateSource, DEFAULT_POLL_INTERVAL, OperationState, StatusPoller, UpdateSource,
    WaitOutcome,
};
pub use rehydration::{BatchRehydrationToken, RehydrationToken, RunRehydrationToken};
pub use run::RunOperation;
pub use streaming_run::{StreamingRunOperation, StreamingUpdate};
