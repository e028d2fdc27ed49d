//! The wait loop shared by every long-running operation.
//!
//! An operation keeps its observable state in an [`OperationState`] and pulls
//! new observations from an update source: a [`StatusPoller`] that re-reads
//! a resource on an interval, or an event stream. [`wait`] and
//! [`wait_blocking`] drive the two together until the state says to stop.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::client::{AssistantsClient, RequestOptions};
use crate::error::{Error, Result};
use crate::transport::{ApiRequest, Response};

/// Interval between status requests when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Upper bound on a single blocking sleep, so cancellation is seen promptly.
const BLOCKING_SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The operation reached a terminal status.
    Completed,
    /// The operation is paused until the caller acts on it.
    ActionRequired,
}

/// Observable state of an operation.
pub trait OperationState {
    /// One observation from the server.
    type Update;

    /// Whether the operation reached a terminal status.
    fn has_stopped(&self) -> bool;

    /// Whether the operation is paused waiting for the caller.
    fn requires_action(&self) -> bool {
        false
    }

    /// Fold an observation into the state.
    fn apply_update(&mut self, update: Self::Update);

    /// Wire name of the last observed status, for diagnostics.
    fn status_name(&self) -> Option<String>;

    /// The outcome a wait should return now, if any.
    fn outcome(&self) -> Option<WaitOutcome> {
        if self.has_stopped() {
            Some(WaitOutcome::Completed)
        } else if self.requires_action() {
            Some(WaitOutcome::ActionRequired)
        } else {
            None
        }
    }
}

/// Produces observations asynchronously. `None` means no more will come.
#[async_trait]
pub trait UpdateSource<U: Send>: Send {
    async fn next_update(&mut self, options: &RequestOptions) -> Result<Option<U>>;
}

/// Produces observations by blocking the caller.
pub trait BlockingUpdateSource<U> {
    fn next_update(&mut self, options: &RequestOptions) -> Result<Option<U>>;
}

/// Apply updates from `source` until `state` stops or needs action.
///
/// Cancellation is checked before every update. A source that runs dry
/// before then fails with [`Error::IncompleteStream`].
pub async fn wait<S, U>(state: &mut S, source: &mut U, options: &RequestOptions) -> Result<WaitOutcome>
where
    S: OperationState + Send,
    S::Update: Send,
    U: UpdateSource<S::Update> + ?Sized,
{
    loop {
        if let Some(outcome) = state.outcome() {
            return Ok(outcome);
        }
        options.check_cancelled()?;
        match source.next_update(options).await? {
            Some(update) => state.apply_update(update),
            None => {
                return Err(Error::IncompleteStream {
                    last_status: state.status_name(),
                });
            }
        }
    }
}

/// Blocking counterpart of [`wait`].
pub fn wait_blocking<S, U>(state: &mut S, source: &mut U, options: &RequestOptions) -> Result<WaitOutcome>
where
    S: OperationState,
    U: BlockingUpdateSource<S::Update> + ?Sized,
{
    loop {
        if let Some(outcome) = state.outcome() {
            return Ok(outcome);
        }
        options.check_cancelled()?;
        match source.next_update(options)? {
            Some(update) => state.apply_update(update),
            None => {
                return Err(Error::IncompleteStream {
                    last_status: state.status_name(),
                });
            }
        }
    }
}

/// Re-reads a resource every `interval`.
///
/// The first read waits out the interval too, unless the poller was told
/// to fetch immediately (used when nothing is known about the resource yet).
pub struct StatusPoller<V> {
    client: AssistantsClient,
    request: ApiRequest,
    interval: Duration,
    fetch_immediately: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V> StatusPoller<V> {
    pub fn new(client: AssistantsClient, request: ApiRequest, interval: Duration) -> Self {
        Self {
            client,
            request,
            interval,
            fetch_immediately: false,
            _value: PhantomData,
        }
    }

    /// Skip the wait before the first read.
    pub fn fetch_immediately(mut self, immediately: bool) -> Self {
        self.fetch_immediately = immediately;
        self
    }

    /// Whether the next read should wait first. Consumes the skip.
    fn should_wait(&mut self) -> bool {
        !std::mem::take(&mut self.fetch_immediately)
    }
}

#[async_trait]
impl<V> UpdateSource<Response<V>> for StatusPoller<V>
where
    V: DeserializeOwned + Send + 'static,
{
    async fn next_update(&mut self, options: &RequestOptions) -> Result<Option<Response<V>>> {
        if self.should_wait() {
            sleep(self.interval, options).await?;
        }
        options.check_cancelled()?;
        trace!(path = %self.request.path, "polling status");
        let response = self.client.send_json(self.request.clone()).await?;
        Ok(Some(response))
    }
}

impl<V: DeserializeOwned> BlockingUpdateSource<Response<V>> for StatusPoller<V> {
    fn next_update(&mut self, options: &RequestOptions) -> Result<Option<Response<V>>> {
        if self.should_wait() {
            sleep_blocking(self.interval, options)?;
        }
        options.check_cancelled()?;
        trace!(path = %self.request.path, "polling status");
        let response = self.client.send_json_blocking(self.request.clone())?;
        Ok(Some(response))
    }
}

/// Sleep for `interval`, waking early with [`Error::Cancelled`].
async fn sleep(interval: Duration, options: &RequestOptions) -> Result<()> {
    if interval.is_zero() {
        return Ok(());
    }
    match options.cancellation() {
        Some(token) => tokio::select! {
            _ = tokio::time::sleep(interval) => Ok(()),
            _ = token.cancelled() => Err(Error::Cancelled),
        },
        None => {
            tokio::time::sleep(interval).await;
            Ok(())
        }
    }
}

fn sleep_blocking(interval: Duration, options: &RequestOptions) -> Result<()> {
    let mut remaining = interval;
    while !remaining.is_zero() {
        options.check_cancelled()?;
        let slice = remaining.min(BLOCKING_SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining -= slice;
    }
    Ok(())
}
