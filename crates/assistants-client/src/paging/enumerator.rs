//! Forward-only page iteration in blocking and async flavours.
//!
//! A [`PageResultEnumerator`] owns the iteration state (current result,
//! exhausted flag) once; the source behind it decides how a result is
//! fetched. Sources implement [`BlockingPageResults`], [`AsyncPageResults`],
//! or both, and the enumerator exposes [`advance`](PageResultEnumerator::advance)
//! and [`advance_async`](PageResultEnumerator::advance_async) accordingly.

use async_trait::async_trait;

use crate::error::Result;

/// What an enumerator needs to know about the results it walks.
pub trait PageResults {
    /// One fetched page.
    type Result;

    /// Whether another result follows `result`.
    fn has_next(&self, result: &Self::Result) -> bool;
}

/// A source that fetches results by blocking the caller.
pub trait BlockingPageResults: PageResults {
    /// Fetch the first result.
    fn fetch_first(&self) -> Result<Self::Result>;

    /// Fetch the result that follows `previous`.
    fn fetch_next(&self, previous: &Self::Result) -> Result<Self::Result>;
}

/// A source that fetches results asynchronously.
#[async_trait]
pub trait AsyncPageResults: PageResults + Send + Sync
where
    Self::Result: Send + Sync,
{
    /// Fetch the first result.
    async fn fetch_first(&self) -> Result<Self::Result>;

    /// Fetch the result that follows `previous`.
    async fn fetch_next(&self, previous: &Self::Result) -> Result<Self::Result>;
}

/// Which fetch the next advance has to make.
enum Step {
    Done,
    First,
    Next,
}

/// Single-pass cursor over the results of a [`PageResults`] source.
///
/// Nothing is fetched until the first advance. Once an advance returns
/// `false` (or fails) the enumerator stays exhausted; build a new one to
/// start over.
///
/// Not safe for concurrent advances; callers serialize access.
pub struct PageResultEnumerator<P: PageResults> {
    source: P,
    current: Option<P::Result>,
    has_next: bool,
}

impl<P: PageResults> PageResultEnumerator<P> {
    /// Wrap a source. Does not touch the network.
    pub fn new(source: P) -> Self {
        Self {
            source,
            current: None,
            has_next: true,
        }
    }

    /// The most recent result; `None` before the first successful advance.
    pub fn current(&self) -> Option<&P::Result> {
        self.current.as_ref()
    }

    /// Mutable access to the most recent result.
    pub fn current_mut(&mut self) -> Option<&mut P::Result> {
        self.current.as_mut()
    }

    /// Whether advancing can still yield a result.
    pub fn is_exhausted(&self) -> bool {
        !self.has_next
    }

    /// The wrapped source.
    pub fn source(&self) -> &P {
        &self.source
    }

    fn step(&self) -> Step {
        match (self.has_next, self.current.is_some()) {
            (false, _) => Step::Done,
            (true, false) => Step::First,
            (true, true) => Step::Next,
        }
    }

    fn record(&mut self, fetched: Result<P::Result>) -> Result<bool> {
        match fetched {
            Ok(result) => {
                self.has_next = self.source.has_next(&result);
                self.current = Some(result);
                Ok(true)
            }
            Err(error) => {
                // A failed fetch ends the iteration; nothing is skipped.
                self.has_next = false;
                Err(error)
            }
        }
    }
}

impl<P: BlockingPageResults> PageResultEnumerator<P> {
    /// Fetch the next result, blocking. Returns `false` once exhausted.
    pub fn advance(&mut self) -> Result<bool> {
        let fetched = match (self.step(), self.current.as_ref()) {
            (Step::Done, _) => return Ok(false),
            (Step::Next, Some(previous)) => self.source.fetch_next(previous),
            _ => self.source.fetch_first(),
        };
        self.record(fetched)
    }
}

impl<P> PageResultEnumerator<P>
where
    P: AsyncPageResults,
    P::Result: Send + Sync,
{
    /// Fetch the next result. Returns `false` once exhausted.
    pub async fn advance_async(&mut self) -> Result<bool> {
        let fetched = match (self.step(), self.current.as_ref()) {
            (Step::Done, _) => return Ok(false),
            (Step::Next, Some(previous)) => self.source.fetch_next(previous).await,
            _ => self.source.fetch_first().await,
        };
        self.record(fetched)
    }
}
