//! Lazily fetched, token-addressed collections.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use futures::Stream;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::enumerator::{AsyncPageResults, BlockingPageResults, PageResultEnumerator, PageResults};
use super::token::{PageScope, PageToken};
use crate::client::{AssistantsClient, RequestOptions};
use crate::error::{Error, Result};
use crate::transport::ApiResponse;
use crate::types::ListEnvelope;

/// One fetched page: its items, the token that fetched it, and the token
/// for the page after it.
#[derive(Debug, Clone)]
pub struct Page<T, S> {
    values: Vec<T>,
    page_token: PageToken<S>,
    next_page_token: Option<PageToken<S>>,
    raw: ApiResponse,
}

impl<T: DeserializeOwned, S: PageScope> Page<T, S> {
    pub(crate) fn from_response(page_token: PageToken<S>, raw: ApiResponse) -> Result<Self> {
        let envelope: ListEnvelope<T> = raw.json()?;
        let next_page_token = page_token.next(envelope.has_more, envelope.last_id.as_deref());
        Ok(Self {
            values: envelope.data,
            page_token,
            next_page_token,
            raw,
        })
    }
}

impl<T, S> Page<T, S> {
    /// Items on this page, in server order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    pub(crate) fn take_values(&mut self) -> Vec<T> {
        std::mem::take(&mut self.values)
    }

    /// Token that re-fetches this page.
    pub fn page_token(&self) -> &PageToken<S> {
        &self.page_token
    }

    /// Token for the following page; `None` on the last page.
    pub fn next_page_token(&self) -> Option<&PageToken<S>> {
        self.next_page_token.as_ref()
    }

    pub fn has_next(&self) -> bool {
        self.next_page_token.is_some()
    }

    /// The response this page was parsed from.
    pub fn raw_response(&self) -> &ApiResponse {
        &self.raw
    }
}

/// A collection that fetches pages on demand.
///
/// Creating one makes no request. Pages can be fetched in order through
/// [`pages`](Self::pages) or directly by token through
/// [`get_page`](Self::get_page), which also serves resumption from a token
/// stored earlier.
pub struct PageCollection<T, S> {
    client: AssistantsClient,
    first_page_token: PageToken<S>,
    _values: PhantomData<fn() -> T>,
}

impl<T, S: Clone> Clone for PageCollection<T, S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            first_page_token: self.first_page_token.clone(),
            _values: PhantomData,
        }
    }
}

impl<T, S: fmt::Debug> fmt::Debug for PageCollection<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCollection")
            .field("first_page_token", &self.first_page_token)
            .finish_non_exhaustive()
    }
}

impl<T, S> PageCollection<T, S>
where
    T: DeserializeOwned + Send + Sync + 'static,
    S: PageScope,
{
    pub(crate) fn new(client: AssistantsClient, first_page_token: PageToken<S>) -> Self {
        Self {
            client,
            first_page_token,
            _values: PhantomData,
        }
    }

    /// Token of the page this collection starts at.
    pub fn first_page_token(&self) -> &PageToken<S> {
        &self.first_page_token
    }

    /// Fail with [`Error::InvalidOperation`] for a token of another parent.
    fn check_scope(&self, token: &PageToken<S>) -> Result<()> {
        if token.scope() != self.first_page_token.scope() {
            return Err(Error::InvalidOperation(format!(
                "page token for {:?} used on a collection of {:?}",
                token.scope(),
                self.first_page_token.scope()
            )));
        }
        Ok(())
    }

    /// Fetch the page named by `token`.
    ///
    /// Any token of this collection is accepted, not only the next one in
    /// sequence. Fetching the same token twice issues two requests. A token
    /// scoped to another thread, run or batch fails with
    /// [`Error::InvalidOperation`] without a request.
    pub async fn get_page(&self, token: &PageToken<S>, options: &RequestOptions) -> Result<Page<T, S>> {
        self.check_scope(token)?;
        options.check_cancelled()?;
        debug!(kind = S::KIND, after = ?token.after(), "fetching page");
        let raw = self.client.send(token.request()).await?;
        Page::from_response(token.clone(), raw)
    }

    /// Blocking counterpart of [`get_page`](Self::get_page).
    pub fn get_page_blocking(&self, token: &PageToken<S>, options: &RequestOptions) -> Result<Page<T, S>> {
        self.check_scope(token)?;
        options.check_cancelled()?;
        debug!(kind = S::KIND, after = ?token.after(), "fetching page");
        let raw = self.client.send_blocking(token.request())?;
        Page::from_response(token.clone(), raw)
    }

    /// Walk the pages in order, starting at the first page token.
    pub fn pages(&self, options: RequestOptions) -> PageResultEnumerator<CollectionPages<T, S>> {
        PageResultEnumerator::new(CollectionPages {
            collection: self.clone(),
            options,
        })
    }

    /// Every item of every page, in order.
    ///
    /// A failed page fetch is yielded as the final item; nothing after it
    /// is fetched.
    pub fn all_values(&self, options: RequestOptions) -> impl Stream<Item = Result<T>> + Send + 'static {
        let mut pages = self.pages(options);
        async_stream::stream! {
            loop {
                match pages.advance_async().await {
                    Ok(true) => {
                        let values = pages.current_mut().map(Page::take_values).unwrap_or_default();
                        for value in values {
                            yield Ok(value);
                        }
                    }
                    Ok(false) => break,
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                }
            }
        }
    }

    /// Blocking counterpart of [`all_values`](Self::all_values).
    pub fn all_values_blocking(&self, options: RequestOptions) -> AllValues<T, S> {
        AllValues {
            pages: self.pages(options),
            buffered: Vec::new().into_iter(),
            done: false,
        }
    }
}

/// The page source behind [`PageCollection::pages`].
pub struct CollectionPages<T, S> {
    collection: PageCollection<T, S>,
    options: RequestOptions,
}

impl<T, S> CollectionPages<T, S> {
    fn successor<'a>(&self, previous: &'a Page<T, S>) -> Result<&'a PageToken<S>> {
        previous
            .next_page_token()
            .ok_or_else(|| Error::InvalidOperation("page has no successor".to_string()))
    }
}

impl<T, S> PageResults for CollectionPages<T, S> {
    type Result = Page<T, S>;

    fn has_next(&self, result: &Page<T, S>) -> bool {
        result.has_next()
    }
}

impl<T, S> BlockingPageResults for CollectionPages<T, S>
where
    T: DeserializeOwned + Send + Sync + 'static,
    S: PageScope,
{
    fn fetch_first(&self) -> Result<Page<T, S>> {
        self.collection
            .get_page_blocking(&self.collection.first_page_token, &self.options)
    }

    fn fetch_next(&self, previous: &Page<T, S>) -> Result<Page<T, S>> {
        let token = self.successor(previous)?;
        self.collection.get_page_blocking(token, &self.options)
    }
}

#[async_trait]
impl<T, S> AsyncPageResults for CollectionPages<T, S>
where
    T: DeserializeOwned + Send + Sync + 'static,
    S: PageScope,
{
    async fn fetch_first(&self) -> Result<Page<T, S>> {
        self.collection
            .get_page(&self.collection.first_page_token, &self.options)
            .await
    }

    async fn fetch_next(&self, previous: &Page<T, S>) -> Result<Page<T, S>> {
        let token = self.successor(previous)?;
        self.collection.get_page(token, &self.options).await
    }
}

/// Blocking iterator over every item of a collection.
///
/// Yields `Err` at most once, after which it ends.
pub struct AllValues<T, S> {
    pages: PageResultEnumerator<CollectionPages<T, S>>,
    buffered: std::vec::IntoIter<T>,
    done: bool,
}

impl<T, S> Iterator for AllValues<T, S>
where
    T: DeserializeOwned + Send + Sync + 'static,
    S: PageScope,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(value) = self.buffered.next() {
                return Some(Ok(value));
            }
            if self.done {
                return None;
            }
            match self.pages.advance() {
                Ok(true) => {
                    self.buffered = self
                        .pages
                        .current_mut()
                        .map(Page::take_values)
                        .unwrap_or_default()
                        .into_iter();
                }
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}
