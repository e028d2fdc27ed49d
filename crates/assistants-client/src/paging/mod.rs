//! Paginated collections.
//!
//! - [`token`]: serializable page tokens
//! - [`enumerator`]: forward-only page iteration
//! - [`collection`]: lazily fetched collections built on both

pub mod collection;
pub mod enumerator;
pub mod token;

pub use collection::{AllValues, CollectionPages, Page, PageCollection};
pub use enumerator::{AsyncPageResults, BlockingPageResults, PageResultEnumerator, PageResults};
pub use token::{
    AssistantsScope, BatchFilesScope, ListOptions, ListOrder, MessagesScope, PageScope, PageToken,
    RunStepsScope, RunsScope, TOKEN_VERSION,
};
