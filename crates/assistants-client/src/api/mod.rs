//! API endpoint handles.

mod assistants;
mod threads;
mod vector_stores;

pub use assistants::AssistantsApi;
pub use threads::ThreadsApi;
pub use vector_stores::VectorStoresApi;
