//! Backend abstraction for querydeck.
//!
//! The backend owns statement execution and exposes a request/response,
//! poll-only surface. The orchestrator consumes it through [`QueryBackend`];
//! the poller only needs the narrower [`ProgressSource`].

mod mock;
mod types;

pub use mock::{MockBackend, MockStatement};
pub use types::{Page, QueryId, QueryStatus, Row, Snapshot};

use crate::error::Result;
use async_trait::async_trait;

/// Request/response surface of the query backend.
///
/// All calls are async and may fail independently; none of them push.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Submits a batch of statements and returns one identifier per
    /// statement, in submission order.
    async fn submit_query(&self, connection_id: &str, text: &str) -> Result<Vec<QueryId>>;

    /// Blocks until the backend can produce a first meaningful view of the
    /// statement. Statement failures come back as an error snapshot.
    async fn wait_until_renderable(&self, query_id: QueryId) -> Result<Snapshot>;

    async fn get_query_status(&self, query_id: QueryId) -> Result<QueryStatus>;

    /// Number of pages materialized so far, if known.
    async fn get_page_count(&self, query_id: QueryId) -> Result<Option<u64>>;

    /// Returns `None` while the page has not been materialized yet.
    async fn fetch_page(&self, query_id: QueryId, page_index: u64) -> Result<Option<Page>>;
}

/// Progress observations used by the poller.
///
/// Kept apart from [`QueryBackend`] so a push-based source can stand in for
/// polling without touching submission or paging.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    async fn status(&self, query_id: QueryId) -> Result<QueryStatus>;

    async fn page_count(&self, query_id: QueryId) -> Result<Option<u64>>;

    /// Failure text of a statement observed in the error state.
    async fn error_message(&self, query_id: QueryId) -> Result<Option<String>>;
}

#[async_trait]
impl<B: QueryBackend + ?Sized> ProgressSource for B {
    async fn status(&self, query_id: QueryId) -> Result<QueryStatus> {
        self.get_query_status(query_id).await
    }

    async fn page_count(&self, query_id: QueryId) -> Result<Option<u64>> {
        self.get_page_count(query_id).await
    }

    async fn error_message(&self, query_id: QueryId) -> Result<Option<String>> {
        Ok(self.wait_until_renderable(query_id).await?.error)
    }
}
