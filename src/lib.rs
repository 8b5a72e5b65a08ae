//! querydeck - client-side query execution orchestration.
//!
//! Turns a query batch into a set of result tabs, keeps running statements
//! up to date by polling a request/response backend, and loads result pages
//! on demand. This library exposes the core modules for use by the binary
//! and integration tests.

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;

pub use backend::{MockBackend, MockStatement, QueryBackend, QueryId, QueryStatus};
pub use config::{Config, OrchestratorSettings};
pub use error::{QueryDeckError, Result};
pub use orchestrator::{
    CompletionCallback, Generation, QueryOrchestrator, ResultTab, TabDisplayStatus, TabId,
    TabsView,
};
