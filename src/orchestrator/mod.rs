//! Query execution orchestrator.
//!
//! Drives submitted query batches against a poll-only backend and exposes a
//! race-free view of their tabs to a UI layer. Three parts share one state:
//!
//! - the coordinator (`coordinator.rs`) submits batches and initializes one
//!   tab per statement,
//! - the poller (`poller.rs`) refreshes status and page counts of running
//!   statements,
//! - the page fetcher (`pages.rs`) loads result pages on demand.
//!
//! No lock is held across an `.await`. Every async continuation re-checks its
//! [`Generation`] (and, for pages, its page token) inside the same critical
//! section that commits the mutation, so superseded work never becomes
//! visible. Each committed batch is published to observers as a whole
//! [`TabsView`].

mod coordinator;
mod pages;
mod poller;
mod tab;
mod tab_set;

pub use coordinator::SNAPSHOT_TIMEOUT_MESSAGE;
pub use tab::{
    tab_title, ResultTab, TabDisplayStatus, TabId, MISSING_COLUMNS_MESSAGE,
    UNKNOWN_ERROR_MESSAGE,
};
pub use tab_set::{Generation, TabsView};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::backend::{ProgressSource, QueryBackend, QueryId};
use crate::config::OrchestratorSettings;
use crate::error::{QueryDeckError, Result};
use poller::PollRegistry;
use tab_set::TabSet;

/// Invoked once per successfully completed statement with its total row
/// count (tabular) or affected row count (non-tabular).
pub type CompletionCallback = Arc<dyn Fn(u64) + Send + Sync>;

struct State {
    tabs: TabSet,
    pollers: PollRegistry,
    on_complete: Option<CompletionCallback>,
    disposed: bool,
}

struct Inner {
    backend: Arc<dyn QueryBackend>,
    progress: Arc<dyn ProgressSource>,
    settings: OrchestratorSettings,
    state: Mutex<State>,
    publisher: watch::Sender<TabsView>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands observers a fresh copy of the collection. Called with the state
    /// lock held so views are published in commit order.
    fn publish(&self, state: &State) {
        self.publisher.send_replace(state.tabs.view());
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.state().tabs.is_current(generation)
    }

    /// Invokes the completion callback of `generation`, unless superseded.
    fn notify_complete(&self, generation: Generation, rows: u64) {
        let callback = {
            let state = self.state();
            if !state.tabs.is_current(generation) {
                debug!(%generation, "Skipping completion of superseded generation");
                return;
            }
            state.on_complete.clone()
        };
        if let Some(callback) = callback {
            callback(rows);
        }
    }
}

/// Client-side orchestrator for one editor's query executions.
///
/// Instances are fully independent. Dropping the orchestrator disposes it.
pub struct QueryOrchestrator {
    inner: Arc<Inner>,
}

impl QueryOrchestrator {
    /// Creates an orchestrator whose poller observes progress through the
    /// backend itself.
    ///
    /// Fails with [`QueryDeckError::Config`] when `settings` do not validate.
    pub fn new<B>(backend: Arc<B>, settings: OrchestratorSettings) -> Result<Self>
    where
        B: QueryBackend + 'static,
    {
        let progress: Arc<dyn ProgressSource> = backend.clone();
        Self::with_progress_source(backend, progress, settings)
    }

    /// Creates an orchestrator with a separate progress source.
    pub fn with_progress_source(
        backend: Arc<dyn QueryBackend>,
        progress: Arc<dyn ProgressSource>,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let tabs = TabSet::new();
        let (publisher, _) = watch::channel(tabs.view());

        let inner = Inner {
            backend,
            progress,
            settings,
            state: Mutex::new(State {
                tabs,
                pollers: PollRegistry::default(),
                on_complete: None,
                disposed: false,
            }),
            publisher,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    /// Runs a query batch, superseding everything still in flight.
    ///
    /// Returns once every statement has reached its initial snapshot. A
    /// batch the backend refuses is not an `Err`: it shows up as a single
    /// error tab. `Err` is only returned after [`dispose`](Self::dispose).
    pub async fn execute_query(
        &self,
        query_text: &str,
        connection_id: &str,
        on_complete: Option<CompletionCallback>,
    ) -> Result<Generation> {
        let generation = {
            let mut state = self.inner.state();
            if state.disposed {
                return Err(QueryDeckError::Disposed);
            }
            let cancelled = state.pollers.cancel_all();
            let generation = state.tabs.begin_generation();
            state.on_complete = on_complete;
            self.inner.publish(&state);
            debug!(%generation, cancelled, "Cancelled pollers of previous generation");
            generation
        };

        info!(%generation, connection_id, "Executing query");
        self.inner
            .run_batch(generation, query_text.trim(), connection_id)
            .await;
        Ok(generation)
    }

    /// Loads page `page_index` of `query_id` into its tab.
    ///
    /// Only the most recent request per query is applied; a page that never
    /// materializes leaves the current page in place.
    pub async fn load_page(&self, query_id: QueryId, page_index: u64) {
        self.inner.load_page(query_id, page_index).await;
    }

    /// Closes a tab, stopping its poller.
    pub fn handle_result_tab_close(&self, tab_id: TabId) {
        let mut state = self.inner.state();
        let Some(closed) = state.tabs.close(tab_id) else {
            debug!(%tab_id, "Ignoring close of unknown tab");
            return;
        };
        state.pollers.cancel(closed.query_id);
        self.inner.publish(&state);
    }

    /// Makes a tab the active one.
    pub fn handle_result_tab_select(&self, tab_id: TabId) {
        let mut state = self.inner.state();
        if state.tabs.select(tab_id) {
            self.inner.publish(&state);
        } else {
            debug!(%tab_id, "Ignoring selection of unknown tab");
        }
    }

    pub fn tab_status(&self, tab: &ResultTab) -> TabDisplayStatus {
        tab.display_status()
    }

    /// Stops all polling and retires every pending continuation. Synchronous:
    /// no poll fires after this returns.
    pub fn dispose(&self) {
        let mut state = self.inner.state();
        if state.disposed {
            return;
        }
        state.disposed = true;
        let cancelled = state.pollers.cancel_all();
        state.tabs.invalidate();
        state.on_complete = None;
        self.inner.publish(&state);
        info!(cancelled, "Orchestrator disposed");
    }

    /// Returns the latest published view.
    pub fn snapshot(&self) -> TabsView {
        self.inner.publisher.borrow().clone()
    }

    /// Subscribes to published views.
    pub fn subscribe(&self) -> watch::Receiver<TabsView> {
        self.inner.publisher.subscribe()
    }

    pub fn generation(&self) -> Generation {
        self.inner.state().tabs.generation()
    }

    /// Number of live poll handles.
    pub fn active_pollers(&self) -> usize {
        self.inner.state().pollers.len()
    }

    pub fn is_polling(&self, query_id: QueryId) -> bool {
        self.inner.state().pollers.contains(query_id)
    }
}

impl Drop for QueryOrchestrator {
    fn drop(&mut self) {
        self.dispose();
    }
}
