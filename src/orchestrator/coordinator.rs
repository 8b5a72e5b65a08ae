//! Batch submission and per-statement tab initialization.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::tab::{ResultTab, MISSING_COLUMNS_MESSAGE};
use super::{Generation, Inner};
use crate::backend::{QueryId, QueryStatus, Snapshot};
use crate::error::QueryDeckError;

/// Message stored when the optional snapshot timeout expires.
pub const SNAPSHOT_TIMEOUT_MESSAGE: &str = "timed out waiting for query results";

/// What remains to be done for a statement once its snapshot is applied.
#[derive(Debug, PartialEq, Eq)]
enum Followup {
    Nothing,
    /// Non-tabular statement finished with this many affected rows.
    Complete(u64),
    /// Tabular statement finished; its page count decides the row total.
    CountPages,
    Poll,
}

impl Inner {
    /// Submits the batch and initializes its tabs in submission order.
    pub(super) async fn run_batch(
        self: &Arc<Self>,
        generation: Generation,
        text: &str,
        connection_id: &str,
    ) {
        let query_ids = match self.backend.submit_query(connection_id, text).await {
            Ok(ids) => ids,
            Err(e) => {
                self.record_submission_failure(generation, text, &e);
                return;
            }
        };

        debug!(%generation, statements = query_ids.len(), "Batch submitted");

        for query_id in query_ids {
            if !self.is_current(generation) {
                debug!(%generation, "Generation superseded, abandoning batch");
                return;
            }
            self.initialize_tab(generation, query_id, text).await;
        }

        info!(%generation, "All statements initialized");
    }

    fn record_submission_failure(&self, generation: Generation, text: &str, error: &QueryDeckError) {
        let mut state = self.state();
        if !state.tabs.is_current(generation) {
            debug!(%generation, error = %error, "Dropping submission failure of superseded generation");
            return;
        }

        warn!(%generation, error = %error, "Query submission failed");
        let id = state.tabs.allocate_tab_id();
        let mut tab = ResultTab::new(
            id,
            QueryId::SUBMISSION_FAILED,
            text,
            self.settings.title_max_chars,
        );
        tab.fail(&error.message());
        state.tabs.push(tab);
        self.publish(&state);
    }

    async fn initialize_tab(self: &Arc<Self>, generation: Generation, query_id: QueryId, text: &str) {
        {
            let mut state = self.state();
            if !state.tabs.is_current(generation) {
                return;
            }
            let id = state.tabs.allocate_tab_id();
            state.tabs.push(ResultTab::new(
                id,
                query_id,
                text,
                self.settings.title_max_chars,
            ));
            self.publish(&state);
        }

        let snapshot = self.wait_for_snapshot(query_id).await;

        match self.apply_snapshot(generation, query_id, snapshot) {
            Followup::Nothing => {}
            Followup::Complete(affected_rows) => self.notify_complete(generation, affected_rows),
            Followup::CountPages => self.finish_tabular(generation, query_id).await,
            Followup::Poll => self.start_polling(query_id, generation),
        }
    }

    /// The single blocking rendezvous per statement. Transport failures are
    /// folded into an error snapshot so they stay local to the tab.
    async fn wait_for_snapshot(&self, query_id: QueryId) -> Snapshot {
        let wait = self.backend.wait_until_renderable(query_id);
        let result = match self.settings.snapshot_timeout() {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%query_id, ?limit, "Snapshot wait timed out");
                    return Snapshot::failed(SNAPSHOT_TIMEOUT_MESSAGE);
                }
            },
            None => wait.await,
        };

        result.unwrap_or_else(|e| {
            warn!(%query_id, error = %e, "Snapshot request failed");
            Snapshot::failed(e.message())
        })
    }

    fn apply_snapshot(&self, generation: Generation, query_id: QueryId, snapshot: Snapshot) -> Followup {
        let mut state = self.state();
        if !state.tabs.is_current(generation) {
            debug!(%generation, %query_id, "Discarding snapshot of superseded generation");
            return Followup::Nothing;
        }
        let Some(tab) = state.tabs.tab_for_query_mut(query_id) else {
            debug!(%query_id, "Tab closed before its snapshot arrived");
            return Followup::Nothing;
        };

        let followup = if let Some(error) = snapshot.error {
            tab.fail(&error);
            Followup::Nothing
        } else if !snapshot.returns_values {
            tab.query_returns_results = Some(false);
            tab.affected_rows = snapshot.affected_rows;
            match snapshot.status {
                QueryStatus::Completed => {
                    tab.status = QueryStatus::Completed;
                    Followup::Complete(snapshot.affected_rows.unwrap_or(0))
                }
                QueryStatus::Error => {
                    tab.fail("");
                    Followup::Nothing
                }
                status => {
                    tab.status = status;
                    Followup::Nothing
                }
            }
        } else if let Some(columns) = snapshot.columns {
            tab.query_returns_results = Some(true);
            tab.set_columns(columns);
            // A page loaded while the snapshot was pending wins over the first page
            if tab.current_page_data.is_none() {
                if let Some(first_page) = snapshot.first_page {
                    tab.show_page(0, first_page);
                }
            }
            match snapshot.status {
                QueryStatus::Completed => {
                    tab.status = QueryStatus::Completed;
                    Followup::CountPages
                }
                QueryStatus::Error => {
                    tab.fail("");
                    Followup::Nothing
                }
                status => {
                    tab.status = status;
                    Followup::Poll
                }
            }
        } else {
            tab.query_returns_results = Some(true);
            tab.fail(MISSING_COLUMNS_MESSAGE);
            Followup::Nothing
        };

        self.publish(&state);
        followup
    }

    /// Fetches the page count of a tabular statement that finished within its
    /// snapshot, then reports completion.
    async fn finish_tabular(&self, generation: Generation, query_id: QueryId) {
        let page_count = match self.backend.get_page_count(query_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(%query_id, error = %e, "Page count request failed");
                None
            }
        };

        {
            let mut state = self.state();
            if !state.tabs.is_current(generation) {
                return;
            }
            if let Some(tab) = state.tabs.tab_for_query_mut(query_id) {
                if page_count.is_some() && tab.total_pages != page_count {
                    tab.total_pages = page_count;
                    self.publish(&state);
                }
            }
        }

        let total_rows = page_count.unwrap_or(0).saturating_mul(self.settings.page_size);
        self.notify_complete(generation, total_rows);
    }
}
