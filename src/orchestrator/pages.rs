//! On-demand result page loading.
//!
//! Pages may not be materialized when asked for, so a fetch retries on a
//! fixed spacing up to a bounded number of attempts. A newer request for the
//! same query supersedes older ones: their results are dropped.

use tracing::{debug, warn};

use super::tab_set::PageToken;
use super::{Generation, Inner};
use crate::backend::{Page, QueryId};

impl Inner {
    pub(super) async fn load_page(&self, query_id: QueryId, page_index: u64) {
        let (generation, token) = {
            let mut state = self.state();
            if state.disposed {
                debug!(%query_id, page_index, "Ignoring page request after dispose");
                return;
            }
            let Some(tab) = state.tabs.tab_for_query(query_id) else {
                debug!(%query_id, page_index, "No tab for page request");
                return;
            };
            if tab.error.is_some() {
                debug!(%query_id, page_index, "Ignoring page request for failed statement");
                return;
            }
            let token = state.tabs.issue_page_token(query_id);
            (state.tabs.generation(), token)
        };

        let Some(page) = self
            .fetch_with_retries(query_id, page_index, generation, token)
            .await
        else {
            return;
        };

        let mut state = self.state();
        if !state.tabs.is_current(generation) || !state.tabs.is_latest_page_token(query_id, token)
        {
            debug!(%query_id, page_index, "Discarding superseded page");
            return;
        }
        let Some(tab) = state.tabs.tab_for_query_mut(query_id) else {
            return;
        };
        if tab.error.is_some() {
            return;
        }
        tab.show_page(page_index, page);
        self.publish(&state);
    }

    fn page_request_is_live(
        &self,
        query_id: QueryId,
        generation: Generation,
        token: PageToken,
    ) -> bool {
        let state = self.state();
        state.tabs.is_current(generation) && state.tabs.is_latest_page_token(query_id, token)
    }

    async fn fetch_with_retries(
        &self,
        query_id: QueryId,
        page_index: u64,
        generation: Generation,
        token: PageToken,
    ) -> Option<Page> {
        let attempts = self.settings.page_fetch_attempts;

        for attempt in 1..=attempts {
            if !self.page_request_is_live(query_id, generation, token) {
                debug!(%query_id, page_index, attempt, "Page request superseded");
                return None;
            }

            match self.backend.fetch_page(query_id, page_index).await {
                Ok(Some(page)) => return Some(page),
                Ok(None) => debug!(%query_id, page_index, attempt, "Page not materialized yet"),
                Err(e) => {
                    warn!(%query_id, page_index, error = %e, "Page fetch failed");
                    return None;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.settings.page_fetch_retry()).await;
            }
        }

        warn!(%query_id, page_index, attempts, "Gave up waiting for page");
        None
    }
}
