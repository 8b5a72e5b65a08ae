//! Status/progress polling of running statements.
//!
//! The backend has no push channel, so each running tabular statement gets a
//! recurring task that refreshes its status and page count until the
//! statement is terminal, its tab is gone, or its generation is superseded.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::tab::UNKNOWN_ERROR_MESSAGE;
use super::{Generation, Inner};
use crate::backend::{QueryId, QueryStatus};
use crate::error::Result;

/// Handle to one live polling task.
#[derive(Debug)]
pub struct PollHandle {
    serial: u64,
    generation: Generation,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    fn stop(self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// At most one [`PollHandle`] per query.
#[derive(Debug, Default)]
pub struct PollRegistry {
    handles: HashMap<QueryId, PollHandle>,
    next_serial: u64,
}

impl PollRegistry {
    pub fn contains(&self, query_id: QueryId) -> bool {
        self.handles.contains_key(&query_id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    fn insert(&mut self, query_id: QueryId, handle: PollHandle) {
        if let Some(previous) = self.handles.insert(query_id, handle) {
            warn!(%query_id, "Replacing a live poll handle");
            previous.stop();
        }
    }

    /// Stops and forgets the poller of `query_id`.
    pub fn cancel(&mut self, query_id: QueryId) -> bool {
        match self.handles.remove(&query_id) {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    /// Stops every poller and returns how many were live.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.handles.len();
        for (query_id, handle) in self.handles.drain() {
            debug!(%query_id, generation = %handle.generation, "Stopping poller");
            handle.stop();
        }
        count
    }

    /// Forgets the handle of a task that is finishing on its own, unless it
    /// has already been replaced.
    fn release(&mut self, query_id: QueryId, serial: u64) {
        if self.handles.get(&query_id).map(|h| h.serial) == Some(serial) {
            self.handles.remove(&query_id);
        }
    }
}

/// Result of applying one poll to a tab.
#[derive(Debug, PartialEq, Eq)]
enum PollStep {
    Continue,
    Stop,
    /// Finished successfully with this many rows.
    Completed(u64),
    /// The backend reports an error; its message still has to be fetched.
    Failed,
}

impl Inner {
    /// Starts polling `query_id` for `generation`. A no-op when the query is
    /// already being polled or the generation is no longer current.
    pub(super) fn start_polling(self: &Arc<Self>, query_id: QueryId, generation: Generation) {
        let mut state = self.state();
        if state.disposed || !state.tabs.is_current(generation) {
            return;
        }
        if state.pollers.contains(query_id) {
            debug!(%query_id, "Already polling");
            return;
        }

        let serial = state.pollers.next_serial();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(self).poll(
            query_id,
            generation,
            serial,
            cancel.clone(),
        ));
        state.pollers.insert(
            query_id,
            PollHandle {
                serial,
                generation,
                cancel,
                task,
            },
        );
        debug!(%query_id, %generation, "Started polling");
    }

    async fn poll(
        self: Arc<Self>,
        query_id: QueryId,
        generation: Generation,
        serial: u64,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the snapshot already covered it
        ticker.tick().await;

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break PollStep::Stop,
                _ = ticker.tick() => {}
            }

            if !self.still_polling(query_id, generation) {
                break PollStep::Stop;
            }

            debug!(%query_id, "Polling status and page count");
            let (status, page_count) = future::join(
                self.progress.status(query_id),
                self.progress.page_count(query_id),
            )
            .await;

            if cancel.is_cancelled() {
                break PollStep::Stop;
            }

            let (status, page_count) = match (status, page_count) {
                (Ok(status), Ok(page_count)) => (status, page_count),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(%query_id, error = %e, "Polling failed, stopping");
                    break PollStep::Stop;
                }
            };

            match self.apply_progress(query_id, generation, status, page_count) {
                PollStep::Continue => continue,
                step => break step,
            }
        };

        // Keep the handle registered while the error text is fetched
        let failure = if outcome == PollStep::Failed {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                fetched = self.progress.error_message(query_id) => {
                    Some(failure_message(query_id, fetched))
                }
            }
        } else {
            None
        };

        self.state().pollers.release(query_id, serial);

        if let PollStep::Completed(total_rows) = outcome {
            debug!(%query_id, total_rows, "Statement completed");
            self.notify_complete(generation, total_rows);
        }
        if let Some(message) = failure {
            self.record_poll_failure(query_id, generation, &cancel, &message);
        }
    }

    fn still_polling(&self, query_id: QueryId, generation: Generation) -> bool {
        let state = self.state();
        state.tabs.is_current(generation)
            && state
                .tabs
                .tab_for_query(query_id)
                .is_some_and(|tab| !tab.is_terminal())
    }

    /// Applies one observation, touching only fields that changed.
    fn apply_progress(
        &self,
        query_id: QueryId,
        generation: Generation,
        status: QueryStatus,
        page_count: Option<u64>,
    ) -> PollStep {
        let mut state = self.state();
        if !state.tabs.is_current(generation) {
            return PollStep::Stop;
        }
        let Some(tab) = state.tabs.tab_for_query_mut(query_id) else {
            return PollStep::Stop;
        };
        if tab.is_terminal() {
            return PollStep::Stop;
        }

        let mut changed = false;
        if page_count.is_some() && tab.total_pages != page_count {
            tab.total_pages = page_count;
            changed = true;
        }

        let step = match status {
            QueryStatus::Error => PollStep::Failed,
            QueryStatus::Completed => {
                tab.status = QueryStatus::Completed;
                changed = true;
                PollStep::Completed(
                    tab.total_pages
                        .unwrap_or(0)
                        .saturating_mul(self.settings.page_size),
                )
            }
            status => {
                if tab.status != status {
                    tab.status = status;
                    changed = true;
                }
                PollStep::Continue
            }
        };

        if changed {
            self.publish(&state);
        }
        step
    }

    /// Marks a statement the backend reported as failed.
    fn record_poll_failure(
        &self,
        query_id: QueryId,
        generation: Generation,
        cancel: &CancellationToken,
        message: &str,
    ) {
        let mut state = self.state();
        if cancel.is_cancelled() || !state.tabs.is_current(generation) {
            return;
        }
        if let Some(tab) = state.tabs.tab_for_query_mut(query_id) {
            if !tab.is_terminal() {
                tab.fail(message);
                self.publish(&state);
            }
        }
    }
}

fn failure_message(query_id: QueryId, fetched: Result<Option<String>>) -> String {
    match fetched {
        Ok(message) => message.unwrap_or_default(),
        Err(e) => {
            warn!(%query_id, error = %e, "Could not fetch error details");
            UNKNOWN_ERROR_MESSAGE.to_string()
        }
    }
}
