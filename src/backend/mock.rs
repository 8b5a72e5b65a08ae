//! Mock query backend for testing.
//!
//! Provides an in-memory backend for headless runs and tests. Without a
//! script it behaves like a tiny statement manager: the batch is split on `;`
//! and each statement completes immediately. Tests script per-statement
//! behavior with [`MockStatement`] and steer running statements through the
//! `set_*` methods.

use super::{Page, QueryBackend, QueryId, QueryStatus, Snapshot};
use crate::error::{QueryDeckError, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Scripted behavior of one statement.
#[derive(Debug, Clone)]
pub struct MockStatement {
    snapshot: Snapshot,
    status: QueryStatus,
    page_count: Option<u64>,
    pages: HashMap<u64, Page>,
    snapshot_delay: Option<Duration>,
    page_delays: HashMap<u64, Duration>,
    /// Number of attempts that see a page as not yet materialized.
    page_ready_after: HashMap<u64, u32>,
    status_error: Option<String>,
    page_count_error: Option<String>,
}

impl MockStatement {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            status: snapshot.status,
            snapshot,
            page_count: None,
            pages: HashMap::new(),
            snapshot_delay: None,
            page_delays: HashMap::new(),
            page_ready_after: HashMap::new(),
            status_error: None,
            page_count_error: None,
        }
    }

    /// A completed statement returning `first_page` as its only page.
    pub fn rows(columns: &[&str], first_page: Page) -> Self {
        let columns = columns.iter().map(|c| c.to_string()).collect();
        let mut statement = Self::from_snapshot(Snapshot::tabular(
            QueryStatus::Completed,
            columns,
            first_page.clone(),
        ));
        statement.page_count = Some(1);
        statement.pages.insert(0, first_page);
        statement
    }

    /// A completed statement that touched `affected_rows` rows.
    pub fn affected(affected_rows: u64) -> Self {
        Self::from_snapshot(Snapshot::affected(QueryStatus::Completed, affected_rows))
    }

    /// A statement whose snapshot reports `message` as its failure.
    pub fn failing(message: &str) -> Self {
        Self::from_snapshot(Snapshot::failed(message))
    }

    /// A tabular statement whose snapshot carries no column list.
    pub fn without_columns() -> Self {
        let mut statement = Self::rows(&[], Vec::new());
        statement.snapshot.columns = None;
        statement
    }

    /// Marks the statement as still running in both the snapshot and status.
    pub fn running(mut self) -> Self {
        self.snapshot.status = QueryStatus::Running;
        self.status = QueryStatus::Running;
        self
    }

    pub fn with_page_count(mut self, page_count: u64) -> Self {
        self.page_count = Some(page_count);
        self
    }

    pub fn with_page(mut self, page_index: u64, page: Page) -> Self {
        self.pages.insert(page_index, page);
        self
    }

    /// Delays the snapshot rendezvous.
    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = Some(delay);
        self
    }

    /// Delays every fetch of `page_index`.
    pub fn with_page_delay(mut self, page_index: u64, delay: Duration) -> Self {
        self.page_delays.insert(page_index, delay);
        self
    }

    /// Reports `page_index` as not materialized for the first `attempts` fetches.
    pub fn page_ready_after(mut self, page_index: u64, attempts: u32) -> Self {
        self.page_ready_after.insert(page_index, attempts);
        self
    }

    pub fn failing_status(mut self, message: &str) -> Self {
        self.status_error = Some(message.to_string());
        self
    }

    pub fn failing_page_count(mut self, message: &str) -> Self {
        self.page_count_error = Some(message.to_string());
        self
    }

    /// Default behavior for an unscripted statement.
    fn for_sql(sql: &str) -> Self {
        if returns_rows(sql) {
            Self::rows(
                &["result"],
                vec![vec![json!(format!("Mock result for: {sql}"))]],
            )
        } else {
            Self::affected(0)
        }
    }
}

/// Rough check for statements that produce a result set.
fn returns_rows(sql: &str) -> bool {
    let upper = sql.to_uppercase();
    let keyword = upper.split_whitespace().next().unwrap_or_default();
    matches!(
        keyword,
        "SELECT" | "WITH" | "VALUES" | "SHOW" | "EXPLAIN" | "TABLE"
    ) || upper.split_whitespace().any(|word| word == "RETURNING")
}

#[derive(Debug)]
struct MockQuery {
    statement: MockStatement,
    fetch_attempts: HashMap<u64, u32>,
}

#[derive(Debug, Default)]
struct MockState {
    scripted: VecDeque<MockStatement>,
    submit_error: Option<String>,
    submit_delay: Option<Duration>,
    queries: HashMap<QueryId, MockQuery>,
    last_connection: Option<String>,
    last_text: Option<String>,
}

#[derive(Debug, Default)]
struct CallCounters {
    submit: AtomicUsize,
    snapshot: AtomicUsize,
    status: AtomicUsize,
    page_count: AtomicUsize,
    fetch_page: AtomicUsize,
}

/// An in-memory backend that returns scripted results.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    calls: CallCounters,
}

impl MockBackend {
    /// Creates a mock backend with no script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock backend whose next submission yields `statements`.
    pub fn with_script(statements: Vec<MockStatement>) -> Self {
        let backend = Self::new();
        backend.script(statements);
        backend
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scripts the statements returned by the next submission.
    pub fn script(&self, statements: Vec<MockStatement>) {
        self.state().scripted = statements.into();
    }

    /// Makes the next submission fail with `message`.
    pub fn fail_next_submit(&self, message: &str) {
        self.state().submit_error = Some(message.to_string());
    }

    /// Delays every submission.
    pub fn set_submit_delay(&self, delay: Duration) {
        self.state().submit_delay = Some(delay);
    }

    fn with_query(&self, query_id: QueryId, f: impl FnOnce(&mut MockStatement)) {
        if let Some(query) = self.state().queries.get_mut(&query_id) {
            f(&mut query.statement);
        }
    }

    /// Changes the status reported for a running statement.
    pub fn set_status(&self, query_id: QueryId, status: QueryStatus) {
        self.with_query(query_id, |s| s.status = status);
    }

    pub fn set_page_count(&self, query_id: QueryId, page_count: Option<u64>) {
        self.with_query(query_id, |s| s.page_count = page_count);
    }

    /// Materializes a page for a submitted statement.
    pub fn insert_page(&self, query_id: QueryId, page_index: u64, page: Page) {
        self.with_query(query_id, |s| {
            s.pages.insert(page_index, page);
        });
    }

    /// Fails a submitted statement: status turns to error and the snapshot
    /// carries `message`.
    pub fn fail_query(&self, query_id: QueryId, message: &str) {
        self.with_query(query_id, |s| {
            s.status = QueryStatus::Error;
            s.snapshot = Snapshot::failed(message);
        });
    }

    /// Makes status polls for a submitted statement fail.
    pub fn fail_status_polls(&self, query_id: QueryId, message: &str) {
        self.with_query(query_id, |s| s.status_error = Some(message.to_string()));
    }

    pub fn last_connection(&self) -> Option<String> {
        self.state().last_connection.clone()
    }

    pub fn last_submitted_text(&self) -> Option<String> {
        self.state().last_text.clone()
    }

    pub fn submit_calls(&self) -> usize {
        self.calls.submit.load(Ordering::SeqCst)
    }

    pub fn snapshot_calls(&self) -> usize {
        self.calls.snapshot.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.calls.status.load(Ordering::SeqCst)
    }

    pub fn page_count_calls(&self) -> usize {
        self.calls.page_count.load(Ordering::SeqCst)
    }

    pub fn fetch_page_calls(&self) -> usize {
        self.calls.fetch_page.load(Ordering::SeqCst)
    }

    /// Total status and page-count calls, i.e. everything a poller issues.
    pub fn poll_calls(&self) -> usize {
        self.status_calls() + self.page_count_calls()
    }

    fn missing(query_id: QueryId) -> QueryDeckError {
        QueryDeckError::backend(format!("Did not find {query_id} in statement manager"))
    }
}

#[async_trait]
impl QueryBackend for MockBackend {
    async fn submit_query(&self, connection_id: &str, text: &str) -> Result<Vec<QueryId>> {
        self.calls.submit.fetch_add(1, Ordering::SeqCst);

        let delay = self.state().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.last_connection = Some(connection_id.to_string());
        state.last_text = Some(text.to_string());

        if let Some(message) = state.submit_error.take() {
            return Err(QueryDeckError::submission(message));
        }

        let statements: Vec<MockStatement> = if state.scripted.is_empty() {
            text.split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(MockStatement::for_sql)
                .collect()
        } else {
            state.scripted.drain(..).collect()
        };

        if statements.is_empty() {
            return Err(QueryDeckError::submission("no statements to execute"));
        }

        // A new batch replaces the previous one, ids restart at zero
        state.queries.clear();
        let mut ids = Vec::with_capacity(statements.len());
        for (idx, statement) in statements.into_iter().enumerate() {
            let id = QueryId(idx as i64);
            state.queries.insert(
                id,
                MockQuery {
                    statement,
                    fetch_attempts: HashMap::new(),
                },
            );
            ids.push(id);
        }

        Ok(ids)
    }

    async fn wait_until_renderable(&self, query_id: QueryId) -> Result<Snapshot> {
        self.calls.snapshot.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .state()
            .queries
            .get(&query_id)
            .ok_or_else(|| Self::missing(query_id))?
            .statement
            .snapshot_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        let query = state
            .queries
            .get(&query_id)
            .ok_or_else(|| Self::missing(query_id))?;
        Ok(query.statement.snapshot.clone())
    }

    async fn get_query_status(&self, query_id: QueryId) -> Result<QueryStatus> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);

        let state = self.state();
        let statement = &state
            .queries
            .get(&query_id)
            .ok_or_else(|| Self::missing(query_id))?
            .statement;
        match &statement.status_error {
            Some(message) => Err(QueryDeckError::backend(message.clone())),
            None => Ok(statement.status),
        }
    }

    async fn get_page_count(&self, query_id: QueryId) -> Result<Option<u64>> {
        self.calls.page_count.fetch_add(1, Ordering::SeqCst);

        let state = self.state();
        let statement = &state
            .queries
            .get(&query_id)
            .ok_or_else(|| Self::missing(query_id))?
            .statement;
        match &statement.page_count_error {
            Some(message) => Err(QueryDeckError::backend(message.clone())),
            None => Ok(statement.page_count),
        }
    }

    async fn fetch_page(&self, query_id: QueryId, page_index: u64) -> Result<Option<Page>> {
        self.calls.fetch_page.fetch_add(1, Ordering::SeqCst);

        let delay = {
            let mut state = self.state();
            let query = state
                .queries
                .get_mut(&query_id)
                .ok_or_else(|| Self::missing(query_id))?;
            *query.fetch_attempts.entry(page_index).or_insert(0) += 1;
            query.statement.page_delays.get(&page_index).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        let query = state
            .queries
            .get(&query_id)
            .ok_or_else(|| Self::missing(query_id))?;
        let attempts = query.fetch_attempts.get(&page_index).copied().unwrap_or(0);
        let ready_after = query
            .statement
            .page_ready_after
            .get(&page_index)
            .copied()
            .unwrap_or(0);
        if attempts <= ready_after {
            return Ok(None);
        }
        Ok(query.statement.pages.get(&page_index).cloned())
    }
}
