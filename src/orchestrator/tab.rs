//! Result tabs: the UI-facing record of one statement's execution.

use crate::backend::{Page, QueryId, QueryStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Message stored on a tabular statement whose snapshot lacks columns.
pub const MISSING_COLUMNS_MESSAGE: &str = "failed to get column information";

/// Fallback message when the backend reports an error without text.
pub const UNKNOWN_ERROR_MESSAGE: &str = "query failed";

/// Locally unique tab identifier, restarting at 1 for every execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coarse status shown on the tab header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabDisplayStatus {
    Normal,
    /// Content is still changing.
    Modified,
    Error,
}

/// One statement's execution and result state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultTab {
    pub id: TabId,
    pub query_id: QueryId,
    pub query: String,
    pub name: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub status: QueryStatus,
    /// Unknown until the first snapshot arrives.
    pub query_returns_results: Option<bool>,
    pub affected_rows: Option<u64>,
    pub columns: Option<Vec<String>>,
    pub error: Option<String>,
    pub current_page_index: u64,
    pub current_page_data: Option<Page>,
    pub total_pages: Option<u64>,
}

impl ResultTab {
    /// Creates a running tab with no data yet.
    pub fn new(id: TabId, query_id: QueryId, query: &str, title_max_chars: usize) -> Self {
        Self {
            id,
            query_id,
            query: query.to_string(),
            name: tab_title(query, title_max_chars),
            timestamp: now_millis(),
            status: QueryStatus::Running,
            query_returns_results: None,
            affected_rows: None,
            columns: None,
            error: None,
            current_page_index: 0,
            current_page_data: None,
            total_pages: None,
        }
    }

    /// Moves the tab into the error state. An empty message is replaced so
    /// error tabs always carry text.
    pub fn fail(&mut self, message: &str) {
        let message = message.trim();
        self.status = QueryStatus::Error;
        self.error = Some(if message.is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            message.to_string()
        });
    }

    /// Records the column list. Columns are immutable once known; returns
    /// false when they were already set.
    pub fn set_columns(&mut self, columns: Vec<String>) -> bool {
        if self.columns.is_some() {
            return false;
        }
        self.columns = Some(columns);
        true
    }

    /// Shows `page` as the page at `page_index`, in one step.
    pub fn show_page(&mut self, page_index: u64, page: Page) {
        self.current_page_index = page_index;
        self.current_page_data = Some(page);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn display_status(&self) -> TabDisplayStatus {
        match self.status {
            QueryStatus::Error => TabDisplayStatus::Error,
            QueryStatus::Pending | QueryStatus::Running => TabDisplayStatus::Modified,
            QueryStatus::Completed => TabDisplayStatus::Normal,
        }
    }
}

/// Derives a tab title from query text.
///
/// Whitespace runs collapse to one space. Titles longer than `max_chars`
/// characters are cut and end in `...`, staying exactly `max_chars` long.
pub fn tab_title(query: &str, max_chars: usize) -> String {
    let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }
    let keep = max_chars.saturating_sub(3);
    let mut title: String = normalized.chars().take(keep).collect();
    title.push_str("...");
    title
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
