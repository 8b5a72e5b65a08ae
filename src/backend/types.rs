//! Wire-level types exchanged with the query backend.
//!
//! Field names serialize in camelCase to match what result views consume.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend-assigned identifier of one statement in a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub i64);

impl QueryId {
    /// Placeholder carried by the tab created for a batch that failed to submit.
    pub const SUBMISSION_FAILED: QueryId = QueryId(-1);

    /// Returns the inner value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Returns true for the submission-failure placeholder.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SUBMISSION_FAILED
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryId({})", self.0)
    }
}

/// Execution status of a single statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Error,
}

impl QueryStatus {
    /// Returns true once the statement can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of a result page. Cells are JSON values as produced by the backend.
pub type Row = Vec<serde_json::Value>;

/// A fixed-size slice of a statement's result set.
pub type Page = Vec<Row>;

/// Point-in-time, render-ready view of a statement.
///
/// Returned by the rendezvous call once the backend has something to show:
/// an error, a finished non-tabular statement, or the first page of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Statement-level failure message.
    #[serde(default)]
    pub error: Option<String>,

    /// Whether the statement produces rows at all.
    pub returns_values: bool,

    pub status: QueryStatus,

    #[serde(default)]
    pub first_page: Option<Page>,

    /// Rows touched by a non-tabular statement.
    #[serde(default)]
    pub affected_rows: Option<u64>,

    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

impl Snapshot {
    /// A snapshot for a statement that failed.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            status: QueryStatus::Error,
            ..Default::default()
        }
    }

    /// A snapshot for a statement that does not return rows.
    pub fn affected(status: QueryStatus, affected_rows: u64) -> Self {
        Self {
            returns_values: false,
            status,
            affected_rows: Some(affected_rows),
            ..Default::default()
        }
    }

    /// A snapshot for a statement that returns rows.
    pub fn tabular(status: QueryStatus, columns: Vec<String>, first_page: Page) -> Self {
        Self {
            returns_values: true,
            status,
            first_page: Some(first_page),
            columns: Some(columns),
            ..Default::default()
        }
    }
}
