//! Error types for querydeck.
//!
//! Defines the main error enum used throughout the orchestrator.

use thiserror::Error;

/// Main error type for querydeck operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryDeckError {
    /// The backend rejected a query batch (parse failure, lost connection, etc.)
    #[error("Submission error: {0}")]
    Submission(String),

    /// A backend call for an already-submitted query failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration errors (invalid config file, out-of-range settings, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The orchestrator was disposed and no longer accepts work.
    #[error("Orchestrator disposed")]
    Disposed,

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryDeckError {
    /// Creates a submission error with the given message.
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Submission(_) => "Submission Error",
            Self::Backend(_) => "Backend Error",
            Self::Config(_) => "Configuration Error",
            Self::Disposed => "Lifecycle Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the bare message without the category prefix.
    ///
    /// Result tabs show this text, so a failing statement reads as the
    /// backend worded it.
    pub fn message(&self) -> String {
        match self {
            Self::Submission(msg)
            | Self::Backend(msg)
            | Self::Config(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Disposed => self.to_string(),
        }
    }
}

/// Result type alias using QueryDeckError.
pub type Result<T> = std::result::Result<T, QueryDeckError>;
