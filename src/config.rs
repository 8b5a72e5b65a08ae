//! Configuration management for querydeck.
//!
//! Handles loading orchestrator tuning from a TOML file and environment
//! variables. Every knob has a default matching the backend protocol, so an
//! absent file is a valid configuration.

use crate::error::{QueryDeckError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `poll_interval_ms`.
pub const ENV_POLL_INTERVAL_MS: &str = "QUERYDECK_POLL_INTERVAL_MS";

/// Environment variable overriding `page_fetch_attempts`.
pub const ENV_PAGE_FETCH_ATTEMPTS: &str = "QUERYDECK_PAGE_FETCH_ATTEMPTS";

/// Main configuration structure for querydeck.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Orchestrator timing and presentation settings.
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

/// Timing and presentation settings for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Interval between status/page-count polls of a running query.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Rows per page; fixed by the backend.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Attempts before a page fetch gives up on an unmaterialized page.
    #[serde(default = "default_page_fetch_attempts")]
    pub page_fetch_attempts: u32,

    /// Delay between page fetch attempts.
    #[serde(default = "default_page_fetch_retry_ms")]
    pub page_fetch_retry_ms: u64,

    /// Maximum characters in a tab title, including the ellipsis.
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Optional ceiling on the initial snapshot wait. Absent means wait forever.
    #[serde(default)]
    pub snapshot_timeout_ms: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_page_size() -> u64 {
    50
}

fn default_page_fetch_attempts() -> u32 {
    100
}

fn default_page_fetch_retry_ms() -> u64 {
    100
}

fn default_title_max_chars() -> usize {
    30
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            page_size: default_page_size(),
            page_fetch_attempts: default_page_fetch_attempts(),
            page_fetch_retry_ms: default_page_fetch_retry_ms(),
            title_max_chars: default_title_max_chars(),
            snapshot_timeout_ms: None,
        }
    }
}

impl OrchestratorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn page_fetch_retry(&self) -> Duration {
        Duration::from_millis(self.page_fetch_retry_ms)
    }

    pub fn snapshot_timeout(&self) -> Option<Duration> {
        self.snapshot_timeout_ms.map(Duration::from_millis)
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(QueryDeckError::config(
                "poll_interval_ms must be greater than zero",
            ));
        }
        if self.page_size == 0 {
            return Err(QueryDeckError::config("page_size must be greater than zero"));
        }
        if self.page_fetch_attempts == 0 {
            return Err(QueryDeckError::config(
                "page_fetch_attempts must be greater than zero",
            ));
        }
        // Room for at least one character plus the ellipsis
        if self.title_max_chars < 4 {
            return Err(QueryDeckError::config(format!(
                "title_max_chars must be at least 4, got {}",
                self.title_max_chars
            )));
        }
        if self.snapshot_timeout_ms == Some(0) {
            return Err(QueryDeckError::config(
                "snapshot_timeout_ms must be greater than zero when set",
            ));
        }
        Ok(())
    }

    /// Applies `QUERYDECK_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(ENV_POLL_INTERVAL_MS) {
            self.poll_interval_ms = parse_override(ENV_POLL_INTERVAL_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PAGE_FETCH_ATTEMPTS) {
            self.page_fetch_attempts = parse_override(ENV_PAGE_FETCH_ATTEMPTS, &raw)?;
        }
        Ok(())
    }
}

fn parse_override<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| QueryDeckError::config(format!("Invalid {key} '{raw}': {e}")))
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("querydeck")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file, then applies environment
    /// overrides and validates the result.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| QueryDeckError::config(format!("Failed to read config file: {e}")))?;
            Self::parse_toml(&content, path)?
        } else {
            Self::default()
        };

        config.orchestrator.apply_env_overrides()?;
        config.orchestrator.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            QueryDeckError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }
}
