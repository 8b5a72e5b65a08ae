//! Command-line argument parsing for querydeck.

use clap::Parser;
use std::path::PathBuf;

/// Output format for the tab summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One block per tab, followed by the active page.
    #[default]
    Text,
    /// The published tab view as JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid output format: {s}. Expected: text or json"
            )),
        }
    }
}

/// Runs a query batch through the orchestrator against the in-memory backend.
#[derive(Parser, Debug)]
#[command(name = "querydeck")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Query batch to execute; statements are separated by `;`
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// Connection identifier passed to the backend
    #[arg(short = 'c', long, value_name = "ID", default_value = "local")]
    pub connection: String,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    pub output: String,

    /// Load this page of the active tab before printing
    #[arg(long, value_name = "N")]
    pub page: Option<u64>,

    /// Log orchestration steps to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(querydeck::Config::default_path)
    }

    /// Parses the output format from the --output argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.output.parse()
    }
}
