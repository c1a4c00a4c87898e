//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reachscope.toml` files. The access token is never read from here.

use crate::cli::OutputFormat;
use crate::insights::GraphApiConfig;
use crate::pacing::{Backoff, FixedDelay, NoPacing, PacingPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".reachscope.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Graph API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Request pacing settings.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "reachscope_report.csv".to_string()
}

/// Graph API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Graph API host.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Versioned path segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on throttling or timeouts.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// First retry delay, doubled on every further attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Rows requested per page.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// Maximum pages followed per window.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Action type counted as conversions and revenue.
    #[serde(default = "default_conversion_event")]
    pub conversion_event: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            page_limit: default_page_limit(),
            max_pages: default_max_pages(),
            conversion_event: default_conversion_event(),
        }
    }
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v20.0".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_retries() -> usize {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_page_limit() -> usize {
    500
}

fn default_max_pages() -> usize {
    50
}

fn default_conversion_event() -> String {
    crate::insights::parse::DEFAULT_CONVERSION_EVENT.to_string()
}

/// Pauses between upstream calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Pause after each period except the last.
    #[serde(default = "default_period_delay_ms")]
    pub period_delay_ms: u64,

    /// Extra pause after the rolling-28 windows of a period.
    #[serde(default = "default_rolling_delay_ms")]
    pub rolling_delay_ms: u64,

    /// Fetch the windows of one period concurrently.
    #[serde(default = "default_true")]
    pub concurrent_fetches: bool,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            period_delay_ms: default_period_delay_ms(),
            rolling_delay_ms: default_rolling_delay_ms(),
            concurrent_fetches: true,
        }
    }
}

fn default_period_delay_ms() -> u64 {
    500
}

fn default_rolling_delay_ms() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Default output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Decimal places for money in Markdown reports.
    #[serde(default = "default_decimals")]
    pub decimals: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            decimals: default_decimals(),
        }
    }
}

fn default_decimals() -> usize {
    2
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.reachscope.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }

        if let Some(ref version) = args.api_version {
            self.api.api_version = version.clone();
        }
        if let Some(ref event) = args.conversion_event {
            self.api.conversion_event = event.clone();
        }

        if let Some(delay) = args.period_delay_ms {
            self.pacing.period_delay_ms = delay;
        }

        // Flags always override
        if args.sequential {
            self.pacing.concurrent_fetches = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Graph client settings for the given token.
    pub fn graph_api_config(&self, access_token: String) -> GraphApiConfig {
        GraphApiConfig {
            base_url: self.api.base_url.clone(),
            api_version: self.api.api_version.clone(),
            access_token,
            timeout_seconds: self.api.timeout_seconds,
            backoff: Backoff::new(self.api.retries, self.api.retry_backoff_ms),
            page_limit: self.api.page_limit,
            max_pages: self.api.max_pages,
            conversion_event: self.api.conversion_event.clone(),
        }
    }

    /// Pacing policy built from the `[pacing]` section.
    pub fn pacing_policy(&self) -> Box<dyn PacingPolicy> {
        if self.pacing.period_delay_ms == 0 && self.pacing.rolling_delay_ms == 0 {
            return Box::new(NoPacing);
        }
        Box::new(FixedDelay::from_millis(
            self.pacing.period_delay_ms,
            self.pacing.rolling_delay_ms,
        ))
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
