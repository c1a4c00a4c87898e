//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{EntityLevel, IntervalKind};
use chrono::NaiveDate;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// ReachScope - reach, cost and incrementality reports for Meta ads
///
/// Splits a date range into periods, pulls insights for each period and
/// its cumulative window, and reports how much new audience every period
/// added and what it cost.
///
/// Examples:
///   reachscope --entity act_123 --since 2024-01-01 --until 2024-01-31
///   reachscope --entity 2385 --level campaign --since 2024-01-01 --until 2024-03-31 --interval weekly
///   reachscope --entity act_123 --since 2024-02-01 --until 2024-02-29 --interval daily-rolling-28 --format json
///   reachscope --entity act_123 --since 2024-01-01 --until 2024-01-31 --dry-run
///   reachscope --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Account, campaign or ad id to analyze
    ///
    /// Accounts use the `act_` prefix (e.g., act_1234567890).
    #[arg(short, long, value_name = "ID", required_unless_present = "init_config")]
    pub entity: Option<String>,

    /// First day of the analysis (YYYY-MM-DD, inclusive)
    #[arg(
        long,
        value_name = "DATE",
        value_parser = parse_date,
        required_unless_present = "init_config"
    )]
    pub since: Option<NaiveDate>,

    /// Last day of the analysis (YYYY-MM-DD, inclusive)
    #[arg(
        long,
        value_name = "DATE",
        value_parser = parse_date,
        required_unless_present = "init_config"
    )]
    pub until: Option<NaiveDate>,

    /// Scope of the entity id
    #[arg(short, long, value_enum, default_value = "account")]
    pub level: EntityLevel,

    /// Period granularity
    ///
    /// daily-rolling-28 adds trailing 28-day reach and incrementality columns.
    #[arg(short, long, value_enum, default_value = "daily")]
    pub interval: IntervalKind,

    /// Only emit TOTAL rows (no age/gender breakdown)
    #[arg(long)]
    pub no_demographics: bool,

    /// Label shown in the report metadata
    #[arg(long, value_name = "TEXT")]
    pub name: Option<String>,

    /// Output file path for the report
    ///
    /// Default: from config or reachscope_report.csv.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (csv, json, markdown)
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reachscope.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Graph API access token
    #[arg(long, value_name = "TOKEN", env = "META_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Graph API version (e.g., v20.0)
    #[arg(long, value_name = "VERSION")]
    pub api_version: Option<String>,

    /// Action type counted as conversions and revenue
    #[arg(long, value_name = "ACTION_TYPE")]
    pub conversion_event: Option<String>,

    /// Pause between periods in milliseconds
    #[arg(long, value_name = "MS")]
    pub period_delay_ms: Option<u64>,

    /// Fetch the windows of a period one after another
    #[arg(long)]
    pub sequential: bool,

    /// Cancel the run after this many seconds
    ///
    /// A cancelled run writes no report and exits with code 2.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Dry run: print the planned periods and windows without fetching
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .reachscope.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One flat line per row (default)
    #[default]
    Csv,
    /// JSON format
    Json,
    /// Markdown format
    Markdown,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{}', expected YYYY-MM-DD", value))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Entity id, empty if not set (should be validated first).
    pub fn entity_id(&self) -> &str {
        self.entity.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.entity_id().trim().is_empty() {
            return Err("Entity id must not be empty".to_string());
        }

        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(format!("--since {} is after --until {}", since, until));
            }
        }

        // Token is not needed for dry-run
        if !self.dry_run
            && self
                .access_token
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
        {
            return Err(
                "Missing access token: pass --access-token or set META_ACCESS_TOKEN".to_string(),
            );
        }

        if let Some(version) = self.api_version.as_deref() {
            if !version.starts_with('v') {
                return Err(format!("API version must look like v20.0, got '{}'", version));
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            entity: Some("act_123".to_string()),
            since: NaiveDate::from_ymd_opt(2024, 1, 1),
            until: NaiveDate::from_ymd_opt(2024, 1, 31),
            level: EntityLevel::Account,
            interval: IntervalKind::Daily,
            no_demographics: false,
            name: None,
            output: None,
            format: None,
            config: None,
            access_token: Some("token".to_string()),
            api_version: None,
            conversion_event: None,
            period_delay_ms: None,
            sequential: false,
            timeout: None,
            dry_run: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "reachscope",
            "--entity",
            "2385",
            "--level",
            "campaign",
            "--since",
            "2024-02-01",
            "--until",
            "2024-02-29",
            "--interval",
            "daily-rolling-28",
            "--format",
            "markdown",
            "--access-token",
            "abc",
            "--sequential",
        ])
        .unwrap();

        assert_eq!(args.entity_id(), "2385");
        assert_eq!(args.level, EntityLevel::Campaign);
        assert_eq!(args.interval, IntervalKind::DailyRolling28);
        assert_eq!(args.format, Some(OutputFormat::Markdown));
        assert_eq!(args.since, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert!(args.sequential);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_invalid_date_is_rejected_by_parser() {
        let result = Args::try_parse_from([
            "reachscope",
            "--entity",
            "act_1",
            "--since",
            "2024-13-01",
            "--until",
            "2024-12-31",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_init_config_needs_no_entity() {
        let args = Args::try_parse_from(["reachscope", "--init-config"]).unwrap();
        assert!(args.init_config);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_reversed_range() {
        let mut args = make_args();
        args.since = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_token() {
        let mut args = make_args();
        args.access_token = None;
        assert!(args.validate().is_err());

        args.dry_run = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
