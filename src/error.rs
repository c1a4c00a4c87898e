//! Error types for the analysis run and the insights collaborator.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by an [`InsightsSource`](crate::insights::InsightsSource).
#[derive(Error, Debug)]
pub enum FetchError {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("{message}")]
    Transport {
        message: String,
        timed_out: bool,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status.
    #[error("Meta API error: {message} (Code: {code})")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// The API reported that the caller is being throttled.
    #[error("Meta API rate limit: {message} (Code: {code})")]
    RateLimited {
        status: u16,
        code: i64,
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Malformed insights response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Wrap a reqwest error, keeping the timeout/connect distinction readable.
    pub fn transport(source: reqwest::Error, timeout_seconds: u64) -> Self {
        let timed_out = source.is_timeout();
        let message = if timed_out {
            format!("Request timed out after {}s", timeout_seconds)
        } else if source.is_connect() {
            format!("Cannot connect to Graph API: {}", source)
        } else {
            format!("Failed to send request: {}", source)
        };
        Self::Transport {
            message,
            timed_out,
            source,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } => true,
            FetchError::Transport { timed_out, .. } => *timed_out,
            FetchError::Api { .. } | FetchError::Malformed(_) => false,
        }
    }
}

/// Errors that abort an analysis run.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The analysis inputs are unusable; raised before any fetch.
    #[error("Invalid analysis configuration: {0}")]
    InvalidConfig(String),

    /// A window fetch failed. No rows are returned for the run.
    #[error("Upstream fetch failed for {entity_id} [{since} .. {until}]: {source}")]
    UpstreamFetch {
        entity_id: String,
        since: NaiveDate,
        until: NaiveDate,
        #[source]
        source: FetchError,
    },

    /// The run was cancelled before the next period's fetches were issued.
    #[error("Analysis cancelled after {completed_periods} completed period(s)")]
    Cancelled { completed_periods: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_api_error_message_matches_graph_format() {
        let err = FetchError::Api {
            status: 400,
            code: 100,
            message: "Invalid parameter".to_string(),
        };
        assert_eq!(err.to_string(), "Meta API error: Invalid parameter (Code: 100)");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_limited_is_retryable() {
        let err = FetchError::RateLimited {
            status: 400,
            code: 17,
            message: "User request limit reached".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!FetchError::Malformed("eof".to_string()).is_retryable());
    }

    #[test]
    fn test_upstream_fetch_carries_window() {
        let err = AnalysisError::UpstreamFetch {
            entity_id: "act_42".to_string(),
            since: date("2024-01-01"),
            until: date("2024-01-07"),
            source: FetchError::Malformed("missing data array".to_string()),
        };
        let text = err.to_string();
        assert!(text.contains("act_42"));
        assert!(text.contains("2024-01-01 .. 2024-01-07"));
        assert!(text.contains("missing data array"));
    }
}
