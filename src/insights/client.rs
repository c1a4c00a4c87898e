//! Graph API insights client.
//!
//! Issues `GET /{version}/{entity}/insights` requests, follows
//! `paging.next` links and retries throttled requests with backoff.

use super::parse::{parse_rows, DEFAULT_CONVERSION_EVENT};
use super::{InsightRow, InsightsQuery, InsightsSource};
use crate::error::FetchError;
use crate::pacing::Backoff;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Graph error codes that signal throttling.
const RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];
/// Ads-insights specific throttling codes.
const ADS_RATE_LIMIT_CODES: std::ops::RangeInclusive<i64> = 80000..=80014;

/// Configuration for the Graph client.
#[derive(Debug, Clone)]
pub struct GraphApiConfig {
    pub base_url: String,
    pub api_version: String,
    pub access_token: String,
    pub timeout_seconds: u64,
    pub backoff: Backoff,
    /// `limit` parameter per page.
    pub page_limit: usize,
    /// Hard cap on followed pages per window.
    pub max_pages: usize,
    /// Action type counted as conversions and revenue.
    pub conversion_event: String,
}

impl Default for GraphApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com".to_string(),
            api_version: "v20.0".to_string(),
            access_token: String::new(),
            timeout_seconds: 60,
            backoff: Backoff::default(),
            page_limit: 500,
            max_pages: 50,
            conversion_event: DEFAULT_CONVERSION_EVENT.to_string(),
        }
    }
}

/// One page of an insights response.
#[derive(Debug, Deserialize)]
struct InsightsPage {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

/// Error envelope returned on non-success statuses.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<GraphError>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

/// Insights source backed by the Meta Graph API.
pub struct GraphApiClient {
    config: GraphApiConfig,
    http_client: reqwest::Client,
}

impl GraphApiClient {
    /// Create a new client.
    pub fn new(config: GraphApiConfig) -> Result<Self, FetchError> {
        info!(
            "Initializing Graph API client {}/{}",
            config.base_url, config.api_version
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| FetchError::transport(e, config.timeout_seconds))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Build the first-page URL for a query.
    pub fn insights_url(&self, query: &InsightsQuery) -> Result<Url, FetchError> {
        let base = format!(
            "{}/{}/{}/insights",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            query.entity_id
        );

        let time_range = json!({
            "since": query.window.start.format("%Y-%m-%d").to_string(),
            "until": query.window.end.format("%Y-%m-%d").to_string(),
        })
        .to_string();

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(level) = query.level.graph_level() {
            params.push(("level", level.to_string()));
        }
        params.push(("fields", query.fields.as_param().to_string()));
        params.push(("time_range", time_range));
        if query.breakdown {
            params.push(("breakdowns", "age,gender".to_string()));
        }
        params.push(("limit", self.config.page_limit.to_string()));

        Url::parse_with_params(&base, &params)
            .map_err(|e| FetchError::Malformed(format!("Invalid insights URL {}: {}", base, e)))
    }

    /// GET one page, retrying throttled or timed-out attempts.
    async fn get_page(&self, url: &Url) -> Result<InsightsPage, FetchError> {
        let mut attempt = 0;
        loop {
            match self.get_page_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() => match self.config.backoff.delay(attempt) {
                    Some(delay) => {
                        warn!(
                            "{} - retrying in {}ms (attempt {}/{})",
                            e,
                            delay.as_millis(),
                            attempt + 1,
                            self.config.backoff.retries
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_page_once(&self, url: &Url) -> Result<InsightsPage, FetchError> {
        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| FetchError::transport(e, self.config.timeout_seconds))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transport(e, self.config.timeout_seconds))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        parse_page(&body)
    }
}

#[async_trait]
impl InsightsSource for GraphApiClient {
    async fn query(&self, query: &InsightsQuery) -> Result<Vec<InsightRow>, FetchError> {
        let mut url = self.insights_url(query)?;
        let mut data: Vec<Value> = Vec::new();
        let mut pages = 0;

        loop {
            let page = self.get_page(&url).await?;
            pages += 1;
            data.extend(page.data);

            let next = page.paging.and_then(|p| p.next);
            match next {
                Some(next) if pages < self.config.max_pages => {
                    url = Url::parse(&next).map_err(|e| {
                        FetchError::Malformed(format!("Invalid paging.next URL: {}", e))
                    })?;
                }
                Some(_) => {
                    return Err(FetchError::Malformed(format!(
                        "insights for {} [{}] exceed {} pages",
                        query.entity_id, query.window, self.config.max_pages
                    )));
                }
                None => break,
            }
        }

        debug!(
            "Fetched {} rows for {} [{}] in {} page(s)",
            data.len(),
            query.entity_id,
            query.window,
            pages
        );

        Ok(parse_rows(&data, &self.config.conversion_event, query.breakdown))
    }
}

/// Decode one successful response body.
fn parse_page(body: &str) -> Result<InsightsPage, FetchError> {
    serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("Failed to parse insights response: {}", e)))
}

/// Turn a non-success response into an API or rate-limit error.
fn classify_error(status: StatusCode, body: &str) -> FetchError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let graph_error = envelope.error.unwrap_or_default();

    let code = graph_error.code.unwrap_or(i64::from(status.as_u16()));
    let message = graph_error
        .message
        .unwrap_or_else(|| "Unknown error".to_string());

    if status == StatusCode::TOO_MANY_REQUESTS
        || RATE_LIMIT_CODES.contains(&code)
        || ADS_RATE_LIMIT_CODES.contains(&code)
    {
        FetchError::RateLimited {
            status: status.as_u16(),
            code,
            message,
        }
    } else {
        FetchError::Api {
            status: status.as_u16(),
            code,
            message,
        }
    }
}
