//! Insights data source.
//!
//! The analysis engine only needs one capability from the ads platform:
//! aggregate counts for an entity over a date window, optionally broken
//! down by age and gender. [`InsightsSource`] is that seam; the Graph API
//! client in [`client`] is the production implementation.

pub mod client;
pub mod parse;

pub use client::{GraphApiClient, GraphApiConfig};

use crate::error::FetchError;
use crate::models::{EntityLevel, Period, RawSegmentMetrics, Segment};
use async_trait::async_trait;

/// Metric fields requested for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSet {
    /// Reach, impressions, spend and the conversion action lists.
    Full,
    /// Reach and impressions only (cumulative window).
    ReachImpressions,
    /// Reach only (rolling-28 windows).
    ReachOnly,
}

impl FieldSet {
    pub fn as_param(&self) -> &'static str {
        match self {
            FieldSet::Full => "reach,impressions,spend,actions,action_values",
            FieldSet::ReachImpressions => "reach,impressions",
            FieldSet::ReachOnly => "reach",
        }
    }
}

/// One aggregate query against the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsQuery {
    pub entity_id: String,
    pub level: EntityLevel,
    pub window: Period,
    /// Break the result down by age and gender.
    pub breakdown: bool,
    pub fields: FieldSet,
}

/// Which bucket an upstream row belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketKey {
    /// Unbroken-down response: the single implicit TOTAL bucket.
    Total,
    /// A known age/gender bucket.
    Segment(Segment),
    /// A breakdown value outside the fixed set, kept under its raw key.
    /// Counted toward TOTAL only.
    Unrecognized(String),
}

/// A parsed upstream row.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightRow {
    pub bucket: BucketKey,
    pub metrics: RawSegmentMetrics,
}

/// Source of time-ranged, breakdown-filtered aggregate insights.
///
/// Implementations must hide pagination and return the fully
/// materialized row list for the window.
#[async_trait]
pub trait InsightsSource: Send + Sync {
    async fn query(&self, query: &InsightsQuery) -> Result<Vec<InsightRow>, FetchError>;
}
