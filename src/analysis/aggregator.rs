//! Per-period aggregation.
//!
//! Folds the parsed rows of each fetched window into totals and segment
//! lookups, then emits the TOTAL row followed by the per-segment rows.

use super::metrics::{compute_row, MetricInputs, Rolling28Reach, RollingState};
use crate::insights::{BucketKey, InsightRow};
use crate::models::{Demographic, MetricRow, Period, RawSegmentMetrics, Segment};
use std::collections::HashMap;

/// The parsed content of one fetched window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowData {
    total: RawSegmentMetrics,
    segments: HashMap<Segment, RawSegmentMetrics>,
}

impl WindowData {
    /// Fold upstream rows. Every row counts toward the total; rows of a
    /// known segment are also indexed, summing repeated keys.
    pub fn from_rows(rows: &[InsightRow]) -> Self {
        let mut window = Self::default();

        for row in rows {
            window.total += row.metrics;
            if let BucketKey::Segment(segment) = &row.bucket {
                *window.segments.entry(*segment).or_default() += row.metrics;
            }
        }

        window
    }

    /// Sum over every bucket of the window.
    pub fn total(&self) -> RawSegmentMetrics {
        self.total
    }

    /// Figures of one segment, zero when the response omitted it.
    pub fn segment(&self, segment: Segment) -> RawSegmentMetrics {
        self.segments.get(&segment).copied().unwrap_or_default()
    }
}

/// The two rolling-28 windows of a period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rolling28Data {
    pub current: WindowData,
    pub previous: WindowData,
}

/// All fetched windows of one period.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodData {
    pub period: WindowData,
    pub cumulative: WindowData,
    /// Present only in rolling-28 mode.
    pub rolling28: Option<Rolling28Data>,
}

impl PeriodData {
    fn total_inputs(&self) -> MetricInputs {
        let cumulative = self.cumulative.total();
        MetricInputs {
            period: self.period.total(),
            cumulative_reach: cumulative.reach,
            cumulative_impressions: cumulative.impressions,
            rolling28: self.rolling28.as_ref().map(|r| Rolling28Reach {
                current: r.current.total().reach,
                previous: r.previous.total().reach,
            }),
        }
    }

    fn segment_inputs(&self, segment: Segment) -> MetricInputs {
        let cumulative = self.cumulative.segment(segment);
        MetricInputs {
            period: self.period.segment(segment),
            cumulative_reach: cumulative.reach,
            cumulative_impressions: cumulative.impressions,
            rolling28: self.rolling28.as_ref().map(|r| Rolling28Reach {
                current: r.current.segment(segment).reach,
                previous: r.previous.segment(segment).reach,
            }),
        }
    }
}

/// Whether a segment has nothing to report for the period.
fn is_sparse(inputs: &MetricInputs) -> bool {
    inputs.period.reach == 0 && inputs.period.impressions == 0 && inputs.cumulative_reach == 0
}

/// Rows for one period: TOTAL first, then each non-sparse segment in
/// canonical order when `include_demographics` is set.
pub fn aggregate_period(
    period: Period,
    data: &PeriodData,
    include_demographics: bool,
    state: &mut RollingState,
) -> Vec<MetricRow> {
    let mut rows = vec![compute_row(
        period,
        Demographic::Total,
        &data.total_inputs(),
        state,
    )];

    if include_demographics {
        for segment in Segment::ALL {
            let inputs = data.segment_inputs(segment);
            if is_sparse(&inputs) {
                continue;
            }
            rows.push(compute_row(
                period,
                Demographic::Segment(segment),
                &inputs,
                state,
            ));
        }
    }

    rows
}
