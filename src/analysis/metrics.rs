//! Derived metrics and per-segment rolling state.

use crate::models::{Demographic, MetricRow, Period, RawSegmentMetrics};
use std::collections::HashMap;
use tracing::warn;

/// Last observed cumulative reach per demographic, owned by one run.
#[derive(Debug, Clone, Default)]
pub struct RollingState {
    last_cumulative_reach: HashMap<Demographic, i64>,
}

impl RollingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Previous cumulative reach, 0 if never recorded.
    pub fn get(&self, demographic: Demographic) -> i64 {
        self.last_cumulative_reach
            .get(&demographic)
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&mut self, demographic: Demographic, cumulative_reach: i64) {
        self.last_cumulative_reach.insert(demographic, cumulative_reach);
    }

    /// Record `cumulative_reach` and return how much it grew since the last call.
    pub fn advance(&mut self, demographic: Demographic, cumulative_reach: i64) -> i64 {
        let incremental = cumulative_reach - self.get(demographic);
        self.set(demographic, cumulative_reach);
        incremental
    }
}

/// Reach of the two trailing 28-day windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rolling28Reach {
    pub current: i64,
    pub previous: i64,
}

/// Everything the derived-metric computation needs for one row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricInputs {
    pub period: RawSegmentMetrics,
    pub cumulative_reach: i64,
    pub cumulative_impressions: i64,
    /// `Some` only in rolling-28 mode.
    pub rolling28: Option<Rolling28Reach>,
}

/// `numerator / denominator`, or 0 when the denominator is 0.
fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Cost per thousand, only meaningful for a positive audience.
fn cost_per_mille(spend: f64, audience: i64) -> Option<f64> {
    (audience > 0).then(|| spend / audience as f64 * 1000.0)
}

/// Compute one metric row and advance the rolling state for `demographic`.
pub fn compute_row(
    period: Period,
    demographic: Demographic,
    inputs: &MetricInputs,
    state: &mut RollingState,
) -> MetricRow {
    let raw = inputs.period;
    let reach = raw.reach as f64;
    let impressions = raw.impressions as f64;

    let period_frequency = ratio_or_zero(impressions, reach);
    let period_cpm = ratio_or_zero(raw.spend, impressions) * 1000.0;
    let period_cpmr = ratio_or_zero(raw.spend, reach) * 1000.0;
    let period_cpa = (raw.conversions != 0.0).then(|| raw.spend / raw.conversions);
    let period_roas = (raw.spend != 0.0).then(|| raw.revenue / raw.spend);

    let rolling_frequency = ratio_or_zero(
        inputs.cumulative_impressions as f64,
        inputs.cumulative_reach as f64,
    );

    // Read-before-write: the previous value must be observed first.
    let incremental_reach = state.advance(demographic, inputs.cumulative_reach);
    let cpim = cost_per_mille(raw.spend, incremental_reach);

    if incremental_reach < 0 {
        warn!(
            "Cumulative reach for {} dropped by {} in period {}",
            demographic, -incremental_reach, period
        );
    }

    let (rolling28_reach, rolling28_incremental_reach, rolling28_cpmi) = match inputs.rolling28 {
        Some(rolling) => {
            let incremental = rolling.current - rolling.previous;
            (
                Some(rolling.current),
                Some(incremental),
                cost_per_mille(raw.spend, incremental),
            )
        }
        None => (None, None, None),
    };

    MetricRow {
        period_start: period.start,
        period_end: period.end,
        demographic,
        period_spend: raw.spend,
        period_reach: raw.reach,
        period_impressions: raw.impressions,
        period_conversions: raw.conversions,
        period_revenue: raw.revenue,
        period_frequency,
        period_cpm,
        period_cpmr,
        period_cpa,
        period_roas,
        rolling_reach: inputs.cumulative_reach,
        cumulative_impressions: inputs.cumulative_impressions,
        rolling_frequency,
        incremental_reach,
        cpim,
        rolling28_reach,
        rolling28_incremental_reach,
        rolling28_cpmi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeBracket, Gender, Segment};
    use chrono::NaiveDate;

    fn day(n: u32) -> Period {
        let d = NaiveDate::from_ymd_opt(2024, 1, n).unwrap();
        Period::new(d, d)
    }

    fn inputs(spend: f64, reach: i64, impressions: i64, cumulative_reach: i64) -> MetricInputs {
        MetricInputs {
            period: RawSegmentMetrics {
                reach,
                impressions,
                spend,
                conversions: 0.0,
                revenue: 0.0,
            },
            cumulative_reach,
            cumulative_impressions: impressions,
            rolling28: None,
        }
    }

    #[test]
    fn test_period_ratios() {
        let mut state = RollingState::new();
        let mut input = inputs(64.0, 1024, 2048, 1024);
        input.period.conversions = 4.0;
        input.period.revenue = 256.0;
        input.cumulative_impressions = 3072;

        let row = compute_row(day(1), Demographic::Total, &input, &mut state);

        assert_eq!(row.period_frequency, 2.0);
        assert_eq!(row.period_cpm, 31.25);
        assert_eq!(row.period_cpmr, 62.5);
        assert_eq!(row.period_cpa, Some(16.0));
        assert_eq!(row.period_roas, Some(4.0));
        assert_eq!(row.rolling_frequency, 3.0);
        assert_eq!(row.incremental_reach, 1024);
        assert_eq!(row.cpim, Some(62.5));
        assert_eq!(row.rolling28_reach, None);
        assert_eq!(row.rolling28_incremental_reach, None);
        assert_eq!(row.rolling28_cpmi, None);
    }

    #[test]
    fn test_zero_denominators() {
        let mut state = RollingState::new();
        let row = compute_row(day(1), Demographic::Total, &inputs(0.0, 0, 0, 0), &mut state);

        assert_eq!(row.period_frequency, 0.0);
        assert_eq!(row.period_cpm, 0.0);
        assert_eq!(row.period_cpmr, 0.0);
        assert_eq!(row.rolling_frequency, 0.0);
        assert_eq!(row.period_cpa, None);
        assert_eq!(row.period_roas, None);
        assert_eq!(row.cpim, None);
    }

    #[test]
    fn test_cpa_and_roas_nullability_is_independent() {
        let mut state = RollingState::new();
        let mut input = inputs(0.0, 10, 10, 10);
        input.period.conversions = 3.0;
        input.period.revenue = 9.0;
        let row = compute_row(day(1), Demographic::Total, &input, &mut state);
        assert_eq!(row.period_cpa, Some(0.0));
        assert_eq!(row.period_roas, None);

        let input = inputs(12.0, 10, 10, 10);
        let row = compute_row(day(2), Demographic::Total, &input, &mut state);
        assert_eq!(row.period_cpa, None);
        assert_eq!(row.period_roas, Some(0.0));
    }

    #[test]
    fn test_incremental_reach_sequence() {
        let mut state = RollingState::new();
        let incremental: Vec<i64> = [100, 150, 150, 400]
            .into_iter()
            .enumerate()
            .map(|(i, cumulative)| {
                compute_row(
                    day(i as u32 + 1),
                    Demographic::Total,
                    &inputs(10.0, 10, 10, cumulative),
                    &mut state,
                )
                .incremental_reach
            })
            .collect();

        assert_eq!(incremental, vec![100, 50, 0, 250]);
    }

    #[test]
    fn test_cpim_null_for_zero_and_negative_incremental() {
        let mut state = RollingState::new();
        compute_row(day(1), Demographic::Total, &inputs(10.0, 10, 10, 120), &mut state);

        let flat = compute_row(day(2), Demographic::Total, &inputs(10.0, 10, 10, 120), &mut state);
        assert_eq!(flat.incremental_reach, 0);
        assert_eq!(flat.cpim, None);

        let regressed = compute_row(
            day(3),
            Demographic::Total,
            &inputs(10.0, 10, 10, 100),
            &mut state,
        );
        assert_eq!(regressed.incremental_reach, -20);
        assert_eq!(regressed.cpim, None);
    }

    #[test]
    fn test_state_is_keyed_per_demographic() {
        let mut state = RollingState::new();
        let segment = Demographic::Segment(Segment::new(AgeBracket::Age25To34, Gender::Male));

        compute_row(day(1), Demographic::Total, &inputs(1.0, 1, 1, 500), &mut state);
        let row = compute_row(day(1), segment, &inputs(1.0, 1, 1, 40), &mut state);

        assert_eq!(row.incremental_reach, 40);
        assert_eq!(state.get(Demographic::Total), 500);
        assert_eq!(state.get(segment), 40);
    }

    #[test]
    fn test_rolling28_metrics() {
        let mut state = RollingState::new();
        let mut input = inputs(30.0, 100, 100, 100);
        input.rolling28 = Some(Rolling28Reach {
            current: 900,
            previous: 840,
        });

        let row = compute_row(day(1), Demographic::Total, &input, &mut state);
        assert_eq!(row.rolling28_reach, Some(900));
        assert_eq!(row.rolling28_incremental_reach, Some(60));
        assert_eq!(row.rolling28_cpmi, Some(500.0));

        input.rolling28 = Some(Rolling28Reach {
            current: 800,
            previous: 840,
        });
        let row = compute_row(day(2), Demographic::Total, &input, &mut state);
        assert_eq!(row.rolling28_incremental_reach, Some(-40));
        assert_eq!(row.rolling28_cpmi, None);
    }
}
