//! Period planning.
//!
//! Splits the analysis range into reporting periods and derives the
//! windows that have to be fetched for each of them.

use crate::models::{AnalysisConfig, IntervalKind, Period};
use chrono::{Days, NaiveDate};

/// Width of the trailing incrementality window in rolling-28 mode.
pub const ROLLING_WINDOW_DAYS: u64 = 28;

/// Plan the ordered periods covering `[date_start, date_end]`.
///
/// Periods are `interval.lookback_days()` long, tile the range left to right
/// and the last one is clamped to `date_end`. A reversed range yields no
/// periods; rejecting it is up to the caller.
pub fn plan_periods(
    date_start: NaiveDate,
    date_end: NaiveDate,
    interval: IntervalKind,
) -> Vec<Period> {
    let lookback = interval.lookback_days();
    let mut periods = Vec::new();
    let mut cursor = Some(date_start);

    while let Some(start) = cursor.filter(|c| *c <= date_end) {
        let end = start
            .checked_add_days(Days::new(lookback - 1))
            .map_or(date_end, |end| end.min(date_end));
        periods.push(Period::new(start, end));

        // Advance by the full lookback, not by the clamped length.
        cursor = start.checked_add_days(Days::new(lookback));
    }

    periods
}

/// The trailing 28-day windows anchored on a period's end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rolling28Windows {
    /// `[end - 27, end]`
    pub current: Period,
    /// `[end - 27, end - 1]`: same start, one day shorter.
    pub previous: Period,
}

impl Rolling28Windows {
    pub fn anchored_on(end: NaiveDate) -> Self {
        let start = end
            .checked_sub_days(Days::new(ROLLING_WINDOW_DAYS - 1))
            .unwrap_or(NaiveDate::MIN);
        let previous_end = end.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN);

        Self {
            current: Period::new(start, end),
            previous: Period::new(start, previous_end),
        }
    }
}

/// Every window fetched for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    /// The period itself.
    pub period: Period,
    /// From the start of the analysis to the period's end.
    pub cumulative: Period,
    /// Present only in rolling-28 mode.
    pub rolling28: Option<Rolling28Windows>,
}

impl WindowPlan {
    pub fn for_period(config: &AnalysisConfig, period: Period) -> Self {
        Self {
            period,
            cumulative: Period::new(config.date_start, period.end),
            rolling28: config
                .is_rolling28()
                .then(|| Rolling28Windows::anchored_on(period.end)),
        }
    }

    /// Number of fetches this plan issues.
    pub fn fetch_count(&self) -> usize {
        if self.rolling28.is_some() {
            4
        } else {
            2
        }
    }
}

/// Plan every period of a run together with its windows.
pub fn plan_windows(config: &AnalysisConfig) -> Vec<WindowPlan> {
    plan_periods(config.date_start, config.date_end, config.interval)
        .into_iter()
        .map(|period| WindowPlan::for_period(config, period))
        .collect()
}
