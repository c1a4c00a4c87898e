//! Data models for the reach analysis.
//!
//! This module contains the core data structures shared by the planner,
//! the insights adapter, the metric engine and the report writers.

use crate::error::AnalysisError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

/// Granularity of the reporting periods.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum IntervalKind {
    /// One period per day (default)
    #[default]
    #[serde(rename = "DAILY")]
    Daily,
    /// Seven-day periods
    #[serde(rename = "WEEKLY")]
    Weekly,
    /// Twenty-eight-day periods
    #[serde(rename = "MONTHLY")]
    Monthly,
    /// Daily periods with trailing 28-day incrementality windows
    #[serde(rename = "DAILY_ROLLING_28")]
    #[value(name = "daily-rolling-28")]
    DailyRolling28,
}

impl IntervalKind {
    /// Length in days of each planned period.
    pub fn lookback_days(&self) -> u64 {
        match self {
            IntervalKind::Daily | IntervalKind::DailyRolling28 => 1,
            IntervalKind::Weekly => 7,
            IntervalKind::Monthly => 28,
        }
    }

    /// Whether each period also anchors the two trailing 28-day windows.
    pub fn is_rolling28(&self) -> bool {
        matches!(self, IntervalKind::DailyRolling28)
    }
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalKind::Daily => write!(f, "DAILY"),
            IntervalKind::Weekly => write!(f, "WEEKLY"),
            IntervalKind::Monthly => write!(f, "MONTHLY"),
            IntervalKind::DailyRolling28 => write!(f, "DAILY_ROLLING_28"),
        }
    }
}

/// Scope of the analysed entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityLevel {
    /// An ad account (`act_...`)
    #[default]
    Account,
    /// A single campaign
    Campaign,
    /// A single ad
    Ad,
}

impl EntityLevel {
    /// The `level` parameter sent to the insights endpoint, if any.
    pub fn graph_level(&self) -> Option<&'static str> {
        match self {
            EntityLevel::Account => Some("account"),
            EntityLevel::Campaign | EntityLevel::Ad => None,
        }
    }
}

impl fmt::Display for EntityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityLevel::Account => write!(f, "ACCOUNT"),
            EntityLevel::Campaign => write!(f, "CAMPAIGN"),
            EntityLevel::Ad => write!(f, "AD"),
        }
    }
}

/// Immutable inputs of one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Account, campaign or ad identifier.
    pub entity_id: String,
    /// Scope of `entity_id`.
    pub level: EntityLevel,
    /// First day of the analysis (inclusive).
    pub date_start: NaiveDate,
    /// Last day of the analysis (inclusive).
    pub date_end: NaiveDate,
    /// Period granularity.
    pub interval: IntervalKind,
    /// Emit one row per age/gender segment in addition to TOTAL.
    pub include_demographics: bool,
    /// Optional human-readable label for the report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AnalysisConfig {
    /// Build a validated configuration.
    ///
    /// Rejects an empty entity id and a reversed date range.
    pub fn new(
        entity_id: impl Into<String>,
        level: EntityLevel,
        date_start: NaiveDate,
        date_end: NaiveDate,
        interval: IntervalKind,
        include_demographics: bool,
    ) -> Result<Self, AnalysisError> {
        let config = Self {
            entity_id: entity_id.into(),
            level,
            date_start,
            date_end,
            interval,
            include_demographics,
            name: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Attach a report label.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }

    /// Check the invariants the run relies on.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.entity_id.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "entity id must not be empty".to_string(),
            ));
        }
        if self.date_start > self.date_end {
            return Err(AnalysisError::InvalidConfig(format!(
                "date range start {} is after end {}",
                self.date_start, self.date_end
            )));
        }
        Ok(())
    }

    pub fn is_rolling28(&self) -> bool {
        self.interval.is_rolling28()
    }
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, 0 for a reversed window.
    pub fn days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

/// Age buckets reported by the insights breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgeBracket {
    Age13To17,
    Age18To24,
    Age25To34,
    Age35To44,
    Age45To54,
    Age55To64,
    Age65Plus,
}

impl AgeBracket {
    pub const ALL: [AgeBracket; 7] = [
        AgeBracket::Age13To17,
        AgeBracket::Age18To24,
        AgeBracket::Age25To34,
        AgeBracket::Age35To44,
        AgeBracket::Age45To54,
        AgeBracket::Age55To64,
        AgeBracket::Age65Plus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeBracket::Age13To17 => "13-17",
            AgeBracket::Age18To24 => "18-24",
            AgeBracket::Age25To34 => "25-34",
            AgeBracket::Age35To44 => "35-44",
            AgeBracket::Age45To54 => "45-54",
            AgeBracket::Age55To64 => "55-64",
            AgeBracket::Age65Plus => "65+",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|age| age.as_str() == s)
    }
}

/// Gender buckets reported by the insights breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|gender| gender.as_str() == s)
    }
}

/// One of the 21 fixed age x gender buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    pub age: AgeBracket,
    pub gender: Gender,
}

impl Segment {
    /// Canonical emission order: age ascending, then male, female, unknown.
    pub const ALL: [Segment; 21] = {
        let mut all = [Segment {
            age: AgeBracket::Age13To17,
            gender: Gender::Male,
        }; 21];
        let mut i = 0;
        while i < 21 {
            all[i] = Segment {
                age: AgeBracket::ALL[i / 3],
                gender: Gender::ALL[i % 3],
            };
            i += 1;
        }
        all
    };

    pub fn new(age: AgeBracket, gender: Gender) -> Self {
        Self { age, gender }
    }

    /// Underscore-joined key, e.g. `25-34_female`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.age.as_str(), self.gender.as_str())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Row label: the synthetic aggregate or one concrete segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Demographic {
    Total,
    Segment(Segment),
}

impl Demographic {
    pub fn is_total(&self) -> bool {
        matches!(self, Demographic::Total)
    }
}

impl fmt::Display for Demographic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Demographic::Total => write!(f, "TOTAL"),
            Demographic::Segment(segment) => write!(f, "{}", segment),
        }
    }
}

impl FromStr for Demographic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "TOTAL" {
            return Ok(Demographic::Total);
        }
        let (age, gender) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("Unknown demographic: {}", s))?;
        match (AgeBracket::parse(age), Gender::parse(gender)) {
            (Some(age), Some(gender)) => Ok(Demographic::Segment(Segment::new(age, gender))),
            _ => Err(format!("Unknown demographic: {}", s)),
        }
    }
}

impl From<Demographic> for String {
    fn from(demographic: Demographic) -> Self {
        demographic.to_string()
    }
}

impl TryFrom<String> for Demographic {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Raw figures for one bucket of one fetched window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSegmentMetrics {
    pub reach: i64,
    pub impressions: i64,
    pub spend: f64,
    pub conversions: f64,
    pub revenue: f64,
}

impl AddAssign for RawSegmentMetrics {
    fn add_assign(&mut self, other: Self) {
        self.reach += other.reach;
        self.impressions += other.impressions;
        self.spend += other.spend;
        self.conversions += other.conversions;
        self.revenue += other.revenue;
    }
}

/// One output row per (period, demographic). All fields are flat scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub demographic: Demographic,

    pub period_spend: f64,
    pub period_reach: i64,
    pub period_impressions: i64,
    pub period_conversions: f64,
    pub period_revenue: f64,

    pub period_frequency: f64,
    pub period_cpm: f64,
    pub period_cpmr: f64,
    pub period_cpa: Option<f64>,
    pub period_roas: Option<f64>,
    pub rolling_reach: i64,
    pub cumulative_impressions: i64,
    pub rolling_frequency: f64,
    pub incremental_reach: i64,
    /// Cost per thousand incrementally reached people.
    pub cpim: Option<f64>,

    pub rolling28_reach: Option<i64>,
    pub rolling28_incremental_reach: Option<i64>,
    pub rolling28_cpmi: Option<f64>,
}

/// Headline figures over the TOTAL rows of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of periods with a TOTAL row.
    pub periods: usize,
    pub total_spend: f64,
    pub total_impressions: i64,
    pub total_conversions: f64,
    pub total_revenue: f64,
    /// Cumulative reach of the last period.
    pub final_cumulative_reach: i64,
    /// Spend per thousand people reached over the whole run.
    pub overall_cpmi: Option<f64>,
    pub overall_roas: Option<f64>,
    /// Periods whose TOTAL incremental reach went negative.
    pub negative_incremental_periods: usize,
}

impl RunSummary {
    /// Creates a summary from the rows of a run.
    pub fn from_rows(rows: &[MetricRow]) -> Self {
        let mut summary = Self::default();

        for row in rows.iter().filter(|r| r.demographic.is_total()) {
            summary.periods += 1;
            summary.total_spend += row.period_spend;
            summary.total_impressions += row.period_impressions;
            summary.total_conversions += row.period_conversions;
            summary.total_revenue += row.period_revenue;
            summary.final_cumulative_reach = row.rolling_reach;
            if row.incremental_reach < 0 {
                summary.negative_incremental_periods += 1;
            }
        }

        summary.overall_cpmi = (summary.final_cumulative_reach > 0)
            .then(|| summary.total_spend / summary.final_cumulative_reach as f64 * 1000.0);
        summary.overall_roas =
            (summary.total_spend != 0.0).then(|| summary.total_revenue / summary.total_spend);

        summary
    }
}

/// Metadata about the analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Inputs of the run.
    pub analysis: AnalysisConfig,
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Wall-clock duration of the run in seconds.
    pub duration_seconds: f64,
    /// Number of emitted rows.
    pub row_count: usize,
}

/// The complete analysis report handed to the writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    pub summary: RunSummary,
    pub rows: Vec<MetricRow>,
}

impl AnalysisReport {
    pub fn new(analysis: AnalysisConfig, rows: Vec<MetricRow>, duration_seconds: f64) -> Self {
        Self {
            metadata: ReportMetadata {
                analysis,
                generated_at: Utc::now(),
                duration_seconds,
                row_count: rows.len(),
            },
            summary: RunSummary::from_rows(&rows),
            rows,
        }
    }

    pub fn is_rolling28(&self) -> bool {
        self.metadata.analysis.is_rolling28()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_lookback_days() {
        assert_eq!(IntervalKind::Daily.lookback_days(), 1);
        assert_eq!(IntervalKind::DailyRolling28.lookback_days(), 1);
        assert_eq!(IntervalKind::Weekly.lookback_days(), 7);
        assert_eq!(IntervalKind::Monthly.lookback_days(), 28);
        assert!(IntervalKind::DailyRolling28.is_rolling28());
        assert!(!IntervalKind::Monthly.is_rolling28());
    }

    #[test]
    fn test_segment_set_is_complete_and_ordered() {
        let keys: Vec<String> = Segment::ALL.iter().map(Segment::key).collect();
        assert_eq!(keys.len(), 21);
        assert_eq!(keys.iter().collect::<HashSet<_>>().len(), 21);
        assert_eq!(keys[0], "13-17_male");
        assert_eq!(keys[1], "13-17_female");
        assert_eq!(keys[2], "13-17_unknown");
        assert_eq!(keys[20], "65+_unknown");
    }

    #[test]
    fn test_demographic_parse() {
        assert_eq!("TOTAL".parse::<Demographic>(), Ok(Demographic::Total));
        assert_eq!(
            "65+_female".parse::<Demographic>(),
            Ok(Demographic::Segment(Segment::new(
                AgeBracket::Age65Plus,
                Gender::Female
            )))
        );
        assert!("unknown_male".parse::<Demographic>().is_err());
        assert!("25-34_other".parse::<Demographic>().is_err());
    }

    #[test]
    fn test_demographic_serializes_as_key() {
        let demo = Demographic::Segment(Segment::new(AgeBracket::Age25To34, Gender::Male));
        assert_eq!(serde_json::to_string(&demo).unwrap(), "\"25-34_male\"");
        assert_eq!(
            serde_json::to_string(&Demographic::Total).unwrap(),
            "\"TOTAL\""
        );
    }

    #[test]
    fn test_interval_serde_names() {
        assert_eq!(
            serde_json::to_string(&IntervalKind::DailyRolling28).unwrap(),
            "\"DAILY_ROLLING_28\""
        );
        assert_eq!(IntervalKind::Weekly.to_string(), "WEEKLY");
    }

    #[test]
    fn test_config_rejects_reversed_range() {
        let result = AnalysisConfig::new(
            "act_1",
            EntityLevel::Account,
            date("2024-02-01"),
            date("2024-01-01"),
            IntervalKind::Daily,
            true,
        );
        assert!(matches!(result, Err(AnalysisError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_rejects_empty_entity() {
        let result = AnalysisConfig::new(
            "  ",
            EntityLevel::Campaign,
            date("2024-01-01"),
            date("2024-01-01"),
            IntervalKind::Daily,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_metrics_add_assign() {
        let mut total = RawSegmentMetrics::default();
        total += RawSegmentMetrics {
            reach: 10,
            impressions: 20,
            spend: 1.5,
            conversions: 1.0,
            revenue: 3.0,
        };
        total += RawSegmentMetrics {
            reach: 5,
            impressions: 5,
            spend: 0.5,
            conversions: 0.0,
            revenue: 0.0,
        };
        assert_eq!(total.reach, 15);
        assert_eq!(total.impressions, 25);
        assert_eq!(total.spend, 2.0);
        assert_eq!(total.revenue, 3.0);
    }

    #[test]
    fn test_graph_level() {
        assert_eq!(EntityLevel::Account.graph_level(), Some("account"));
        assert_eq!(EntityLevel::Ad.graph_level(), None);
    }

    fn metric_row(
        demographic: Demographic,
        spend: f64,
        cumulative: i64,
        incremental: i64,
    ) -> MetricRow {
        MetricRow {
            period_start: date("2024-01-01"),
            period_end: date("2024-01-01"),
            demographic,
            period_spend: spend,
            period_reach: 0,
            period_impressions: 100,
            period_conversions: 1.0,
            period_revenue: spend * 2.0,
            period_frequency: 0.0,
            period_cpm: 0.0,
            period_cpmr: 0.0,
            period_cpa: None,
            period_roas: None,
            rolling_reach: cumulative,
            cumulative_impressions: 0,
            rolling_frequency: 0.0,
            incremental_reach: incremental,
            cpim: None,
            rolling28_reach: None,
            rolling28_incremental_reach: None,
            rolling28_cpmi: None,
        }
    }

    #[test]
    fn test_run_summary_counts_total_rows_only() {
        let segment = Demographic::Segment(Segment::new(AgeBracket::Age18To24, Gender::Male));
        let rows = vec![
            metric_row(Demographic::Total, 10.0, 200, 200),
            metric_row(segment, 4.0, 80, 80),
            metric_row(Demographic::Total, 6.0, 180, -20),
            metric_row(Demographic::Total, 16.0, 256, 76),
        ];

        let summary = RunSummary::from_rows(&rows);

        assert_eq!(summary.periods, 3);
        assert_eq!(summary.total_spend, 32.0);
        assert_eq!(summary.total_impressions, 300);
        assert_eq!(summary.total_conversions, 3.0);
        assert_eq!(summary.final_cumulative_reach, 256);
        assert_eq!(summary.overall_cpmi, Some(125.0));
        assert_eq!(summary.overall_roas, Some(2.0));
        assert_eq!(summary.negative_incremental_periods, 1);
    }

    #[test]
    fn test_run_summary_of_empty_run() {
        let summary = RunSummary::from_rows(&[]);
        assert_eq!(summary.periods, 0);
        assert_eq!(summary.overall_cpmi, None);
        assert_eq!(summary.overall_roas, None);
    }

    #[test]
    fn test_period_days() {
        let period = Period::new(date("2024-01-01"), date("2024-01-07"));
        assert_eq!(period.days(), 7);
        assert_eq!(period.to_string(), "2024-01-01 .. 2024-01-07");
    }

    #[test]
    fn test_reversed_period_has_no_days() {
        assert_eq!(Period::new(date("2024-01-02"), date("2024-01-01")).days(), 0);
        assert_eq!(Period::new(date("2024-01-10"), date("2024-01-01")).days(), 0);
        assert_eq!(Period::new(date("2024-01-01"), date("2024-01-01")).days(), 1);
    }
}
