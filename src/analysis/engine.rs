//! Analysis run loop.
//!
//! Periods are processed strictly in order because the rolling state carries
//! from one period to the next. The windows of a single period are
//! independent reads and may be fetched concurrently.

use super::aggregator::{aggregate_period, PeriodData, Rolling28Data, WindowData};
use super::metrics::RollingState;
use super::planner::{plan_windows, WindowPlan};
use crate::error::AnalysisError;
use crate::insights::{FieldSet, InsightsQuery, InsightsSource};
use crate::models::{AnalysisConfig, MetricRow, Period};
use crate::pacing::PacingPolicy;
use futures::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Options for the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Issue the windows of a period concurrently.
    pub concurrent_fetches: bool,
    /// Draw a progress bar over periods.
    pub show_progress: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrent_fetches: true,
            show_progress: false,
        }
    }
}

/// Runs one analysis against an insights source.
pub struct AnalysisEngine<S> {
    source: S,
    pacing: Box<dyn PacingPolicy>,
    options: EngineOptions,
}

impl<S: InsightsSource> AnalysisEngine<S> {
    pub fn new(source: S, pacing: Box<dyn PacingPolicy>, options: EngineOptions) -> Self {
        Self {
            source,
            pacing,
            options,
        }
    }

    /// Run the analysis and return its rows in period order, TOTAL first
    /// within each period.
    ///
    /// Any fetch failure or a cancellation aborts the run without rows.
    pub async fn run(
        &self,
        config: &AnalysisConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<MetricRow>, AnalysisError> {
        config.validate()?;

        let plans = plan_windows(config);
        info!(
            "Running {} analysis for {} ({}): {} period(s) from {} to {}",
            config.interval,
            config.entity_id,
            config.level,
            plans.len(),
            config.date_start,
            config.date_end
        );

        let progress = self.progress_bar(plans.len() as u64);
        let mut state = RollingState::new();
        let mut rows = Vec::new();

        for (index, plan) in plans.iter().enumerate() {
            if cancel.is_cancelled() {
                progress.abandon();
                return Err(AnalysisError::Cancelled {
                    completed_periods: index,
                });
            }

            progress.set_message(plan.period.to_string());
            let data = self
                .with_cancel(cancel, index, self.fetch_period(config, plan))
                .await??;

            if plan.rolling28.is_some() {
                self.with_cancel(cancel, index, self.pacing.after_rolling_windows())
                    .await?;
            }

            rows.extend(aggregate_period(
                plan.period,
                &data,
                config.include_demographics,
                &mut state,
            ));
            progress.inc(1);

            if index + 1 < plans.len() {
                self.with_cancel(cancel, index + 1, self.pacing.between_periods())
                    .await?;
            }
        }

        progress.finish_and_clear();
        info!("Analysis produced {} rows", rows.len());

        Ok(rows)
    }

    /// Race `work` against cancellation.
    async fn with_cancel<T>(
        &self,
        cancel: &CancellationToken,
        completed_periods: usize,
        work: impl Future<Output = T>,
    ) -> Result<T, AnalysisError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AnalysisError::Cancelled { completed_periods }),
            value = work => Ok(value),
        }
    }

    /// Fetch every window of one period.
    async fn fetch_period(
        &self,
        config: &AnalysisConfig,
        plan: &WindowPlan,
    ) -> Result<PeriodData, AnalysisError> {
        let queries = period_queries(config, plan);

        let windows = if self.options.concurrent_fetches {
            try_join_all(queries.iter().map(|query| self.fetch_window(query))).await?
        } else {
            let mut windows = Vec::with_capacity(queries.len());
            for query in &queries {
                windows.push(self.fetch_window(query).await?);
            }
            windows
        };

        let mut windows = windows.into_iter();
        let mut next = || windows.next().unwrap_or_default();

        Ok(PeriodData {
            period: next(),
            cumulative: next(),
            rolling28: plan.rolling28.map(|_| Rolling28Data {
                current: next(),
                previous: next(),
            }),
        })
    }

    async fn fetch_window(&self, query: &InsightsQuery) -> Result<WindowData, AnalysisError> {
        let rows = self
            .source
            .query(query)
            .await
            .map_err(|source| AnalysisError::UpstreamFetch {
                entity_id: query.entity_id.clone(),
                since: query.window.start,
                until: query.window.end,
                source,
            })?;

        debug!(
            "Window {} ({}): {} rows",
            query.window,
            query.fields.as_param(),
            rows.len()
        );

        Ok(WindowData::from_rows(&rows))
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

/// Queries for a period, in order: period, cumulative, then the current and
/// previous rolling-28 windows.
pub fn period_queries(config: &AnalysisConfig, plan: &WindowPlan) -> Vec<InsightsQuery> {
    let query = |window: Period, fields: FieldSet| InsightsQuery {
        entity_id: config.entity_id.clone(),
        level: config.level,
        window,
        breakdown: config.include_demographics,
        fields,
    };

    let mut queries = vec![
        query(plan.period, FieldSet::Full),
        query(plan.cumulative, FieldSet::ReachImpressions),
    ];
    if let Some(rolling) = plan.rolling28 {
        queries.push(query(rolling.current, FieldSet::ReachOnly));
        queries.push(query(rolling.previous, FieldSet::ReachOnly));
    }
    queries
}
