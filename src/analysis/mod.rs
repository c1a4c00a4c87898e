//! Metric computation.
//!
//! Plans the reporting periods, aggregates fetched windows and derives the
//! reach, cost and incrementality figures for every period.

pub mod aggregator;
pub mod engine;
pub mod metrics;
pub mod planner;

pub use engine::{AnalysisEngine, EngineOptions};
pub use planner::plan_windows;
