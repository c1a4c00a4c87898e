//! Request pacing against the insights API.
//!
//! The engine waits on a [`PacingPolicy`] after the rolling-28 fetches and
//! between periods. The Graph client uses [`Backoff`] to space out retries
//! of throttled requests.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Throttle applied by the engine between fetch batches.
#[async_trait]
pub trait PacingPolicy: Send + Sync {
    /// Called after the two extra rolling-28 window fetches of a period.
    async fn after_rolling_windows(&self);

    /// Called between two consecutive periods.
    async fn between_periods(&self);
}

/// Fixed sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub between_periods: Duration,
    pub after_rolling: Duration,
}

impl FixedDelay {
    pub fn from_millis(between_periods_ms: u64, after_rolling_ms: u64) -> Self {
        Self {
            between_periods: Duration::from_millis(between_periods_ms),
            after_rolling: Duration::from_millis(after_rolling_ms),
        }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::from_millis(500, 300)
    }
}

#[async_trait]
impl PacingPolicy for FixedDelay {
    async fn after_rolling_windows(&self) {
        if !self.after_rolling.is_zero() {
            tokio::time::sleep(self.after_rolling).await;
        }
    }

    async fn between_periods(&self) {
        if !self.between_periods.is_zero() {
            debug!("Pacing {}ms before next period", self.between_periods.as_millis());
            tokio::time::sleep(self.between_periods).await;
        }
    }
}

/// No waiting at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

#[async_trait]
impl PacingPolicy for NoPacing {
    async fn after_rolling_windows(&self) {}

    async fn between_periods(&self) {}
}

/// Exponential retry schedule: `base`, `2 * base`, `4 * base`, ... capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub retries: usize,
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(retries: usize, base_ms: u64) -> Self {
        Self {
            retries,
            base: Duration::from_millis(base_ms),
            max: Duration::from_secs(60),
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` once exhausted.
    pub fn delay(&self, attempt: usize) -> Option<Duration> {
        if attempt >= self.retries {
            return None;
        }
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(3, 2000)
    }
}
