use std::time::Duration;

/// Lowest full-refresh period the host will schedule.
pub const MIN_REFRESH_PERIOD_MS: u64 = 5_000;

/// Lowest fast-refresh window the host will schedule.
pub const MIN_FAST_REFRESH_PERIOD_MS: u64 = 500;

pub const DEFAULT_REFRESH_PERIOD_MS: u64 = 10_000;

pub const DEFAULT_FAST_REFRESH_PERIOD_MS: u64 = 1_000;

/// The two refresh cadences of every active card.
///
/// Construction clamps both periods to their minimums so a misconfigured host
/// cannot hammer providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPeriods {
    full: Duration,
    fast: Duration,
}

impl RefreshPeriods {
    #[must_use]
    pub fn from_millis(full_ms: u64, fast_ms: u64) -> Self {
        Self {
            full: Duration::from_millis(full_ms.max(MIN_REFRESH_PERIOD_MS)),
            fast: Duration::from_millis(fast_ms.max(MIN_FAST_REFRESH_PERIOD_MS)),
        }
    }

    /// Whole-card refresh period.
    #[must_use]
    pub fn full(&self) -> Duration {
        self.full
    }

    /// Readiness window for fast-updating components.
    #[must_use]
    pub fn fast(&self) -> Duration {
        self.fast
    }
}

impl Default for RefreshPeriods {
    fn default() -> Self {
        Self::from_millis(DEFAULT_REFRESH_PERIOD_MS, DEFAULT_FAST_REFRESH_PERIOD_MS)
    }
}
