//! Fetch policy shared by all time-windowed providers.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel meaning "no limit" for lookback and fetch budgets
pub const UNBOUNDED: i64 = -1;

/// Largest accepted window, in days; use [`UNBOUNDED`] for more
pub const MAX_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid fetch policy: {0}")]
pub struct PolicyError(pub String);

/// How many papers to collect per query and how far back to look.
///
/// `max_lookback_days` and `max_fetch_items` accept [`UNBOUNDED`] (-1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPolicy {
    /// Number of new papers wanted per query
    #[serde(default = "default_max_results", alias = "target")]
    pub max_results: usize,

    /// Strict window size in days
    #[serde(default = "default_pull_every")]
    pub pull_every: i64,

    /// Whether to widen the window to `max_lookback_days` when the strict window is short
    #[serde(default)]
    pub fill_enabled: bool,

    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: i64,

    /// Upper bound on raw items fetched per query
    #[serde(default = "default_max_fetch_items")]
    pub max_fetch_items: i64,

    /// Page size
    #[serde(default = "default_fetch_batch_size", alias = "page_size")]
    pub fetch_batch_size: usize,
}

fn default_max_results() -> usize {
    20
}

fn default_pull_every() -> i64 {
    7
}

fn default_max_lookback_days() -> i64 {
    30
}

fn default_max_fetch_items() -> i64 {
    500
}

fn default_fetch_batch_size() -> usize {
    100
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            pull_every: default_pull_every(),
            fill_enabled: false,
            max_lookback_days: default_max_lookback_days(),
            max_fetch_items: default_max_fetch_items(),
            fetch_batch_size: default_fetch_batch_size(),
        }
    }
}

impl FetchPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_results == 0 {
            return Err(PolicyError("max_results must be > 0".to_string()));
        }
        if self.pull_every <= 0 {
            return Err(PolicyError("pull_every must be > 0".to_string()));
        }
        if self.pull_every > MAX_WINDOW_DAYS {
            return Err(PolicyError(format!(
                "pull_every must be <= {MAX_WINDOW_DAYS}"
            )));
        }
        if self.max_lookback_days != UNBOUNDED && self.max_lookback_days <= 0 {
            return Err(PolicyError(
                "max_lookback_days must be -1 or > 0".to_string(),
            ));
        }
        if self.max_lookback_days > MAX_WINDOW_DAYS {
            return Err(PolicyError(format!(
                "max_lookback_days must be -1 or <= {MAX_WINDOW_DAYS}"
            )));
        }
        if self.fill_enabled
            && self.max_lookback_days != UNBOUNDED
            && self.max_lookback_days < self.pull_every
        {
            return Err(PolicyError(format!(
                "max_lookback_days ({}) must be >= pull_every ({}) when fill is enabled",
                self.max_lookback_days, self.pull_every
            )));
        }
        if self.max_fetch_items != UNBOUNDED && self.max_fetch_items <= 0 {
            return Err(PolicyError("max_fetch_items must be -1 or > 0".to_string()));
        }
        if self.fetch_batch_size == 0 {
            return Err(PolicyError("fetch_batch_size must be > 0".to_string()));
        }
        Ok(())
    }

    /// Fetch budget, `None` when unbounded
    pub fn fetch_limit(&self) -> Option<usize> {
        usize::try_from(self.max_fetch_items).ok()
    }

    /// Oldest timestamp accepted by the strict window
    pub fn strict_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        days_before(now, self.pull_every)
    }

    /// Oldest timestamp accepted by the fill window.
    ///
    /// Outer `None` means fill is disabled, inner `None` means the window is unbounded.
    pub fn fill_cutoff(&self, now: DateTime<Utc>) -> Option<Option<DateTime<Utc>>> {
        if !self.fill_enabled {
            return None;
        }
        if self.max_lookback_days == UNBOUNDED {
            Some(None)
        } else {
            Some(Some(days_before(now, self.max_lookback_days)))
        }
    }

    /// Oldest timestamp any candidate may have, `None` when unbounded
    pub fn active_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.fill_cutoff(now) {
            Some(fill) => fill,
            None => Some(self.strict_cutoff(now)),
        }
    }

    /// Whether a timestamp falls in the strict window or, when enabled, the fill window
    pub fn accepts(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if timestamp >= self.strict_cutoff(now) {
            return true;
        }
        match self.fill_cutoff(now) {
            Some(None) => true,
            Some(Some(cutoff)) => timestamp >= cutoff,
            None => false,
        }
    }
}

/// `now` minus `days`, saturating at the earliest representable instant
fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    TimeDelta::try_days(days)
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
