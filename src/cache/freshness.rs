// src/cache/freshness.rs

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::CachePolicy;

/// How old an artifact is relative to its TTL. Derived on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FreshnessLevel {
    Fresh,
    Stale,
    VeryStale,
    Expired,
}

impl FreshnessLevel {
    pub fn needs_refresh(self) -> bool {
        self != FreshnessLevel::Fresh
    }

    /// Whether an artifact at this level may be reused under `policy`.
    pub fn is_reusable(self, policy: CachePolicy) -> bool {
        match policy {
            CachePolicy::Default => self == FreshnessLevel::Fresh,
            CachePolicy::BestEffort => {
                matches!(self, FreshnessLevel::Fresh | FreshnessLevel::Stale)
            }
            CachePolicy::Force => false,
        }
    }
}

impl fmt::Display for FreshnessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FreshnessLevel::Fresh => "fresh",
            FreshnessLevel::Stale => "stale",
            FreshnessLevel::VeryStale => "very-stale",
            FreshnessLevel::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Multipliers of the TTL that separate the freshness levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessThresholds {
    pub stale_multiplier: u32,
    pub very_stale_multiplier: u32,
}

impl Default for FreshnessThresholds {
    fn default() -> Self {
        Self {
            stale_multiplier: 7,
            very_stale_multiplier: 30,
        }
    }
}

impl FreshnessThresholds {
    /// - `Fresh`: age <= ttl
    /// - `Stale`: age <= stale_multiplier * ttl
    /// - `VeryStale`: age <= very_stale_multiplier * ttl
    /// - `Expired`: anything older
    pub fn classify(&self, age: Duration, ttl: Duration) -> FreshnessLevel {
        if age <= ttl {
            FreshnessLevel::Fresh
        } else if age <= ttl.saturating_mul(self.stale_multiplier) {
            FreshnessLevel::Stale
        } else if age <= ttl.saturating_mul(self.very_stale_multiplier) {
            FreshnessLevel::VeryStale
        } else {
            FreshnessLevel::Expired
        }
    }
}

/// Human-readable age, e.g. "3 hours ago".
pub fn age_string(age: Duration) -> String {
    const HOUR: u64 = 60 * 60;
    const DAY: u64 = 24 * HOUR;
    const WEEK: u64 = 7 * DAY;
    const MONTH: u64 = 30 * DAY;

    let secs = age.as_secs();
    let (n, unit) = if secs < HOUR {
        return "less than an hour ago".to_string();
    } else if secs < DAY {
        (secs / HOUR, "hour")
    } else if secs < WEEK {
        (secs / DAY, "day")
    } else if secs < MONTH {
        (secs / WEEK, "week")
    } else {
        (secs / MONTH, "month")
    };

    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
