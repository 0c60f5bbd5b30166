// =============================================================================
// CUSUM Breakpoint Detector — structural breaks in cumulative performance
// =============================================================================
//
// The cumulative sum of returns C_t is compared against its own rolling
// statistics:
//
//   z_t = (C_t - mean(C_{t-w+1..t})) / std(C_{t-w+1..t})
//
// Any index with |z_t| > threshold is a raw flag.  Raw flags are then
// collapsed into events: the first flag opens an event, and a later flag
// opens a new one only when it lies more than `min_gap` after the last
// *kept* event.  Flags inside the gap are dropped even when they are more
// extreme than the event that absorbed them; only cluster starts survive.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stats::rolling::{rolling_mean, rolling_std};
use crate::stats::moments::MIN_STD;
use crate::types::Series;

/// Default |z| above which an index is flagged.
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Default minimum spacing between kept events, in calendar days.
pub const DEFAULT_MIN_GAP_DAYS: i64 = 60;

// =============================================================================
// Types
// =============================================================================

/// Full output of one breakpoint scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakpointScan {
    /// CUSUM z-score per index; undefined during warm-up or zero variance.
    pub z_scores: Series,
    /// Every index whose |z| exceeded the threshold, chronological.
    pub raw_flags: Vec<DateTime<Utc>>,
    /// Clustered events (cluster starts), chronological.
    pub events: Vec<DateTime<Utc>>,
}

// =============================================================================
// BreakpointDetector
// =============================================================================

#[derive(Debug, Clone)]
pub struct BreakpointDetector {
    window: usize,
    threshold: f64,
    min_gap: Duration,
}

impl BreakpointDetector {
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            window,
            threshold,
            min_gap: Duration::days(DEFAULT_MIN_GAP_DAYS),
        }
    }

    pub fn with_min_gap(mut self, min_gap: Duration) -> Self {
        self.min_gap = min_gap;
        self
    }

    /// Run the CUSUM scan over a return series.
    pub fn scan(&self, returns: &Series) -> BreakpointScan {
        let cumulative = returns.cumulative_sum();
        let means = rolling_mean(&cumulative, self.window);
        let stds = rolling_std(&cumulative, self.window);

        let z: Vec<Option<f64>> = (0..cumulative.len())
            .map(|i| match (cumulative.get(i), means.get(i), stds.get(i)) {
                (Some(c), Some(m), Some(s)) if s >= MIN_STD => Some((c - m) / s),
                _ => None,
            })
            .collect();
        let z_scores = cumulative.with_values(z);

        let raw_flags: Vec<DateTime<Utc>> = z_scores
            .defined()
            .filter(|(_, z)| z.abs() > self.threshold)
            .map(|(ts, _)| ts)
            .collect();

        let events = cluster_breakpoints(&raw_flags, self.min_gap);

        debug!(
            window = self.window,
            threshold = format!("{:.2}", self.threshold),
            raw_flags = raw_flags.len(),
            events = events.len(),
            "CUSUM breakpoint scan complete"
        );

        BreakpointScan {
            z_scores,
            raw_flags,
            events,
        }
    }
}

/// Collapse chronological raw flags into cluster starts.
///
/// A flag is kept when it lies strictly more than `min_gap` (counted in whole
/// days) after the most recently kept flag.
pub fn cluster_breakpoints(flags: &[DateTime<Utc>], min_gap: Duration) -> Vec<DateTime<Utc>> {
    let gap_days = min_gap.num_days();
    let mut kept: Vec<DateTime<Utc>> = Vec::new();
    for &flag in flags {
        match kept.last() {
            Some(&last) if (flag - last).num_days() <= gap_days => {}
            _ => kept.push(flag),
        }
    }
    kept
}
