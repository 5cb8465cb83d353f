//! Progress computation and change-only reporting.
//!
//! Two modes, chosen by whether the total length is known:
//!
//! - **Known length**: `floor(100 * bytes / total)` clamped to `0..=100`,
//!   reported only when it strictly increases.
//! - **Unknown length**: an activity indicator periodic in the byte count,
//!   snapped to multiples of 25 and reported only when it changes. It says
//!   "bytes are flowing", nothing more, and must not be used for ETA.

use std::f64::consts::TAU;

/// Granularity of the unknown-length activity indicator.
pub const ACTIVITY_STEP: u8 = 25;

/// A progress value as published to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    /// True completion percentage.
    Percent(u8),
    /// Activity indicator for transfers of undisclosed length.
    Activity(u8),
}

impl ProgressSignal {
    /// The 0-100 value carried by either variant.
    pub fn value(&self) -> u8 {
        match self {
            Self::Percent(v) | Self::Activity(v) => *v,
        }
    }

    /// Whether this value reflects real completion.
    pub fn is_determinate(&self) -> bool {
        matches!(self, Self::Percent(_))
    }
}

/// A progress update for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub id: String,
    pub signal: ProgressSignal,
}

/// Completion percentage of `bytes` out of `total`, clamped to 100.
pub fn percent_of(bytes: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (bytes as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Activity bucket for a byte count when the total is unknown.
///
/// Follows `|sin(bytes mod 2π)|` and snaps toward zero to a multiple of
/// [`ACTIVITY_STEP`].
pub fn activity_level(bytes: u64) -> u8 {
    let phase = (bytes as f64) % TAU;
    let steps = (phase.sin() * 100.0 / ACTIVITY_STEP as f64).trunc().abs();
    (steps as u8).min(100 / ACTIVITY_STEP) * ACTIVITY_STEP
}

/// Tracks the last published value for one transfer and decides what to emit.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: Option<u64>,
    last: u8,
}

impl ProgressTracker {
    /// Create a tracker for a transfer whose total is `total` (offset-adjusted).
    pub fn new(total: Option<u64>) -> Self {
        Self { total, last: 0 }
    }

    /// The total this tracker reports against.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Folds in the cumulative byte count; returns a signal when one is due.
    pub fn update(&mut self, bytes_so_far: u64) -> Option<ProgressSignal> {
        match self.total {
            Some(total) => {
                let pct = percent_of(bytes_so_far, total);
                if pct > self.last {
                    self.last = pct;
                    Some(ProgressSignal::Percent(pct))
                } else {
                    None
                }
            }
            None => {
                let level = activity_level(bytes_so_far);
                if level != self.last {
                    self.last = level;
                    Some(ProgressSignal::Activity(level))
                } else {
                    None
                }
            }
        }
    }
}
