//! Debounced portfolio value history.
//!
//! A burst of mutations produces at most one history point: each mutation
//! restarts the quiet window, and the point is written once the window
//! elapses without another mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{HistoryPoint, PortfolioTotals};

/// History tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Quiet period after the last mutation before a point is written.
    pub debounce_ms: u64,
    /// Minimum change in total value worth recording.
    pub epsilon: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            epsilon: 0.005,
        }
    }
}

impl HistoryConfig {
    fn debounce(&self) -> Duration {
        Duration::milliseconds(self.debounce_ms.min(i64::MAX as u64) as i64)
    }
}

/// Append-only value series plus the pending-write timer.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    points: Vec<HistoryPoint>,
    /// Time of the most recent unflushed mutation.
    pending_since: Option<DateTime<Utc>>,
    config: HistoryConfig,
}

impl HistoryRecorder {
    pub fn new(config: HistoryConfig) -> Self {
        Self::with_points(Vec::new(), config)
    }

    /// Resume from a restored series (sorted by timestamp).
    pub fn with_points(mut points: Vec<HistoryPoint>, config: HistoryConfig) -> Self {
        points.sort_by_key(|p| p.timestamp);
        Self {
            points,
            pending_since: None,
            config,
        }
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.last()
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn config(&self) -> HistoryConfig {
        self.config
    }

    /// Note a holdings mutation at `now`, restarting the quiet window.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.pending_since = Some(now);
    }

    /// Write the pending point if the quiet window has elapsed.
    pub fn poll(&mut self, now: DateTime<Utc>, totals: &PortfolioTotals) -> Option<HistoryPoint> {
        match self.pending_since {
            Some(since) if now - since >= self.config.debounce() => self.flush(now, totals),
            _ => None,
        }
    }

    /// Write the pending point now, regardless of the window.
    ///
    /// The point is stamped when the quiet window expired, or `now` if it
    /// has not expired yet.
    pub fn flush(&mut self, now: DateTime<Utc>, totals: &PortfolioTotals) -> Option<HistoryPoint> {
        let since = self.pending_since.take()?;
        let stamp = now.min(since + self.config.debounce());
        self.record(stamp, totals)
    }

    /// Apply the append rules to the current totals.
    fn record(&mut self, now: DateTime<Utc>, totals: &PortfolioTotals) -> Option<HistoryPoint> {
        let last = self.points.last().copied();

        let value = if totals.is_empty() {
            // A single zero marks the portfolio emptying out.
            match last {
                Some(p) if p.value != 0.0 => 0.0,
                _ => return None,
            }
        } else {
            let value = totals.total_value;
            if value <= 0.0 {
                return None;
            }
            if let Some(p) = last {
                let moved = (value - p.value).abs() > self.config.epsilon;
                let new_day = p.timestamp.date_naive() != now.date_naive();
                if !moved && !new_day {
                    return None;
                }
            }
            value
        };

        let point = HistoryPoint {
            timestamp: now,
            value,
        };
        self.points.push(point);
        debug!(
            value = format!("${:.2}", value),
            points = self.points.len(),
            "History point recorded"
        );
        Some(point)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
