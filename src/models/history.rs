//! Rolling price-history series with time-bucket coalescing.
//!
//! Poll cycles replace a record's series wholesale with a provider window;
//! live ticks are merged incrementally. A tick landing within the coalescing
//! window of the newest point overwrites that point instead of growing the
//! buffer, and the buffer is clamped to a fixed cap by evicting the oldest
//! points, so memory stays bounded no matter how long the stream runs.

use serde::{Deserialize, Serialize};

/// Maximum number of points kept in a rolling series.
pub const HISTORY_CAP: usize = 180;

/// Ticks closer than this to the newest buffered point collapse into it.
pub const COALESCE_WINDOW_MS: i64 = 60_000;

/// One point of a price history series.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Timestamp in Unix milliseconds
    pub t: i64,
    /// Price at that time
    pub p: f64,
}

/// Ordered price history, ascending by timestamp.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistorySeries {
    points: Vec<HistoryPoint>,
}

impl HistorySeries {
    /// Empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from provider points: drops non-finite prices and
    /// sorts ascending by timestamp.
    pub fn from_points(points: Vec<HistoryPoint>) -> Self {
        let mut points: Vec<HistoryPoint> = points
            .into_iter()
            .filter(|point| point.p.is_finite())
            .collect();
        points.sort_by_key(|point| point.t);
        Self { points }
    }

    /// Merge a live tick into the series.
    ///
    /// Within [`COALESCE_WINDOW_MS`] of the newest point the tick overwrites
    /// that point in place; the stored timestamp only ever moves forward, so
    /// an out-of-order tick updates the price but keeps the series
    /// non-decreasing in time. Outside the window the tick appends. The
    /// buffer is clamped to [`HISTORY_CAP`] afterwards in either case.
    /// Non-finite and negative prices are dropped.
    pub fn merge_tick(&mut self, t: i64, p: f64) {
        if !p.is_finite() || p < 0.0 {
            return;
        }

        match self.points.last_mut() {
            Some(last) if t - last.t <= COALESCE_WINDOW_MS => {
                last.p = p;
                last.t = last.t.max(t);
            }
            _ => self.points.push(HistoryPoint { t, p }),
        }

        if self.points.len() > HISTORY_CAP {
            let excess = self.points.len() - HISTORY_CAP;
            self.points.drain(..excess);
        }
    }

    /// All points, ascending by timestamp.
    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    /// Newest point, if any.
    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<HistoryPoint> for HistorySeries {
    fn from_iter<I: IntoIterator<Item = HistoryPoint>>(iter: I) -> Self {
        Self::from_points(iter.into_iter().collect())
    }
}
