//! Sliding-window aggregation of decoded telemetry records.
//!
//! The window owns the cumulative elapsed-time clock and a bounded,
//! time-ordered buffer of labeled data points. It holds no reference to the
//! session configuration: it is a pure time-series accumulator driven by
//! decoded records, mutated only through [`SlidingWindow::append`] and
//! [`SlidingWindow::reset`].

use std::collections::{BTreeMap, VecDeque};

use crate::wire::TelemetryRecord;

/// Trailing retention horizon in seconds of cumulative time.
pub const RETENTION_SECS: f64 = 15.0;

/// One plotted sample: a point on the cumulative clock with a rate per
/// group reported in that message.
///
/// A group absent from the record leaves no entry for this point; consumers
/// interpret absence as "no value at this time", never as zero. Points are
/// immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Cumulative session time in seconds.
    pub time_secs: f64,
    /// Group key to counts-per-second for groups present in this report.
    pub rates: BTreeMap<String, f64>,
}

/// Bounded, time-ordered buffer of [`DataPoint`]s.
#[derive(Debug, Default)]
pub struct SlidingWindow {
    clock_secs: f64,
    points: VecDeque<DataPoint>,
}

/// Round to two decimal places. Applied on every clock increment to keep
/// floating-point drift from accumulating across thousands of reports.
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the cumulative clock and empty the buffer.
    ///
    /// Called once at session start and once at session stop; idempotent
    /// when already empty.
    pub fn reset(&mut self) {
        self.clock_secs = 0.0;
        self.points.clear();
    }

    /// Advance the clock by the record's elapsed delta, append a point built
    /// from its keyed rates, and evict everything older than the retention
    /// horizon. Callers observe no intermediate state.
    ///
    /// The delta is accepted as given: a negative or zero value still
    /// advances (or rewinds) the clock after rounding. Deltas are assumed
    /// monotonically non-decreasing by the caller; arrivals are never
    /// reordered here.
    pub fn append(&mut self, record: &TelemetryRecord) -> &DataPoint {
        self.clock_secs = round2(self.clock_secs + record.elapsed_delta_secs);

        let rates: BTreeMap<String, f64> = record
            .group_keys
            .iter()
            .cloned()
            .zip(record.rates.iter().copied())
            .collect();
        self.points.push_back(DataPoint {
            time_secs: self.clock_secs,
            rates,
        });

        let horizon = self.clock_secs - RETENTION_SECS;
        while self.points.front().is_some_and(|p| p.time_secs <= horizon) {
            self.points.pop_front();
        }

        // The just-pushed point is always newer than the horizon.
        self.points.back().expect("buffer non-empty after append")
    }

    /// Current cumulative clock in seconds.
    pub fn clock_secs(&self) -> f64 {
        self.clock_secs
    }

    /// Retained points, oldest first.
    pub fn points(&self) -> impl Iterator<Item = &DataPoint> {
        self.points.iter()
    }

    /// Most recently appended point, if any.
    pub fn latest(&self) -> Option<&DataPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
