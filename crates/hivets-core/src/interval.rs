//! Time bounds and the interval overlap test used for pruning.
//!
//! All instants are nanoseconds since the Unix epoch. Both the query bounds
//! and the intervals declared by manifests are closed: `[start, end]` and
//! `[min_time, max_time]`.

use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// Closed query interval `[start, end]` in epoch nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBounds {
    /// Inclusive lower bound.
    pub start: i64,
    /// Inclusive upper bound.
    pub end: i64,
}

/// Result of evaluating query bounds against a declared interval
/// `[min_time, max_time]`.
///
/// - `AlwaysFalse`: no instant of the interval lies within the bounds.
///   The partition or file is safe to PRUNE.
/// - `MaybeTrue`: the interval straddles a bound. Must KEEP.
/// - `AlwaysTrue`: every instant of the interval lies within the bounds.
///   KEEP; the engine still applies the exact predicate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntervalTruth {
    /// Interval fully inside the bounds.
    AlwaysTrue,
    /// Interval disjoint from the bounds.
    AlwaysFalse,
    /// Interval partially inside the bounds.
    MaybeTrue,
}

impl IntervalTruth {
    /// True unless the interval was proven disjoint.
    pub fn keep(self) -> bool {
        !matches!(self, IntervalTruth::AlwaysFalse)
    }
}

impl TimeBounds {
    /// Creates bounds from two epoch-nanosecond instants.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Evaluate these bounds against a declared interval.
    pub fn eval_interval(&self, min_time: i64, max_time: i64) -> IntervalTruth {
        if max_time < self.start || min_time > self.end {
            IntervalTruth::AlwaysFalse
        } else if min_time >= self.start && max_time <= self.end {
            IntervalTruth::AlwaysTrue
        } else {
            IntervalTruth::MaybeTrue
        }
    }

    /// Overlap test: `max_time >= start AND min_time <= end`.
    pub fn overlaps(&self, min_time: i64, max_time: i64) -> bool {
        self.eval_interval(min_time, max_time).keep()
    }

    /// Lower bound as a UTC timestamp.
    pub fn start_utc(&self) -> DateTime<Utc> {
        nanos_to_utc(self.start)
    }

    /// Upper bound as a UTC timestamp.
    pub fn end_utc(&self) -> DateTime<Utc> {
        nanos_to_utc(self.end)
    }
}

/// Overlap test with "no bounds" meaning "keep everything".
pub fn overlaps(bounds: Option<&TimeBounds>, min_time: i64, max_time: i64) -> bool {
    bounds.is_none_or(|b| b.overlaps(min_time, max_time))
}

/// Convert epoch nanoseconds to a UTC timestamp. Every `i64` is representable.
pub fn nanos_to_utc(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}

/// Calendar date and hour of day (UTC) of an epoch-nanosecond instant.
pub fn date_and_hour(nanos: i64) -> (NaiveDate, u32) {
    let dt = nanos_to_utc(nanos);
    (dt.date_naive(), dt.hour())
}

/// Current wall-clock time in epoch nanoseconds.
pub fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
