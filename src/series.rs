//! Synthetic time-series generation.
//!
//! Produces a deterministic-cadence sequence of historical points working
//! backward from a reference instant: timestamps start at `now - lookback`
//! and step forward until `now` (exclusive), while a running value drifts by
//! a freshly drawn delta at every step. The drift is applied before the point
//! is emitted, and it accumulates — each point's value depends on all earlier
//! draws, not on its own draw alone.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::domain::SeriesPoint;

/// Lazy, finite iterator over a drifting backfill series.
///
/// Restartable in the sense that [`backfill_series`] builds a fresh iterator
/// on every call; a given iterator is consumed once.
pub struct BackfillSeries<D> {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    step: chrono::Duration,
    value: f64,
    delta: D,
}

impl<D: FnMut() -> f64> Iterator for BackfillSeries<D> {
    type Item = SeriesPoint;

    fn next(&mut self) -> Option<SeriesPoint> {
        if self.cursor >= self.end {
            return None;
        }
        self.value -= (self.delta)();
        let point = SeriesPoint {
            timestamp: self.cursor,
            value: self.value,
        };
        self.cursor += self.step;
        Some(point)
    }
}

/// Build a backfill series ending just before `now`.
///
/// `delta` is drawn once per step and subtracted from the running value
/// before that step's point is emitted. A zero or negative-length window
/// yields an empty series. A zero `step` would never terminate, so it is
/// rejected.
///
/// # Panics
///
/// Panics if `step` is zero.
pub fn backfill_series<D>(
    now: DateTime<Utc>,
    lookback: Duration,
    step: Duration,
    start_value: f64,
    delta: D,
) -> BackfillSeries<D>
where
    D: FnMut() -> f64,
{
    assert!(!step.is_zero(), "backfill step must be non-zero");
    let lookback = chrono::Duration::from_std(lookback).expect("backfill lookback out of range");
    let step = chrono::Duration::from_std(step).expect("backfill step out of range");
    BackfillSeries {
        cursor: now - lookback,
        end: now,
        step,
        value: start_value,
        delta,
    }
}

/// Default drift: a uniform draw in `[0, max)`, subtracted per step.
pub fn uniform_delta(max: f64) -> impl FnMut() -> f64 {
    let mut rng = rand::thread_rng();
    move || rng.r#gen::<f64>() * max
}
