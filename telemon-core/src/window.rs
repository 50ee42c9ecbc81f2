//! Rolling Window Buffer: time-bounded series of recent readings.
//!
//! Eviction is by age, not by count, so the window always covers the same
//! duration whatever the sampling period.

use serde::Serialize;
use std::collections::VecDeque;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: OffsetDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Clone)]
pub struct RollingWindow {
    horizon: Duration,
    readings: VecDeque<Reading>,
}

impl RollingWindow {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            readings: VecDeque::new(),
        }
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Appends at the back. Readings arrive from one periodic driver, so
    /// insertion order is chronological.
    pub fn append(&mut self, reading: Reading) {
        self.readings.push_back(reading);
    }

    /// Drops from the front every reading with `now - timestamp > horizon`.
    /// Returns how many were dropped.
    pub fn evict_older_than(&mut self, horizon: Duration, now: OffsetDateTime) -> usize {
        let mut evicted = 0;
        while let Some(oldest) = self.readings.front() {
            if now - oldest.timestamp <= horizon {
                break;
            }
            self.readings.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Append then evict against the configured horizon.
    pub fn record(&mut self, value: f64, now: OffsetDateTime) {
        self.append(Reading::new(now, value));
        self.evict_older_than(self.horizon, now);
    }

    /// Pre-fills the window, e.g. from the tail of historical data.
    /// Readings must be in ascending time order.
    pub fn seed(&mut self, readings: impl IntoIterator<Item = Reading>) {
        self.readings.extend(readings);
    }

    /// Point-in-time copy, oldest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2021-03-01 08:00 UTC);

    fn at(minutes: i64) -> OffsetDateTime {
        T0 + Duration::minutes(minutes)
    }

    #[test]
    fn one_hour_scenario() {
        let mut window = RollingWindow::new(Duration::hours(1));
        for (minute, value) in [(0, 1.0), (30, 2.0), (61, 3.0), (90, 4.0)] {
            window.record(value, at(minute));
        }
        let values: Vec<f64> = window.snapshot().iter().map(|r| r.value).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn reading_exactly_at_horizon_is_kept() {
        let mut window = RollingWindow::new(Duration::hours(1));
        window.append(Reading::new(at(0), 1.0));
        assert_eq!(window.evict_older_than(Duration::hours(1), at(60)), 0);
        assert_eq!(window.evict_older_than(Duration::hours(1), at(60) + Duration::SECOND), 1);
        assert!(window.is_empty());
    }

    #[test]
    fn no_false_or_missed_eviction() {
        let horizon = Duration::minutes(20);
        let mut window = RollingWindow::new(horizon);
        let mut appended = Vec::new();
        // Irregular sampling over three hours.
        let mut minute = 0;
        for step in [1, 7, 3, 12, 5, 2, 9, 30, 1, 1, 4, 25, 6].iter().cycle().take(40) {
            minute += step;
            window.record(minute as f64, at(minute));
            appended.push(at(minute));

            let now = at(minute);
            let expected: Vec<OffsetDateTime> = appended
                .iter()
                .copied()
                .filter(|t| now - *t <= horizon)
                .collect();
            let kept: Vec<OffsetDateTime> = window.snapshot().iter().map(|r| r.timestamp).collect();
            assert_eq!(kept, expected, "at minute {minute}");
        }
    }

    #[test]
    fn snapshot_is_detached_copy() {
        let mut window = RollingWindow::new(Duration::hours(1));
        window.record(1.0, at(0));
        let before = window.snapshot();
        window.record(2.0, at(1));
        assert_eq!(before.len(), 1);
        assert_eq!(window.len(), 2);
        assert_eq!(window.snapshot()[1], Reading::new(at(1), 2.0));
    }

    #[test]
    fn seeded_history_is_evicted_by_first_live_sample() {
        let mut window = RollingWindow::new(Duration::hours(1));
        window.seed([Reading::new(at(0), 3.0), Reading::new(at(10), 2.0)]);
        assert_eq!(window.len(), 2);
        window.record(1.0, at(24 * 60));
        assert_eq!(window.snapshot(), vec![Reading::new(at(24 * 60), 1.0)]);
    }
}
