//! Usage Aggregator over the immutable historical dataset.
//!
//! Ranges are closed: a record whose time equals `start` or `end` is
//! included. A record sitting exactly on the split point of two adjacent
//! ranges is therefore counted in both.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

use crate::error::UsageError;
use crate::window::Reading;

const SECONDS_PER_DAY: i64 = 86_400;

/// Discrete position label of the tracked actuator (0 = idle).
pub type Category = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoricalRecord {
    pub time: OffsetDateTime,
    pub category: Category,
    pub duration_hr: f64,
    pub consumption_mj: f64,
}

/// History loaded once at startup. Cheap to clone, never mutated.
#[derive(Debug, Clone)]
pub struct HistoricalDataset {
    records: Arc<[HistoricalRecord]>,
}

impl Default for HistoricalDataset {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl HistoricalDataset {
    /// Sorts by time (stable) so later range queries can rely on order.
    pub fn new(mut records: Vec<HistoricalRecord>) -> Self {
        records.sort_by_key(|r| r.time);
        Self {
            records: records.into(),
        }
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First and last record times.
    pub fn span(&self) -> Option<UsageRange> {
        let first = self.records.first()?.time;
        let last = self.records.last()?.time;
        Some(UsageRange { start: first, end: last })
    }

    pub fn span_days(&self) -> i64 {
        self.span().map(|s| (s.end - s.start).whole_days()).unwrap_or(0)
    }

    /// Range expressed in whole days from the first record, as picked on a
    /// day slider: `[first + from_day days, first + to_day days]`. The end
    /// is not stretched to the last record, so a span that is not a whole
    /// number of days leaves its tail outside the last slider position.
    pub fn range_for_days(&self, from_day: i64, to_day: i64) -> Result<UsageRange, UsageError> {
        let span = self.span().ok_or(UsageError::EmptyHistory)?;
        let at = |day: i64| {
            day.checked_mul(SECONDS_PER_DAY)
                .map(Duration::seconds)
                .and_then(|offset| span.start.checked_add(offset))
                .ok_or(UsageError::DayOutOfRange(day))
        };
        UsageRange::new(at(from_day)?, at(to_day)?)
    }

    /// `parts` evenly spaced marks across the span, plus one for its end.
    pub fn day_marks(&self, parts: u32) -> Vec<DayMark> {
        let Some(span) = self.span() else {
            return Vec::new();
        };
        let total = span.end - span.start;
        let mut marks: Vec<DayMark> = (0..parts.max(1))
            .map(|n| {
                let at = span.start + total * n / parts.max(1);
                DayMark::new((at - span.start).whole_days(), at)
            })
            .collect();
        marks.push(DayMark::new(total.whole_days(), span.end));
        marks.dedup_by_key(|m| m.day);
        marks
    }

    /// Records newer than `latest - horizon`, as window readings whose
    /// value is the category.
    pub fn tail_readings(&self, horizon: Duration) -> Vec<Reading> {
        let Some(span) = self.span() else {
            return Vec::new();
        };
        let cutoff = span.end - horizon;
        self.records
            .iter()
            .filter(|r| r.time > cutoff)
            .map(|r| Reading::new(r.time, r.category as f64))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayMark {
    pub day: i64,
    pub label: String,
}

impl DayMark {
    fn new(day: i64, at: OffsetDateTime) -> Self {
        let label = at
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_default();
        Self { day, label }
    }
}

/// Closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageRange {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl UsageRange {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, UsageError> {
        if start > end {
            return Err(UsageError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: OffsetDateTime) -> bool {
        self.start <= time && time <= self.end
    }
}

/// Which categories count towards totals. The idle position is excluded
/// by default.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFilter {
    excluded: BTreeSet<Category>,
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::excluding([0])
    }
}

impl CategoryFilter {
    pub fn excluding(categories: impl IntoIterator<Item = Category>) -> Self {
        Self {
            excluded: categories.into_iter().collect(),
        }
    }

    pub fn all() -> Self {
        Self::excluding([])
    }

    pub fn is_active(&self, category: Category) -> bool {
        !self.excluded.contains(&category)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    pub duration_hr: f64,
    pub consumption_mj: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub range: UsageRange,
    pub categories: BTreeMap<Category, UsageTotals>,
    pub total: UsageTotals,
    pub records: usize,
}

/// Per-category duration/consumption sums for records inside `range`.
///
/// Addends are sorted before summing, so the result depends only on the
/// multiset of records, not on their order.
pub fn aggregate(
    records: &[HistoricalRecord],
    range: UsageRange,
    filter: &CategoryFilter,
) -> UsageSummary {
    let mut grouped: BTreeMap<Category, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    let mut count = 0;
    for record in records
        .iter()
        .filter(|r| range.contains(r.time) && filter.is_active(r.category))
    {
        let (durations, consumptions) = grouped.entry(record.category).or_default();
        durations.push(record.duration_hr);
        consumptions.push(record.consumption_mj);
        count += 1;
    }

    let categories: BTreeMap<Category, UsageTotals> = grouped
        .into_iter()
        .map(|(category, (durations, consumptions))| {
            let totals = UsageTotals {
                duration_hr: ordered_sum(durations),
                consumption_mj: ordered_sum(consumptions),
            };
            (category, totals)
        })
        .collect();

    let total = UsageTotals {
        duration_hr: categories.values().map(|t| t.duration_hr).sum(),
        consumption_mj: categories.values().map(|t| t.consumption_mj).sum(),
    };

    UsageSummary {
        range,
        categories,
        total,
        records: count,
    }
}

/// Checked variant for raw bounds.
pub fn aggregate_between(
    records: &[HistoricalRecord],
    start: OffsetDateTime,
    end: OffsetDateTime,
    filter: &CategoryFilter,
) -> Result<UsageSummary, UsageError> {
    Ok(aggregate(records, UsageRange::new(start, end)?, filter))
}

fn ordered_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}
