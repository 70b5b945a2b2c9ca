//! Time-grain window resolution
//!
//! Time-series grouping needs a bucket window before the index request can
//! be built: a start, an exclusive end, a gap of one grain unit, and the
//! display format for bucket keys. Explicit range-filter bounds override the
//! grain's rolling default per edge; start and end are resolved
//! independently, never as a linked pair.

use crate::filters::FieldFilter;
use crate::schema::{split_time_suffix, TimeVariant};
use chrono::{DateTime, Days, Months, Utc};
use std::collections::HashMap;

/// Calendar unit for time-bucketed grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeGrain {
    /// Calendar day
    Day,
    /// Calendar month
    Month,
    /// Calendar year
    Year,
}

impl TimeGrain {
    /// Map a virtual time column variant onto its grain
    pub fn from_variant(variant: TimeVariant) -> Option<Self> {
        match variant {
            TimeVariant::Day => Some(TimeGrain::Day),
            TimeVariant::Month => Some(TimeGrain::Month),
            TimeVariant::Year => Some(TimeGrain::Year),
            TimeVariant::None => None,
        }
    }

    /// Bucket width, one grain unit, in the index's range-gap syntax
    pub fn gap(self) -> &'static str {
        match self {
            TimeGrain::Day => "+1DAY",
            TimeGrain::Month => "+1MONTH",
            TimeGrain::Year => "+1YEAR",
        }
    }

    /// Display format for bucket keys
    pub fn format(self) -> &'static str {
        match self {
            TimeGrain::Day => "%Y-%m-%d",
            TimeGrain::Month => "%Y-%m",
            TimeGrain::Year => "%Y",
        }
    }
}

/// Resolved bucket window for one time-series aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    /// The grouping grain
    pub grain: TimeGrain,
    /// Window start (ISO-8601 instant, or an explicit bound verbatim)
    pub start: String,
    /// Window end, exclusive
    pub end: String,
    /// Bucket width
    pub gap: &'static str,
    /// Bucket key display format
    pub format: &'static str,
}

/// Resolve the bucket window for a grain and grouping field
///
/// `field_name` is the virtual grouping column (`created_day`); explicit
/// bounds are looked up under its de-suffixed base field. Each edge falls
/// back to the grain's rolling default around `now` when no explicit bound
/// exists; defaults are floored to midnight UTC so bucket boundaries stay
/// stable within a day.
pub fn resolve(
    grain: TimeGrain,
    field_name: &str,
    explicit_filters: &HashMap<String, FieldFilter>,
    now: DateTime<Utc>,
) -> TimeWindow {
    let base_field = split_time_suffix(field_name)
        .map(|(base, _)| base)
        .unwrap_or(field_name);
    let filter = explicit_filters.get(base_field);

    let start = filter
        .and_then(|f| f.start.literal())
        .map(strip_quotes)
        .unwrap_or_else(|| format_instant(default_start(grain, now)));
    let end = filter
        .and_then(|f| f.end.literal())
        .map(strip_quotes)
        .unwrap_or_else(|| format_instant(default_end(grain, now)));

    TimeWindow {
        grain,
        start,
        end,
        gap: grain.gap(),
        format: grain.format(),
    }
}

fn default_start(grain: TimeGrain, now: DateTime<Utc>) -> DateTime<Utc> {
    let shifted = match grain {
        TimeGrain::Day => now.checked_sub_months(Months::new(1)),
        TimeGrain::Month => now.checked_sub_months(Months::new(24)),
        TimeGrain::Year => now.checked_sub_months(Months::new(60)),
    };
    floor_to_midnight(shifted.unwrap_or(now))
}

fn default_end(grain: TimeGrain, now: DateTime<Utc>) -> DateTime<Utc> {
    let shifted = match grain {
        TimeGrain::Day => now.checked_add_days(Days::new(1)),
        TimeGrain::Month => now.checked_add_months(Months::new(1)),
        TimeGrain::Year => now.checked_add_months(Months::new(12)),
    };
    floor_to_midnight(shifted.unwrap_or(now))
}

fn floor_to_midnight(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(instant)
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn strip_quotes(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .to_string()
}
