use chrono::{Datelike, Duration, NaiveDate, Weekday};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::models::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub fn policy(self) -> &'static dyn CalendarPolicy {
        match self {
            Granularity::Week => &IsoWeeks,
            Granularity::Month => &Months,
            Granularity::Quarter => &Quarters,
            Granularity::Year => &Years,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }
}

/// One calendar policy per granularity. Bucket engine and period resolver
/// both go through these so they agree on every boundary.
pub trait CalendarPolicy: Sync {
    fn align_to_start(&self, date: NaiveDate) -> NaiveDate;

    /// Last day of the bucket starting at `start`; `start` must be aligned.
    fn bucket_end(&self, start: NaiveDate) -> NaiveDate;

    /// Moves an aligned bucket start by `steps` buckets (negative goes back).
    fn advance(&self, start: NaiveDate, steps: i32) -> NaiveDate;

    fn key(&self, date: NaiveDate) -> String;

    fn label(&self, date: NaiveDate) -> String;

    fn bounds(&self, date: NaiveDate) -> DateRange {
        let start = self.align_to_start(date);
        DateRange::new(start, self.bucket_end(start))
    }
}

struct IsoWeeks;
struct Months;
struct Quarters;
struct Years;

impl CalendarPolicy for IsoWeeks {
    fn align_to_start(&self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(date.weekday().num_days_from_monday() as i64)
    }

    fn bucket_end(&self, start: NaiveDate) -> NaiveDate {
        start + Duration::days(6)
    }

    fn advance(&self, start: NaiveDate, steps: i32) -> NaiveDate {
        start + Duration::weeks(steps as i64)
    }

    fn key(&self, date: NaiveDate) -> String {
        let week = date.iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    }

    fn label(&self, date: NaiveDate) -> String {
        format!("W{:02}", date.iso_week().week())
    }
}

impl CalendarPolicy for Months {
    fn align_to_start(&self, date: NaiveDate) -> NaiveDate {
        first_of_month(date.year(), date.month())
    }

    fn bucket_end(&self, start: NaiveDate) -> NaiveDate {
        shift_months(start, 1) - Duration::days(1)
    }

    fn advance(&self, start: NaiveDate, steps: i32) -> NaiveDate {
        shift_months(start, steps)
    }

    fn key(&self, date: NaiveDate) -> String {
        format!("{}-{:02}", date.year(), date.month())
    }

    fn label(&self, date: NaiveDate) -> String {
        format!("T{}", date.month())
    }
}

impl CalendarPolicy for Quarters {
    fn align_to_start(&self, date: NaiveDate) -> NaiveDate {
        first_of_month(date.year(), date.month0() / 3 * 3 + 1)
    }

    fn bucket_end(&self, start: NaiveDate) -> NaiveDate {
        shift_months(start, 3) - Duration::days(1)
    }

    fn advance(&self, start: NaiveDate, steps: i32) -> NaiveDate {
        shift_months(start, steps * 3)
    }

    fn key(&self, date: NaiveDate) -> String {
        format!("{}-Q{}", date.year(), quarter_of(date))
    }

    fn label(&self, date: NaiveDate) -> String {
        format!("Q{}", quarter_of(date))
    }
}

impl CalendarPolicy for Years {
    fn align_to_start(&self, date: NaiveDate) -> NaiveDate {
        first_of_month(date.year(), 1)
    }

    fn bucket_end(&self, start: NaiveDate) -> NaiveDate {
        last_of_month(start.year(), 12)
    }

    fn advance(&self, start: NaiveDate, steps: i32) -> NaiveDate {
        first_of_month(start.year() + steps, 1)
    }

    fn key(&self, date: NaiveDate) -> String {
        date.year().to_string()
    }

    fn label(&self, date: NaiveDate) -> String {
        date.year().to_string()
    }
}

pub(crate) fn first_of_month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).expect("first day of a calendar month")
}

pub(crate) fn last_of_month(year: i32, month: u32) -> NaiveDate {
    shift_months(first_of_month(year, month), 1) - Duration::days(1)
}

fn shift_months(first: NaiveDate, months: i32) -> NaiveDate {
    let index = first.year() * 12 + first.month0() as i32 + months;
    first_of_month(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

fn quarter_of(date: NaiveDate) -> u32 {
    date.month0() / 3 + 1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Bucket {
    fn at(policy: &dyn CalendarPolicy, date: NaiveDate) -> Self {
        let bounds = policy.bounds(date);
        Bucket {
            key: policy.key(bounds.start),
            label: policy.label(bounds.start),
            start: bounds.start,
            end: bounds.end,
        }
    }
}

pub fn bucket_bounds(date: NaiveDate, granularity: Granularity) -> DateRange {
    granularity.policy().bounds(date)
}

pub fn bucket_key(date: NaiveDate, granularity: Granularity) -> String {
    let policy = granularity.policy();
    policy.key(policy.align_to_start(date))
}

pub fn bucket_label(date: NaiveDate, granularity: Granularity) -> String {
    let policy = granularity.policy();
    policy.label(policy.align_to_start(date))
}

/// Buckets covering `range`, including partial buckets at either edge.
pub fn enumerate_buckets(granularity: Granularity, range: DateRange) -> Vec<Bucket> {
    let policy = granularity.policy();
    let mut buckets = Vec::new();
    let mut cursor = policy.align_to_start(range.start);

    while cursor <= range.end {
        buckets.push(Bucket::at(policy, cursor));
        cursor = policy.advance(cursor, 1);
    }

    buckets
}

/// The `count` buckets ending with the one that contains `anchor`.
pub fn trailing_buckets(granularity: Granularity, anchor: NaiveDate, count: usize) -> Vec<Bucket> {
    if count == 0 {
        return Vec::new();
    }

    let policy = granularity.policy();
    let last = policy.align_to_start(anchor);
    let mut cursor = policy.advance(last, -(count as i32 - 1));
    let mut buckets = Vec::with_capacity(count);

    for _ in 0..count {
        buckets.push(Bucket::at(policy, cursor));
        cursor = policy.advance(cursor, 1);
    }

    buckets
}

pub fn iso_weeks_in_year(year: i32) -> u32 {
    // Dec 28 always falls in the last ISO week of its year.
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|date| date.iso_week().week())
        .unwrap_or(52)
}

/// Monday through Sunday of ISO week `week` in ISO year `year`.
pub fn iso_week_bounds(year: i32, week: u32) -> Option<DateRange> {
    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)?;
    Some(DateRange::new(monday, monday + Duration::days(6)))
}
