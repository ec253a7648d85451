use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::calendar::{
    first_of_month, iso_week_bounds, iso_weeks_in_year, last_of_month, Granularity,
};
use crate::error::{EngineError, EngineResult};
use crate::models::{DateRange, WeekReference};

const SUPPORTED_YEARS: RangeInclusive<i32> = 1000..=9999;

pub trait WeekReferenceLookup {
    fn find_week_reference(&self, year: i32, week_code: &str) -> Option<WeekReference>;
}

/// In-memory week reference rows keyed by (year, week number).
#[derive(Debug, Clone, Default)]
pub struct WeekTable {
    rows: BTreeMap<(i32, u32), WeekReference>,
}

impl WeekTable {
    /// Builds a table from stored rows. A row whose week code or dates are
    /// malformed is a broken reference table, not a bad caller period.
    pub fn from_rows(rows: impl IntoIterator<Item = WeekReference>) -> EngineResult<Self> {
        let mut table = WeekTable::default();
        for row in rows {
            let week = parse_week_code(&row.week_code).map_err(|_| {
                EngineError::upstream(
                    "week_references",
                    format!("malformed week code {:?} for {}", row.week_code, row.year),
                )
            })?;
            if row.start_date > row.end_date {
                return Err(EngineError::upstream(
                    "week_references",
                    format!("{} {} ends before it starts", row.year, row.week_code),
                ));
            }
            table.rows.insert((row.year, week), row);
        }
        Ok(table)
    }

    /// Reference rows derived from the ISO-8601 calendar.
    pub fn iso(years: RangeInclusive<i32>) -> Self {
        let mut table = WeekTable::default();
        for year in years {
            for week in 1..=iso_weeks_in_year(year) {
                if let Some(bounds) = iso_week_bounds(year, week) {
                    let row = WeekReference {
                        year,
                        week_code: week_code(week),
                        start_date: bounds.start,
                        end_date: bounds.end,
                    };
                    table.rows.insert((year, week), row);
                }
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &WeekReference> {
        self.rows.values()
    }

    pub fn for_year(&self, year: i32) -> WeekTable {
        WeekTable {
            rows: self
                .rows
                .range((year, 0)..=(year, u32::MAX))
                .map(|(key, row)| (*key, row.clone()))
                .collect(),
        }
    }
}

impl WeekReferenceLookup for WeekTable {
    fn find_week_reference(&self, year: i32, week_code: &str) -> Option<WeekReference> {
        let week = parse_week_code(week_code).ok()?;
        self.rows.get(&(year, week)).cloned()
    }
}

pub fn week_code(week: u32) -> String {
    format!("W{week:02}")
}

/// Resolves a period selection into absolute inclusive date bounds.
pub fn resolve(
    granularity: Granularity,
    year: i32,
    period_start: &str,
    period_end: &str,
    weeks: &impl WeekReferenceLookup,
) -> EngineResult<DateRange> {
    ensure_year(year)?;
    match granularity {
        Granularity::Week => {
            let start_week = parse_week_code(period_start)?;
            let end_week = parse_week_code(period_end)?;
            ensure_ordered(start_week, end_week, period_start)?;

            let first = lookup_week(weeks, year, start_week, period_start)?;
            let last = lookup_week(weeks, year, end_week, period_end)?;
            Ok(DateRange::new(first.start_date, last.end_date))
        }
        Granularity::Month => {
            let start_month = parse_month(period_start)?;
            let end_month = parse_month(period_end)?;
            ensure_ordered(start_month, end_month, period_start)?;
            Ok(DateRange::new(
                first_of_month(year, start_month),
                last_of_month(year, end_month),
            ))
        }
        Granularity::Quarter => {
            let start_quarter = parse_quarter(period_start)?;
            let end_quarter = parse_quarter(period_end)?;
            ensure_ordered(start_quarter, end_quarter, period_start)?;
            Ok(DateRange::new(
                first_of_month(year, (start_quarter - 1) * 3 + 1),
                last_of_month(year, end_quarter * 3),
            ))
        }
        Granularity::Year => {
            let start_year = parse_year(period_start)?;
            let end_year = parse_year(period_end)?;
            ensure_ordered(start_year, end_year, period_start)?;
            Ok(DateRange::new(
                first_of_month(start_year, 1),
                last_of_month(end_year, 12),
            ))
        }
    }
}

/// Jan 1 through Dec 31 of `year`.
pub fn whole_year(year: i32) -> EngineResult<DateRange> {
    ensure_year(year)?;
    Ok(DateRange::new(first_of_month(year, 1), last_of_month(year, 12)))
}

/// Monday of W01 through Sunday of the last ISO week of week-year `year`.
pub fn iso_week_year(year: i32) -> EngineResult<DateRange> {
    ensure_year(year)?;
    let first = iso_week_bounds(year, 1);
    let last = iso_week_bounds(year, iso_weeks_in_year(year));
    match (first, last) {
        (Some(first), Some(last)) => Ok(DateRange::new(first.start, last.end)),
        _ => Err(EngineError::invalid_period(year.to_string(), "year has no ISO weeks")),
    }
}

fn ensure_year(year: i32) -> EngineResult<()> {
    if !SUPPORTED_YEARS.contains(&year) {
        return Err(EngineError::invalid_period(
            year.to_string(),
            "year must be a 4-digit number",
        ));
    }
    Ok(())
}

fn lookup_week(
    weeks: &impl WeekReferenceLookup,
    year: i32,
    week: u32,
    token: &str,
) -> EngineResult<WeekReference> {
    weeks
        .find_week_reference(year, &week_code(week))
        .ok_or_else(|| {
            EngineError::invalid_period(token, format!("no week reference for {year}"))
        })
}

fn ensure_ordered<T: PartialOrd>(start: T, end: T, token: &str) -> EngineResult<()> {
    if start > end {
        return Err(EngineError::invalid_period(
            token,
            "period start must not be after period end",
        ));
    }
    Ok(())
}

pub fn parse_week_code(token: &str) -> EngineResult<u32> {
    let trimmed = token.trim();
    let digits = trimmed
        .strip_prefix('W')
        .or_else(|| trimmed.strip_prefix('w'))
        .filter(|rest| rest.len() == 2 && rest.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| EngineError::invalid_period(token, "week must use format W01-W53"))?;

    let week: u32 = digits
        .parse()
        .map_err(|_| EngineError::invalid_period(token, "week must use format W01-W53"))?;
    if !(1..=53).contains(&week) {
        return Err(EngineError::invalid_period(token, "week must be within W01-W53"));
    }
    Ok(week)
}

fn parse_month(token: &str) -> EngineResult<u32> {
    let upper = token.trim().to_ascii_uppercase();
    let digits = upper
        .strip_prefix('T')
        .or_else(|| upper.strip_prefix('M'))
        .unwrap_or(&upper);
    match digits.parse::<u32>() {
        Ok(month) if (1..=12).contains(&month) => Ok(month),
        _ => Err(EngineError::invalid_period(token, "month must be 01-12")),
    }
}

fn parse_quarter(token: &str) -> EngineResult<u32> {
    let upper = token.trim().to_ascii_uppercase();
    let digit = upper.strip_prefix('Q').unwrap_or(&upper);
    match digit.parse::<u32>() {
        Ok(quarter) if digit.len() == 1 && (1..=4).contains(&quarter) => Ok(quarter),
        _ => Err(EngineError::invalid_period(token, "quarter must be Q1-Q4")),
    }
}

fn parse_year(token: &str) -> EngineResult<i32> {
    let trimmed = token.trim();
    match trimmed.parse::<i32>() {
        Ok(year) if trimmed.len() == 4 && SUPPORTED_YEARS.contains(&year) => Ok(year),
        _ => Err(EngineError::invalid_period(token, "year must be a 4-digit number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table() -> WeekTable {
        WeekTable::iso(2024..=2027)
    }

    fn assert_invalid(result: EngineResult<DateRange>, expected_token: &str) {
        match result {
            Err(EngineError::InvalidPeriod { token, .. }) => assert_eq!(token, expected_token),
            other => panic!("expected InvalidPeriod for {expected_token}, got {other:?}"),
        }
    }

    #[test]
    fn iso_table_covers_each_week_once() {
        let weeks = table();
        assert_eq!(weeks.len(), 52 + 52 + 53 + 52);
        assert_eq!(weeks.for_year(2026).len(), 53);
        let w01 = weeks.find_week_reference(2026, "W01").unwrap();
        assert_eq!(w01.start_date, date(2025, 12, 29));
        assert_eq!(w01.end_date, date(2026, 1, 4));
        assert!(weeks.find_week_reference(2025, "W53").is_none());
    }

    #[test]
    fn corrupt_reference_rows_are_store_failures() {
        let row = |code: &str, start: NaiveDate, end: NaiveDate| WeekReference {
            year: 2026,
            week_code: code.to_string(),
            start_date: start,
            end_date: end,
        };

        let table = WeekTable::from_rows(vec![row("W08", date(2026, 2, 16), date(2026, 2, 22))])
            .unwrap();
        assert_eq!(table.len(), 1);

        let bad_code =
            WeekTable::from_rows(vec![row("week 8", date(2026, 2, 16), date(2026, 2, 22))]);
        assert!(matches!(bad_code, Err(EngineError::UpstreamUnavailable { .. })));

        let reversed = WeekTable::from_rows(vec![row("W08", date(2026, 2, 22), date(2026, 2, 16))]);
        assert!(matches!(reversed, Err(EngineError::UpstreamUnavailable { .. })));
    }

    #[test]
    fn resolves_week_span_through_reference_rows() {
        let range = resolve(Granularity::Week, 2026, "W01", "W08", &table()).unwrap();
        assert_eq!(range, DateRange::new(date(2025, 12, 29), date(2026, 2, 22)));
    }

    #[test]
    fn week_resolution_failures() {
        let weeks = table();
        assert_invalid(resolve(Granularity::Week, 2026, "W8", "W09", &weeks), "W8");
        assert_invalid(resolve(Granularity::Week, 2026, "W00", "W09", &weeks), "W00");
        assert_invalid(resolve(Granularity::Week, 2026, "W01", "W54", &weeks), "W54");
        assert_invalid(resolve(Granularity::Week, 2026, "W10", "W09", &weeks), "W10");
        assert_invalid(resolve(Granularity::Week, 2025, "W50", "W53", &weeks), "W53");
        assert_invalid(resolve(Granularity::Week, 2030, "W01", "W02", &weeks), "W01");
    }

    #[test]
    fn resolves_months_and_quarters() {
        let weeks = WeekTable::default();
        let months = resolve(Granularity::Month, 2024, "02", "03", &weeks).unwrap();
        assert_eq!(months, DateRange::new(date(2024, 2, 1), date(2024, 3, 31)));

        let quarters = resolve(Granularity::Quarter, 2026, "Q2", "Q3", &weeks).unwrap();
        assert_eq!(quarters, DateRange::new(date(2026, 4, 1), date(2026, 9, 30)));

        assert_invalid(resolve(Granularity::Month, 2026, "13", "12", &weeks), "13");
        assert_invalid(resolve(Granularity::Month, 2026, "05", "04", &weeks), "05");
        assert_invalid(resolve(Granularity::Quarter, 2026, "Q5", "Q4", &weeks), "Q5");
        assert_invalid(resolve(Granularity::Quarter, 2026, "Q4", "Q1", &weeks), "Q4");
    }

    #[test]
    fn resolves_year_span() {
        let weeks = WeekTable::default();
        let years = resolve(Granularity::Year, 2026, "2025", "2026", &weeks).unwrap();
        assert_eq!(years, DateRange::new(date(2025, 1, 1), date(2026, 12, 31)));
        assert_invalid(resolve(Granularity::Year, 2026, "2027", "2026", &weeks), "2027");
        assert_invalid(resolve(Granularity::Year, 2026, "twenty", "2026", &weeks), "twenty");
    }

    #[test]
    fn out_of_range_years_are_rejected() {
        let weeks = WeekTable::default();
        assert_invalid(resolve(Granularity::Month, 300000, "01", "01", &weeks), "300000");
        assert_invalid(resolve(Granularity::Quarter, -5, "Q1", "Q1", &weeks), "-5");
        assert_invalid(resolve(Granularity::Week, 99, "W01", "W01", &table()), "99");
        assert_invalid(resolve(Granularity::Year, 2026, "0999", "2026", &weeks), "0999");
        assert_invalid(whole_year(i32::MAX), &i32::MAX.to_string());
        assert_invalid(iso_week_year(12345), "12345");
    }

    #[test]
    fn iso_week_year_spans_first_to_last_week() {
        assert_eq!(
            iso_week_year(2026).unwrap(),
            DateRange::new(date(2025, 12, 29), date(2027, 1, 3))
        );
        assert_eq!(
            iso_week_year(2025).unwrap(),
            DateRange::new(date(2024, 12, 30), date(2025, 12, 28))
        );
        assert_eq!(
            whole_year(2025).unwrap(),
            DateRange::new(date(2025, 1, 1), date(2025, 12, 31))
        );
    }

    #[test]
    fn accepts_display_prefixes_for_months() {
        let weeks = WeekTable::default();
        let range = resolve(Granularity::Month, 2026, "T1", "m2", &weeks).unwrap();
        assert_eq!(range, DateRange::new(date(2026, 1, 1), date(2026, 2, 28)));
    }
}
