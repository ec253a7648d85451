use std::collections::HashMap;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::{bucket_key, bucket_label, enumerate_buckets, trailing_buckets, Granularity};
use crate::models::{DateRange, EventRecord, Severity};

pub const SPARKLINE_BUCKETS: usize = 12;
pub const DETAIL_ROW_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    TotalEvents,
    DowntimeMinutes,
    ClosureRate,
    SevereIncidents,
    OpenInProgress,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::TotalEvents,
        Metric::DowntimeMinutes,
        Metric::ClosureRate,
        Metric::SevereIncidents,
        Metric::OpenInProgress,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::TotalEvents => "totalEvents",
            Metric::DowntimeMinutes => "downtimeMinutes",
            Metric::ClosureRate => "closureRate",
            Metric::SevereIncidents => "severeIncidents",
            Metric::OpenInProgress => "openInProgress",
        }
    }
}

/// Which records the summary detail table surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetricFilter {
    #[default]
    All,
    Open,
    Severe,
    Downtime,
    Closure,
}

impl MetricFilter {
    pub fn matches(self, record: &EventRecord) -> bool {
        match self {
            MetricFilter::All => true,
            MetricFilter::Open => record.status.is_open(),
            MetricFilter::Severe => record.severity == Severity::Critical,
            MetricFilter::Downtime => record.downtime() > 0,
            MetricFilter::Closure => record.status.is_closed(),
        }
    }
}

/// Running totals for one set of records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BucketMetrics {
    pub total_events: u64,
    pub downtime_minutes: i64,
    pub closed_count: u64,
    pub severe_count: u64,
    pub open_in_progress: u64,
}

impl BucketMetrics {
    pub fn push(&mut self, record: &EventRecord) {
        self.total_events += 1;
        self.downtime_minutes += record.downtime();
        if record.status.is_closed() {
            self.closed_count += 1;
        }
        if record.severity == Severity::Critical {
            self.severe_count += 1;
        }
        if record.status.is_open() {
            self.open_in_progress += 1;
        }
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut metrics = BucketMetrics::default();
        for record in records {
            metrics.push(record);
        }
        metrics
    }

    pub fn closure_rate(&self) -> f64 {
        to_percent(self.closed_count, self.total_events)
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::TotalEvents => self.total_events as f64,
            Metric::DowntimeMinutes => self.downtime_minutes as f64,
            Metric::ClosureRate => self.closure_rate(),
            Metric::SevereIncidents => self.severe_count as f64,
            Metric::OpenInProgress => self.open_in_progress as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiMetric {
    pub value: f64,
    pub delta_pct: f64,
    pub sparkline: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total_events: KpiMetric,
    pub downtime_minutes: KpiMetric,
    pub closure_rate: KpiMetric,
    pub severe_incidents: KpiMetric,
    pub open_in_progress: KpiMetric,
}

impl KpiSummary {
    pub fn get(&self, metric: Metric) -> &KpiMetric {
        match metric {
            Metric::TotalEvents => &self.total_events,
            Metric::DowntimeMinutes => &self.downtime_minutes,
            Metric::ClosureRate => &self.closure_rate,
            Metric::SevereIncidents => &self.severe_incidents,
            Metric::OpenInProgress => &self.open_in_progress,
        }
    }
}

/// Record sets feeding one KPI summary. Each slice is expected to be the
/// store's answer for the matching range; records outside it are ignored.
#[derive(Debug, Clone, Copy)]
pub struct KpiInputs<'a> {
    pub current: &'a [EventRecord],
    pub previous: &'a [EventRecord],
    /// Records covering the trailing sparkline window.
    pub window: &'a [EventRecord],
}

/// Date span the sparkline records must cover for a range ending at `range.end`.
pub fn sparkline_window(granularity: Granularity, range: DateRange) -> DateRange {
    let buckets = trailing_buckets(granularity, range.end, SPARKLINE_BUCKETS);
    let start = buckets.first().map_or(range.start, |bucket| bucket.start);
    DateRange::new(start, range.end)
}

pub fn summarize(
    inputs: KpiInputs<'_>,
    range: DateRange,
    prior_range: DateRange,
    granularity: Granularity,
) -> KpiSummary {
    let current =
        BucketMetrics::from_records(inputs.current.iter().filter(|r| range.contains(r.date)));
    let previous = BucketMetrics::from_records(
        inputs.previous.iter().filter(|r| prior_range.contains(r.date)),
    );

    let trailing = trailing_buckets(granularity, range.end, SPARKLINE_BUCKETS);
    let mut by_bucket: HashMap<String, BucketMetrics> = HashMap::new();
    for record in inputs.window.iter().filter(|r| r.date <= range.end) {
        by_bucket
            .entry(bucket_key(record.date, granularity))
            .or_default()
            .push(record);
    }

    let build = |metric: Metric| {
        let value = current.value(metric);
        KpiMetric {
            value,
            delta_pct: delta_pct(value, previous.value(metric)),
            sparkline: trailing
                .iter()
                .map(|bucket| {
                    by_bucket
                        .get(&bucket.key)
                        .copied()
                        .unwrap_or_default()
                        .value(metric)
                })
                .collect(),
        }
    };

    KpiSummary {
        total_events: build(Metric::TotalEvents),
        downtime_minutes: build(Metric::DowntimeMinutes),
        closure_rate: build(Metric::ClosureRate),
        severe_incidents: build(Metric::SevereIncidents),
        open_in_progress: build(Metric::OpenInProgress),
    }
}

/// Percent change vs. the previous value, one decimal. A zero baseline
/// reports 0 when nothing happened and 100 when something did.
pub fn delta_pct(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current == 0.0 { 0.0 } else { 100.0 };
    }
    round_one((current - previous) / previous.abs() * 100.0)
}

pub fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn to_percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_one(part as f64 / total as f64 * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeverityShare {
    pub count: u64,
    pub pct: f64,
    pub open: u64,
    pub closed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusDistribution {
    pub all: SeverityShare,
    pub low: SeverityShare,
    pub medium: SeverityShare,
    pub high: SeverityShare,
    pub critical: SeverityShare,
}

pub fn status_distribution(records: &[EventRecord]) -> StatusDistribution {
    let total = records.len() as u64;
    let share = |severity: Option<Severity>| {
        let mut share = SeverityShare {
            count: 0,
            pct: 0.0,
            open: 0,
            closed: 0,
        };
        for record in records
            .iter()
            .filter(|r| severity.map_or(true, |s| r.severity == s))
        {
            share.count += 1;
            if record.status.is_open() {
                share.open += 1;
            }
            if record.status.is_closed() {
                share.closed += 1;
            }
        }
        share.pct = to_percent(share.count, total);
        share
    };

    StatusDistribution {
        all: share(None),
        low: share(Some(Severity::Low)),
        medium: share(Some(Severity::Medium)),
        high: share(Some(Severity::High)),
        critical: share(Some(Severity::Critical)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRow {
    pub id: Uuid,
    pub date: NaiveDate,
    pub week_code: Option<String>,
    pub location_code: String,
    pub system_component: Option<String>,
    pub description: String,
    pub severity: Severity,
    pub status: crate::models::Status,
    pub days_open: i64,
}

/// Records matching `filter`, oldest first by age, capped at the detail limit.
pub fn detail_rows(
    records: &[EventRecord],
    filter: MetricFilter,
    as_of: NaiveDate,
) -> Vec<DetailRow> {
    let mut rows: Vec<DetailRow> = records
        .iter()
        .filter(|record| filter.matches(record))
        .map(|record| DetailRow {
            id: record.id,
            date: record.date,
            week_code: record.week_code.clone(),
            location_code: record.location_code.clone(),
            system_component: record.system_component.clone(),
            description: record.description.clone(),
            severity: record.severity,
            status: record.status,
            days_open: (as_of - record.date).num_days().max(0),
        })
        .collect();

    rows.sort_by(|a, b| b.days_open.cmp(&a.days_open).then(b.date.cmp(&a.date)));
    rows.truncate(DETAIL_ROW_LIMIT);
    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiTrendRow {
    pub period: String,
    pub total_events: u64,
    pub downtime_minutes: i64,
    pub closure_rate: f64,
    pub severe_incidents: u64,
    pub open_in_progress: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiTrend {
    pub granularity: Granularity,
    pub year: i32,
    pub current_period: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<KpiTrendRow>,
}

/// One row of bucket metrics per bucket of `year`.
pub fn kpi_trend(
    records: &[EventRecord],
    granularity: Granularity,
    year: i32,
    year_range: DateRange,
    as_of: NaiveDate,
) -> KpiTrend {
    let mut by_bucket: HashMap<String, BucketMetrics> = HashMap::new();
    for record in records.iter().filter(|r| year_range.contains(r.date)) {
        by_bucket
            .entry(bucket_key(record.date, granularity))
            .or_default()
            .push(record);
    }

    let rows = enumerate_buckets(granularity, year_range)
        .into_iter()
        .map(|bucket| {
            let metrics = by_bucket.get(&bucket.key).copied().unwrap_or_default();
            KpiTrendRow {
                period: bucket.label,
                total_events: metrics.total_events,
                downtime_minutes: metrics.downtime_minutes,
                closure_rate: metrics.closure_rate(),
                severe_incidents: metrics.severe_count,
                open_in_progress: metrics.open_in_progress,
            }
        })
        .collect();

    KpiTrend {
        granularity,
        year,
        current_period: bucket_label(as_of, granularity),
        columns: Metric::ALL.iter().map(|metric| metric.name()).collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, Status};
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(
        on: NaiveDate,
        severity: Severity,
        status: Status,
        downtime: Option<i64>,
    ) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            date: on,
            week_code: None,
            location_code: "HN".to_string(),
            main_group: "Infra".to_string(),
            category: "Network".to_string(),
            system_component: None,
            description: "switch outage".to_string(),
            severity,
            status,
            downtime_minutes: downtime,
            impact_scope: "Site".to_string(),
            classification: Classification::Bad,
        }
    }

    #[test]
    fn delta_handles_zero_baseline() {
        assert_eq!(delta_pct(0.0, 0.0), 0.0);
        assert_eq!(delta_pct(5.0, 0.0), 100.0);
        assert_eq!(delta_pct(0.0, 10.0), -100.0);
        assert_eq!(delta_pct(3.0, 2.0), 50.0);
        assert_eq!(delta_pct(1.0, 3.0), -66.7);
        assert_eq!(delta_pct(-2.0, -4.0), 50.0);
        for x in [1.0, 7.5, 42.0, 1000.0] {
            assert_eq!(delta_pct(x, x), 0.0);
        }
    }

    #[test]
    fn bucket_metrics_count_each_policy() {
        let day = date(2026, 2, 17);
        let records = vec![
            event(day, Severity::Critical, Status::Open, Some(30)),
            event(day, Severity::High, Status::InProgress, None),
            event(day, Severity::Low, Status::Resolved, Some(15)),
        ];
        let metrics = BucketMetrics::from_records(&records);
        assert_eq!(metrics.total_events, 3);
        assert_eq!(metrics.downtime_minutes, 45);
        assert_eq!(metrics.severe_count, 1);
        assert_eq!(metrics.open_in_progress, 2);
        assert_eq!(metrics.closure_rate(), 33.3);
        assert_eq!(BucketMetrics::default().closure_rate(), 0.0);
    }

    #[test]
    fn summarize_compares_to_prior_range() {
        let range = DateRange::new(date(2025, 12, 29), date(2026, 1, 4));
        let prior = range.preceding();
        let previous: Vec<EventRecord> = (0..10)
            .map(|i| {
                let on = prior.start + Duration::days(i % 7);
                event(on, Severity::Low, Status::Closed, None)
            })
            .collect();

        let summary = summarize(
            KpiInputs {
                current: &[],
                previous: &previous,
                window: &previous,
            },
            range,
            prior,
            Granularity::Week,
        );

        assert_eq!(summary.total_events.value, 0.0);
        assert_eq!(summary.total_events.delta_pct, -100.0);
        assert_eq!(summary.closure_rate.value, 0.0);
        assert_eq!(summary.closure_rate.delta_pct, -100.0);
        assert_eq!(summary.severe_incidents.delta_pct, 0.0);

        let spark = &summary.total_events.sparkline;
        assert_eq!(spark.len(), SPARKLINE_BUCKETS);
        assert_eq!(spark[SPARKLINE_BUCKETS - 1], 0.0);
        assert_eq!(spark[SPARKLINE_BUCKETS - 2], 10.0);
    }

    #[test]
    fn sparkline_window_starts_at_first_trailing_bucket() {
        let range = DateRange::new(date(2026, 3, 1), date(2026, 3, 31));
        let window = sparkline_window(Granularity::Month, range);
        assert_eq!(window, DateRange::new(date(2025, 4, 1), date(2026, 3, 31)));
    }

    #[test]
    fn status_distribution_splits_by_severity() {
        let day = date(2026, 2, 17);
        let records = vec![
            event(day, Severity::Critical, Status::Open, None),
            event(day, Severity::Critical, Status::Closed, None),
            event(day, Severity::Low, Status::Resolved, None),
            event(day, Severity::Medium, Status::InProgress, None),
        ];
        let dist = status_distribution(&records);
        assert_eq!(dist.all.count, 4);
        assert_eq!(dist.all.pct, 100.0);
        assert_eq!(dist.critical.count, 2);
        assert_eq!(dist.critical.pct, 50.0);
        assert_eq!((dist.critical.open, dist.critical.closed), (1, 1));
        assert_eq!(dist.high.count, 0);
        assert_eq!(status_distribution(&[]).all.pct, 0.0);
    }

    #[test]
    fn detail_rows_filter_and_order_by_age() {
        let as_of = date(2026, 3, 1);
        let records = vec![
            event(date(2026, 2, 20), Severity::Critical, Status::Open, Some(10)),
            event(date(2026, 2, 10), Severity::Low, Status::Open, None),
            event(date(2026, 2, 15), Severity::Critical, Status::Closed, None),
        ];

        let open = detail_rows(&records, MetricFilter::Open, as_of);
        let ages: Vec<i64> = open.iter().map(|row| row.days_open).collect();
        assert_eq!(ages, vec![19, 9]);

        let severe = detail_rows(&records, MetricFilter::Severe, as_of);
        assert_eq!(severe.len(), 2);
        assert_eq!(severe[0].date, date(2026, 2, 15));

        assert_eq!(detail_rows(&records, MetricFilter::Downtime, as_of).len(), 1);
        assert_eq!(detail_rows(&records, MetricFilter::All, as_of).len(), 3);
    }

    #[test]
    fn kpi_trend_has_row_per_bucket() {
        let year = DateRange::new(date(2026, 1, 1), date(2026, 12, 31));
        let records = vec![
            event(date(2026, 2, 3), Severity::Critical, Status::Closed, Some(60)),
            event(date(2026, 2, 27), Severity::Low, Status::Open, None),
            event(date(2025, 12, 31), Severity::Low, Status::Open, None),
        ];

        let trend = kpi_trend(&records, Granularity::Month, 2026, year, date(2026, 3, 15));
        assert_eq!(trend.rows.len(), 12);
        assert_eq!(trend.current_period, "T3");
        assert_eq!(trend.columns.len(), 5);

        let feb = &trend.rows[1];
        assert_eq!(feb.period, "T2");
        assert_eq!(feb.total_events, 2);
        assert_eq!(feb.closure_rate, 50.0);
        assert_eq!(feb.downtime_minutes, 60);
        assert_eq!(trend.rows[0].total_events, 0);
    }
}
