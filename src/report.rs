use std::fmt::Write;

use crate::dashboard::AnalyticsReport;
use crate::kpi::{KpiTrend, Metric};

pub fn build_report(location: Option<&str>, report: &AnalyticsReport) -> String {
    let mut output = String::new();
    let summary = &report.summary;
    let location_label = location.unwrap_or("all locations");

    let _ = writeln!(output, "# Incident Analytics Report");
    let _ = writeln!(
        output,
        "Generated for {} by {} ({}, compared with {})",
        location_label,
        report.granularity.as_str(),
        summary.range,
        summary.prior_range
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## KPIs");
    let _ = writeln!(output, "| Metric | Value | Change | Trend |");
    let _ = writeln!(output, "|---|---:|---:|---|");

    for metric in Metric::ALL {
        let kpi = summary.kpis.get(metric);
        let trend: Vec<String> = kpi.sparkline.iter().map(|v| format_number(*v)).collect();
        let _ = writeln!(
            output,
            "| {} | {} | {:+.1}% | {} |",
            metric.name(),
            format_number(kpi.value),
            kpi.delta_pct,
            trend.join(" ")
        );
    }

    let dist = &summary.status_distribution;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Severity Mix");
    for (name, share) in [
        ("Critical", &dist.critical),
        ("High", &dist.high),
        ("Medium", &dist.medium),
        ("Low", &dist.low),
    ] {
        let _ = writeln!(
            output,
            "- {}: {} events ({:.1}%), {} open, {} closed",
            name, share.count, share.pct, share.open, share.closed
        );
    }

    let chart = &report.chart.trend;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Trend");

    if chart.series.is_empty() {
        let _ = writeln!(output, "No events recorded for this period.");
    } else {
        let _ = writeln!(output, "| Category | Class | {} |", chart.x_axis().join(" | "));
        let _ = writeln!(output, "|---|---|{}", "---:|".repeat(chart.buckets.len()));
        for series in &chart.series {
            let counts: Vec<String> = series.data.iter().map(u64::to_string).collect();
            let _ = writeln!(
                output,
                "| {} | {} | {} |",
                series.name,
                series.classification.as_str(),
                counts.join(" | ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Matrix");

    if report.risk.items.is_empty() {
        let _ = writeln!(output, "No incident categories in this period.");
    } else {
        for item in &report.risk.items {
            let _ = writeln!(
                output,
                "- {} ({}): score {} [{:?}] impact {} x likelihood {} ({}), {} events, mostly {}",
                item.category,
                item.main_group,
                item.risk_score,
                item.risk_level,
                item.impact,
                item.likelihood,
                item.likelihood_label,
                item.event_count,
                item.dominant_scope
            );
        }
    }

    let pareto = &report.pareto.report;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Pareto");

    if pareto.items.is_empty() {
        let _ = writeln!(output, "No events recorded for this period.");
    } else {
        let _ = writeln!(
            output,
            "{} events; {} active weeks in {}.",
            pareto.total, pareto.total_weeks_in_year, report.year
        );
        for item in &pareto.items {
            let _ = writeln!(
                output,
                "- {}: {} ({:.1}%, cumulative {:.1}%), seen in {} weeks",
                item.group_key,
                item.count,
                item.percentage,
                item.cumulative_percentage,
                item.weeks_appeared
            );
        }
    }

    if !summary.detail_rows.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Oldest Matching Events");
        for row in summary.detail_rows.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} {} [{} / {}] {} ({} days)",
                row.date,
                row.location_code,
                row.severity.as_str(),
                row.status.as_str(),
                row.description,
                row.days_open
            );
        }
    }

    output
}

pub fn build_trend_table(trend: &KpiTrend) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "KPI trend for {} by {} (current period {})",
        trend.year,
        trend.granularity.as_str(),
        trend.current_period
    );
    let _ = writeln!(output, "period\t{}", trend.columns.join("\t"));
    for row in &trend.rows {
        let _ = writeln!(
            output,
            "{}\t{}\t{}\t{:.1}\t{}\t{}",
            row.period,
            row.total_events,
            row.downtime_minutes,
            row.closure_rate,
            row.severe_incidents,
            row.open_in_progress
        );
    }
    output
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Granularity;
    use crate::dashboard::full_report;
    use crate::dashboard::PeriodQuery;
    use crate::kpi::MetricFilter;
    use crate::models::{Classification, EventRecord, Severity, Status};
    use crate::pareto::ParetoOptions;
    use crate::period::WeekTable;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn sample_event(day: u32, category: &str) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            week_code: None,
            location_code: "HN".to_string(),
            main_group: "Infrastructure".to_string(),
            category: category.to_string(),
            system_component: None,
            description: "uplink flapping".to_string(),
            severity: Severity::High,
            status: Status::Open,
            downtime_minutes: Some(20),
            impact_scope: "Site".to_string(),
            classification: Classification::Bad,
        }
    }

    #[tokio::test]
    async fn report_lists_every_section() {
        let store = MemoryStore::new(
            vec![
                sample_event(16, "Network"),
                sample_event(17, "Network"),
                sample_event(18, "Power"),
            ],
            Vec::new(),
            WeekTable::iso(2026..=2026),
        );
        let query = PeriodQuery {
            granularity: Granularity::Week,
            year: 2026,
            period_start: "W08".to_string(),
            period_end: "W08".to_string(),
            location_code: None,
        };
        let report = full_report(
            &store,
            &query,
            MetricFilter::All,
            ParetoOptions::default(),
            NaiveDate::from_ymd_opt(2026, 2, 23).unwrap(),
        )
        .await
        .unwrap();

        let text = build_report(None, &report);
        assert!(text.contains("# Incident Analytics Report"));
        assert!(text.contains("| totalEvents | 3 | +100.0% |"));
        assert!(text.contains("| Network | Bad | 2 |"));
        assert!(text.contains("- Network (Infrastructure): score 6 [Medium]"));
        assert!(text.contains("- Network: 2 (66.7%, cumulative 66.7%), seen in 1 weeks"));
        assert!(text.contains("## Oldest Matching Events"));
    }

    #[test]
    fn numbers_drop_trailing_zero_decimals() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(33.3), "33.3");
    }
}
