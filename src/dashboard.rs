use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::calendar::Granularity;
use crate::error::EngineResult;
use crate::kpi::{
    self, DetailRow, KpiInputs, KpiSummary, KpiTrend, MetricFilter, StatusDistribution,
};
use crate::matrix::{self, WeeklyMatrix};
use crate::models::{ClassificationIndex, DateRange, RecordFilter, WeekReference};
use crate::pareto::{self, ParetoOptions, ParetoReport};
use crate::period::{self, WeekTable};
use crate::risk::{self, RiskItem};
use crate::store::RecordStore;
use crate::trend::{self, TrendSeries};

/// A caller's period selection plus dimension filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodQuery {
    pub granularity: Granularity,
    pub year: i32,
    pub period_start: String,
    pub period_end: String,
    pub location_code: Option<String>,
}

impl PeriodQuery {
    fn filter(&self) -> RecordFilter {
        RecordFilter::for_location(self.location_code.as_deref())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub range: DateRange,
    pub prior_range: DateRange,
    pub kpis: KpiSummary,
    pub status_distribution: StatusDistribution,
    pub detail_rows: Vec<DetailRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskMatrix {
    pub range: DateRange,
    pub items: Vec<RiskItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParetoView {
    pub range: DateRange,
    #[serde(flatten)]
    pub report: ParetoReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendChart {
    pub range: DateRange,
    #[serde(flatten)]
    pub trend: TrendSeries,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub granularity: Granularity,
    pub year: i32,
    pub summary: DashboardSummary,
    pub chart: TrendChart,
    pub risk: RiskMatrix,
    pub pareto: ParetoView,
}

pub async fn resolve_range<S>(store: &S, query: &PeriodQuery) -> EngineResult<DateRange>
where
    S: RecordStore + ?Sized,
{
    let weeks = match query.granularity {
        Granularity::Week => store.week_references(query.year).await?,
        _ => WeekTable::default(),
    };
    period::resolve(
        query.granularity,
        query.year,
        &query.period_start,
        &query.period_end,
        &weeks,
    )
}

pub async fn summary<S>(
    store: &S,
    query: &PeriodQuery,
    metric_filter: MetricFilter,
    as_of: NaiveDate,
) -> EngineResult<DashboardSummary>
where
    S: RecordStore + ?Sized,
{
    let range = resolve_range(store, query).await?;
    let prior_range = range.preceding();
    let window = kpi::sparkline_window(query.granularity, range);
    let filter = query.filter();

    let (current, previous, window_records) = tokio::try_join!(
        store.find_records(range, &filter),
        store.find_records(prior_range, &filter),
        store.find_records(window, &filter),
    )?;

    let kpis = kpi::summarize(
        KpiInputs {
            current: &current,
            previous: &previous,
            window: &window_records,
        },
        range,
        prior_range,
        query.granularity,
    );

    info!(
        granularity = query.granularity.as_str(),
        %range,
        current = current.len(),
        previous = previous.len(),
        "built dashboard summary"
    );

    Ok(DashboardSummary {
        range,
        prior_range,
        kpis,
        status_distribution: kpi::status_distribution(&current),
        detail_rows: kpi::detail_rows(&current, metric_filter, as_of),
    })
}

pub async fn chart<S>(store: &S, query: &PeriodQuery) -> EngineResult<TrendChart>
where
    S: RecordStore + ?Sized,
{
    let range = resolve_range(store, query).await?;
    let filter = query.filter();
    let (records, master) = tokio::try_join!(
        store.find_records(range, &filter),
        store.list_category_master(),
    )?;

    let trend = trend::build_series(
        &records,
        range,
        query.granularity,
        &ClassificationIndex::new(&master),
    );
    info!(%range, series = trend.series.len(), buckets = trend.buckets.len(), "built trend chart");
    Ok(TrendChart { range, trend })
}

pub async fn risk_matrix<S>(store: &S, query: &PeriodQuery) -> EngineResult<RiskMatrix>
where
    S: RecordStore + ?Sized,
{
    let range = resolve_range(store, query).await?;
    let filter = query.filter();
    let (records, master) = tokio::try_join!(
        store.find_records(range, &filter),
        store.list_category_master(),
    )?;

    let items = risk::score(&records, &ClassificationIndex::new(&master));
    info!(%range, categories = items.len(), "built risk matrix");
    Ok(RiskMatrix { range, items })
}

pub async fn pareto<S>(
    store: &S,
    query: &PeriodQuery,
    options: ParetoOptions,
) -> EngineResult<ParetoView>
where
    S: RecordStore + ?Sized,
{
    let range = resolve_range(store, query).await?;
    let week_year = period::iso_week_year(query.year)?;
    let filter = query.filter();
    let (records, year_records, master) = tokio::try_join!(
        store.find_records(range, &filter),
        store.find_records(week_year, &filter),
        store.list_category_master(),
    )?;

    let report = pareto::pareto_rank(
        &records,
        &year_records,
        options,
        &ClassificationIndex::new(&master),
    );
    info!(%range, total = report.total, groups = report.items.len(), "built pareto ranking");
    Ok(ParetoView { range, report })
}

pub async fn kpi_trend<S>(
    store: &S,
    granularity: Granularity,
    year: i32,
    location_code: Option<&str>,
    as_of: NaiveDate,
) -> EngineResult<KpiTrend>
where
    S: RecordStore + ?Sized,
{
    let year_range = period::whole_year(year)?;
    let records = store
        .find_records(year_range, &RecordFilter::for_location(location_code))
        .await?;
    info!(granularity = granularity.as_str(), year, records = records.len(), "built kpi trend");
    Ok(kpi::kpi_trend(&records, granularity, year, year_range, as_of))
}

/// Events of one reference week grouped by location and category.
pub async fn weekly_matrix<S>(
    store: &S,
    year: i32,
    week: &str,
    location_code: Option<&str>,
) -> EngineResult<WeeklyMatrix>
where
    S: RecordStore + ?Sized,
{
    let weeks = store.week_references(year).await?;
    let range = period::resolve(Granularity::Week, year, week, week, &weeks)?;
    let reference = WeekReference {
        year,
        week_code: period::week_code(period::parse_week_code(week)?),
        start_date: range.start,
        end_date: range.end,
    };

    let filter = RecordFilter::for_location(location_code);
    let (records, master, locations) = tokio::try_join!(
        store.find_records(range, &filter),
        store.list_category_master(),
        store.list_locations(),
    )?;
    let locations: Vec<String> = match location_code {
        Some(code) => vec![code.to_string()],
        None => locations,
    };

    let matrix = matrix::build_matrix(
        reference,
        &records,
        &locations,
        &master,
        &ClassificationIndex::new(&master),
    );
    info!(
        year,
        week = %matrix.week.week_code,
        %range,
        cells = matrix.cells.len(),
        "built weekly matrix"
    );
    Ok(matrix)
}

/// Every view for one period selection; fails as a whole if any part does.
pub async fn full_report<S>(
    store: &S,
    query: &PeriodQuery,
    metric_filter: MetricFilter,
    options: ParetoOptions,
    as_of: NaiveDate,
) -> EngineResult<AnalyticsReport>
where
    S: RecordStore + ?Sized,
{
    let (summary, chart, risk, pareto) = tokio::try_join!(
        summary(store, query, metric_filter, as_of),
        chart(store, query),
        risk_matrix(store, query),
        pareto(store, query, options),
    )?;

    Ok(AnalyticsReport {
        granularity: query.granularity,
        year: query.year,
        summary,
        chart,
        risk,
        pareto,
    })
}
