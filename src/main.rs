use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use incident_analytics::calendar::Granularity;
use incident_analytics::config::Config;
use incident_analytics::dashboard::{self, PeriodQuery};
use incident_analytics::db;
use incident_analytics::kpi::{Metric, MetricFilter};
use incident_analytics::pareto::{ParetoGrouping, ParetoMode, ParetoOptions};
use incident_analytics::report;
use incident_analytics::store::{retry_once, MemoryStore, RecordStore};

#[derive(Parser)]
#[command(name = "incident-analytics")]
#[command(
    about = "Period KPIs, trends, risk matrix and Pareto analysis for IT incident logs",
    long_about = None
)]
struct Cli {
    /// Read events from a CSV file instead of Postgres
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    /// Category master CSV used together with --csv
    #[arg(long, global = true, requires = "csv")]
    categories: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct PeriodArgs {
    #[arg(long, value_enum, default_value_t = Granularity::Week)]
    granularity: Granularity,
    #[arg(long)]
    year: i32,
    /// First period token (W01-W53, 01-12, Q1-Q4 or a year)
    #[arg(long)]
    from: String,
    /// Last period token, defaults to --from
    #[arg(long)]
    to: Option<String>,
    #[arg(long)]
    location: Option<String>,
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl PeriodArgs {
    fn query(&self) -> PeriodQuery {
        PeriodQuery {
            granularity: self.granularity,
            year: self.year,
            period_start: self.from.clone(),
            period_end: self.to.clone().unwrap_or_else(|| self.from.clone()),
            location_code: self.location.clone(),
        }
    }
}

#[derive(Args, Clone, Copy)]
struct ParetoArgs {
    #[arg(long, value_enum, default_value_t = ParetoMode::All)]
    mode: ParetoMode,
    #[arg(long, value_enum, default_value_t = ParetoGrouping::Category)]
    grouping: ParetoGrouping,
}

impl ParetoArgs {
    fn options(self) -> ParetoOptions {
        ParetoOptions {
            mode: self.mode,
            grouping: self.grouping,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load week references, category master and sample events
    Seed,
    /// Import events from a CSV file
    Import {
        #[arg(long = "file")]
        file: PathBuf,
    },
    /// KPI cards with deltas, sparklines and detail rows
    Summary {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, value_enum, default_value_t = MetricFilter::All)]
        metric: MetricFilter,
    },
    /// Per-category event counts by bucket
    Chart {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Impact x likelihood scores per incident category
    Risk {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Frequency ranking with cumulative share and yearly recurrence
    Pareto {
        #[command(flatten)]
        period: PeriodArgs,
        #[command(flatten)]
        pareto: ParetoArgs,
    },
    /// Events of one reference week by location and category
    Matrix {
        #[arg(long)]
        year: i32,
        /// Week token, W01-W53
        #[arg(long)]
        week: String,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Bucket metrics for every period of a year
    KpiTrend {
        #[arg(long, value_enum, default_value_t = Granularity::Month)]
        granularity: Granularity,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        period: PeriodArgs,
        #[command(flatten)]
        pareto: ParetoArgs,
        #[arg(long, value_enum, default_value_t = MetricFilter::All)]
        metric: MetricFilter,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store: Box<dyn RecordStore> = match &cli.csv {
        Some(path) => Box::new(MemoryStore::from_csv(path, cli.categories.as_deref())?),
        None => {
            let database_url = config.require_database_url()?;
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(database_url)
                .await
                .context("failed to connect to Postgres")?;

            match &cli.command {
                Commands::InitDb => {
                    db::init_db(&pool).await?;
                    println!("Schema ready.");
                    return Ok(());
                }
                Commands::Seed => {
                    db::seed(&pool).await?;
                    println!("Seed data inserted.");
                    return Ok(());
                }
                Commands::Import { file } => {
                    let inserted = db::import_csv(&pool, file).await?;
                    println!("Inserted {inserted} events from {}.", file.display());
                    return Ok(());
                }
                _ => Box::new(db::PgStore::new(pool, config.store_timeout)),
            }
        }
    };

    let store = store.as_ref();
    let backoff = config.retry_backoff;
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb | Commands::Seed | Commands::Import { .. } => {
            anyhow::bail!("database commands cannot run with --csv");
        }
        Commands::Summary { period, metric } => {
            let query = period.query();
            let summary =
                retry_once(backoff, || dashboard::summary(store, &query, metric, today)).await?;
            if period.json {
                return print_json(&summary);
            }

            println!("KPIs for {} (previous {}):", summary.range, summary.prior_range);
            for metric in Metric::ALL {
                let kpi = summary.kpis.get(metric);
                println!(
                    "- {}: {} ({:+.1}%)",
                    metric.name(),
                    kpi.value,
                    kpi.delta_pct
                );
            }
            if !summary.detail_rows.is_empty() {
                println!("Matching events:");
                for row in summary.detail_rows.iter().take(10) {
                    println!(
                        "- {} {} {} [{}] {} days",
                        row.date,
                        row.location_code,
                        row.description,
                        row.status.as_str(),
                        row.days_open
                    );
                }
            }
        }
        Commands::Chart { period } => {
            let query = period.query();
            let chart = retry_once(backoff, || dashboard::chart(store, &query)).await?;
            if period.json {
                return print_json(&chart);
            }

            println!("Buckets: {}", chart.trend.x_axis().join(", "));
            for series in &chart.trend.series {
                let counts: Vec<String> = series.data.iter().map(u64::to_string).collect();
                println!(
                    "- {} ({}): {}",
                    series.name,
                    series.classification.as_str(),
                    counts.join(" ")
                );
            }
        }
        Commands::Risk { period } => {
            let query = period.query();
            let matrix = retry_once(backoff, || dashboard::risk_matrix(store, &query)).await?;
            if period.json {
                return print_json(&matrix);
            }

            if matrix.items.is_empty() {
                println!("No incident categories found for {}.", matrix.range);
                return Ok(());
            }
            println!("Risk matrix for {}:", matrix.range);
            for item in &matrix.items {
                println!(
                    "- {} score {} ({:?}) impact {} likelihood {} across {} events",
                    item.category,
                    item.risk_score,
                    item.risk_level,
                    item.impact,
                    item.likelihood,
                    item.event_count
                );
            }
        }
        Commands::Pareto { period, pareto } => {
            let query = period.query();
            let options = pareto.options();
            let view = retry_once(backoff, || dashboard::pareto(store, &query, options)).await?;
            if period.json {
                return print_json(&view);
            }

            println!(
                "Pareto for {} ({} events, {} active weeks in {}):",
                view.range, view.report.total, view.report.total_weeks_in_year, query.year
            );
            for item in &view.report.items {
                println!(
                    "- {} {} ({:.1}%, cumulative {:.1}%) in {} weeks",
                    item.group_key,
                    item.count,
                    item.percentage,
                    item.cumulative_percentage,
                    item.weeks_appeared
                );
            }
        }
        Commands::Matrix {
            year,
            week,
            location,
            json,
        } => {
            let matrix = retry_once(backoff, || {
                dashboard::weekly_matrix(store, year, &week, location.as_deref())
            })
            .await?;
            if json {
                return print_json(&matrix);
            }

            println!(
                "{} {} ({} to {}): {} locations, {} categories",
                matrix.week.year,
                matrix.week.week_code,
                matrix.week.start_date,
                matrix.week.end_date,
                matrix.locations.len(),
                matrix.categories.len()
            );
            for cell in &matrix.cells {
                let descriptions: Vec<&str> =
                    cell.events.iter().map(|e| e.description.as_str()).collect();
                println!(
                    "- {} / {}: {}",
                    cell.location_code,
                    cell.category,
                    descriptions.join("; ")
                );
            }
        }
        Commands::KpiTrend {
            granularity,
            year,
            location,
            json,
        } => {
            let trend = retry_once(backoff, || {
                dashboard::kpi_trend(store, granularity, year, location.as_deref(), today)
            })
            .await?;
            if json {
                return print_json(&trend);
            }
            print!("{}", report::build_trend_table(&trend));
        }
        Commands::Report {
            period,
            pareto,
            metric,
            out,
        } => {
            let query = period.query();
            let options = pareto.options();
            let analytics = retry_once(backoff, || {
                dashboard::full_report(store, &query, metric, options, today)
            })
            .await?;
            let text = report::build_report(query.location_code.as_deref(), &analytics);
            std::fs::write(&out, text)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
