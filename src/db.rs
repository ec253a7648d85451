use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    CategoryMaster, Classification, DateRange, EventRecord, RecordFilter, WeekReference,
};
use crate::period::{week_code, WeekTable};
use crate::store::{with_timeout, EventCsvRow, RecordStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed record store. Every query runs under `timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl RecordStore for PgStore {
    async fn find_records(
        &self,
        range: DateRange,
        filter: &RecordFilter,
    ) -> EngineResult<Vec<EventRecord>> {
        let mut query = String::from(
            "SELECT id, date, week_code, location_code, main_group, category, \
             system_component, description, severity, status, downtime_minutes, \
             impact_scope, classification \
             FROM incident_analytics.events \
             WHERE deleted_at IS NULL AND date >= $1 AND date <= $2",
        );

        let mut next = 3;
        if filter.location_code.is_some() {
            query.push_str(&format!(" AND location_code = ${next}"));
            next += 1;
        }
        if filter.category.is_some() {
            query.push_str(&format!(" AND category = ${next}"));
        }

        let mut rows = sqlx::query(&query).bind(range.start).bind(range.end);
        if let Some(value) = &filter.location_code {
            rows = rows.bind(value);
        }
        if let Some(value) = &filter.category {
            rows = rows.bind(value);
        }

        let records = with_timeout("find_records", self.timeout, rows.fetch_all(&self.pool)).await?;
        debug!(%range, rows = records.len(), "fetched events");

        records.iter().map(event_from_row).collect()
    }

    async fn week_references(&self, year: i32) -> EngineResult<WeekTable> {
        let rows = with_timeout(
            "week_references",
            self.timeout,
            sqlx::query(
                "SELECT year, week_code, start_date, end_date \
                 FROM incident_analytics.week_reference WHERE year = $1",
            )
            .bind(year)
            .fetch_all(&self.pool),
        )
        .await?;

        WeekTable::from_rows(rows.into_iter().map(|row| WeekReference {
            year: row.get("year"),
            week_code: row.get("week_code"),
            start_date: row.get("start_date"),
            end_date: row.get("end_date"),
        }))
    }

    async fn list_category_master(&self) -> EngineResult<Vec<CategoryMaster>> {
        let rows = with_timeout(
            "list_category_master",
            self.timeout,
            sqlx::query(
                "SELECT main_group, category, classification \
                 FROM incident_analytics.category_master WHERE is_active",
            )
            .fetch_all(&self.pool),
        )
        .await?;

        rows.iter()
            .map(|row| -> EngineResult<CategoryMaster> {
                let classification: String = row.get("classification");
                Ok(CategoryMaster {
                    main_group: row.get("main_group"),
                    category: row.get("category"),
                    classification: decode("category_master", &classification)?,
                })
            })
            .collect()
    }

    async fn list_locations(&self) -> EngineResult<Vec<String>> {
        let rows = with_timeout(
            "list_locations",
            self.timeout,
            sqlx::query(
                "SELECT DISTINCT location_code FROM incident_analytics.events \
                 WHERE deleted_at IS NULL ORDER BY location_code",
            )
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.iter().map(|row| row.get("location_code")).collect())
    }
}

fn event_from_row(row: &PgRow) -> EngineResult<EventRecord> {
    let severity: String = row.get("severity");
    let status: String = row.get("status");
    let classification: String = row.get("classification");
    let downtime: Option<i32> = row.get("downtime_minutes");

    Ok(EventRecord {
        id: row.get("id"),
        date: row.get("date"),
        week_code: row.get("week_code"),
        location_code: row.get("location_code"),
        main_group: row.get("main_group"),
        category: row.get("category"),
        system_component: row.get("system_component"),
        description: row.get("description"),
        severity: decode("events", &severity)?,
        status: decode("events", &status)?,
        downtime_minutes: downtime.map(i64::from),
        impact_scope: row.get("impact_scope"),
        classification: decode("events", &classification)?,
    })
}

fn decode<T>(table: &str, raw: &str) -> EngineResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|err| EngineError::upstream(format!("decode {table}"), err))
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let weeks = WeekTable::iso(2024..=2027);
    for week in weeks.rows() {
        sqlx::query(
            r#"
            INSERT INTO incident_analytics.week_reference (year, week_code, start_date, end_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (year, week_code) DO UPDATE
            SET start_date = EXCLUDED.start_date, end_date = EXCLUDED.end_date
            "#,
        )
        .bind(week.year)
        .bind(&week.week_code)
        .bind(week.start_date)
        .bind(week.end_date)
        .execute(pool)
        .await?;
    }

    let categories = vec![
        ("Infrastructure", "Network", Classification::Bad),
        ("Infrastructure", "Server", Classification::Bad),
        ("Infrastructure", "Power", Classification::Bad),
        ("Application", "ERP", Classification::Bad),
        ("Application", "Email", Classification::Bad),
        ("Change", "Patching", Classification::Good),
        ("Change", "Hardware Refresh", Classification::Good),
        ("Operations", "Backup Verification", Classification::Neutral),
    ];

    for (main_group, category, classification) in &categories {
        sqlx::query(
            r#"
            INSERT INTO incident_analytics.category_master (main_group, category, classification)
            VALUES ($1, $2, $3)
            ON CONFLICT (main_group, category) DO UPDATE
            SET classification = EXCLUDED.classification
            "#,
        )
        .bind(main_group)
        .bind(category)
        .bind(classification.as_str())
        .execute(pool)
        .await?;
    }

    let events = vec![
        (
            "seed-001",
            NaiveDate::from_ymd_opt(2026, 2, 16).context("invalid date")?,
            "HN",
            "Infrastructure",
            "Network",
            Some("Core Switch"),
            "Core switch reboot loop",
            "High",
            "Resolved",
            Some(45),
            "Site",
            "Bad",
        ),
        (
            "seed-002",
            NaiveDate::from_ymd_opt(2026, 2, 18).context("invalid date")?,
            "HN",
            "Infrastructure",
            "Network",
            Some("Firewall"),
            "Firewall policy push dropped VPN",
            "High",
            "Closed",
            Some(30),
            "MultiSite",
            "Bad",
        ),
        (
            "seed-003",
            NaiveDate::from_ymd_opt(2026, 2, 20).context("invalid date")?,
            "HCM",
            "Infrastructure",
            "Network",
            Some("Core Switch"),
            "Uplink saturation during backup",
            "Critical",
            "In Progress",
            Some(120),
            "Site",
            "Bad",
        ),
        (
            "seed-004",
            NaiveDate::from_ymd_opt(2026, 2, 11).context("invalid date")?,
            "HCM",
            "Application",
            "ERP",
            None,
            "ERP batch posting delayed",
            "Medium",
            "Open",
            None,
            "Team",
            "Bad",
        ),
        (
            "seed-005",
            NaiveDate::from_ymd_opt(2026, 2, 21).context("invalid date")?,
            "HN",
            "Change",
            "Patching",
            Some("Windows Servers"),
            "Monthly patch window completed",
            "Low",
            "Closed",
            None,
            "Enterprise",
            "Good",
        ),
    ];

    for (
        source_key,
        date,
        location,
        main_group,
        category,
        component,
        description,
        severity,
        status,
        downtime,
        scope,
        classification,
    ) in events
    {
        sqlx::query(
            r#"
            INSERT INTO incident_analytics.events
            (id, year, week_code, date, location_code, main_group, category,
             system_component, description, severity, status, downtime_minutes,
             impact_scope, classification, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(date.iso_week().year())
        .bind(week_code(date.iso_week().week()))
        .bind(date)
        .bind(location)
        .bind(main_group)
        .bind(category)
        .bind(component)
        .bind(description)
        .bind(severity)
        .bind(status)
        .bind(downtime)
        .bind(scope)
        .bind(classification)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<EventCsvRow>().enumerate() {
        let row = result.with_context(|| format!("bad event row {}", line + 2))?;
        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let record = row.into_record()?;
        let downtime = record
            .downtime_minutes
            .map(i32::try_from)
            .transpose()
            .with_context(|| format!("downtime out of range on row {}", line + 2))?;

        let result = sqlx::query(
            r#"
            INSERT INTO incident_analytics.events
            (id, year, week_code, date, location_code, main_group, category,
             system_component, description, severity, status, downtime_minutes,
             impact_scope, classification, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.date.iso_week().year())
        .bind(&record.week_code)
        .bind(record.date)
        .bind(&record.location_code)
        .bind(&record.main_group)
        .bind(&record.category)
        .bind(&record.system_component)
        .bind(&record.description)
        .bind(record.severity.as_str())
        .bind(record.status.as_str())
        .bind(downtime)
        .bind(&record.impact_scope)
        .bind(record.classification.as_str())
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}
