use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tracing::warn;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    CategoryMaster, Classification, DateRange, EventRecord, RecordFilter, Severity, Status,
};
use crate::period::{week_code, WeekTable};

/// Read side of the event store the analytics run against.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_records(
        &self,
        range: DateRange,
        filter: &RecordFilter,
    ) -> EngineResult<Vec<EventRecord>>;

    async fn week_references(&self, year: i32) -> EngineResult<WeekTable>;

    async fn list_category_master(&self) -> EngineResult<Vec<CategoryMaster>>;

    /// Location codes with at least one live event, sorted.
    async fn list_locations(&self) -> EngineResult<Vec<String>>;
}

/// Store backed by plain vectors, used for CSV input and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<EventRecord>,
    categories: Vec<CategoryMaster>,
    weeks: WeekTable,
}

impl MemoryStore {
    pub fn new(
        records: Vec<EventRecord>,
        categories: Vec<CategoryMaster>,
        weeks: WeekTable,
    ) -> Self {
        Self {
            records,
            categories,
            weeks,
        }
    }

    /// Loads events (and optionally a category master) from CSV files;
    /// week references come from the ISO calendar.
    pub fn from_csv(events: &Path, categories: Option<&Path>) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(events)
            .with_context(|| format!("failed to open {}", events.display()))?;
        let mut records = Vec::new();
        for (line, row) in reader.deserialize::<EventCsvRow>().enumerate() {
            let row = row.with_context(|| format!("bad event row {}", line + 2))?;
            records.push(row.into_record()?);
        }

        let categories = match categories {
            Some(path) => {
                let mut reader = csv::Reader::from_path(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                let mut master = Vec::new();
                for (line, row) in reader.deserialize::<CategoryCsvRow>().enumerate() {
                    let row = row.with_context(|| format!("bad category row {}", line + 2))?;
                    master.push(row.into_master()?);
                }
                master
            }
            None => Vec::new(),
        };

        Ok(Self::new(records, categories, WeekTable::iso(2000..=2100)))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_records(
        &self,
        range: DateRange,
        filter: &RecordFilter,
    ) -> EngineResult<Vec<EventRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|record| range.contains(record.date) && filter.matches(record))
            .cloned()
            .collect())
    }

    async fn week_references(&self, year: i32) -> EngineResult<WeekTable> {
        Ok(self.weeks.for_year(year))
    }

    async fn list_category_master(&self) -> EngineResult<Vec<CategoryMaster>> {
        Ok(self.categories.clone())
    }

    async fn list_locations(&self) -> EngineResult<Vec<String>> {
        let codes: BTreeSet<&str> = self
            .records
            .iter()
            .map(|record| record.location_code.as_str())
            .collect();
        Ok(codes.into_iter().map(str::to_string).collect())
    }
}

/// Event row shape shared by CSV import and offline mode.
#[derive(Debug, serde::Deserialize)]
pub struct EventCsvRow {
    pub date: NaiveDate,
    pub location_code: String,
    pub main_group: String,
    pub category: String,
    pub system_component: Option<String>,
    pub description: String,
    pub severity: String,
    pub status: String,
    pub downtime_minutes: Option<i64>,
    pub impact_scope: Option<String>,
    pub classification: String,
    pub source_key: Option<String>,
}

impl EventCsvRow {
    pub fn into_record(self) -> anyhow::Result<EventRecord> {
        let severity: Severity = self.severity.parse()?;
        let status: Status = self.status.parse()?;
        let classification: Classification = self.classification.parse()?;
        Ok(EventRecord {
            id: Uuid::new_v4(),
            week_code: Some(week_code(self.date.iso_week().week())),
            date: self.date,
            location_code: self.location_code,
            main_group: self.main_group,
            category: self.category,
            system_component: self.system_component.filter(|c| !c.trim().is_empty()),
            description: self.description,
            severity,
            status,
            downtime_minutes: self.downtime_minutes,
            impact_scope: self
                .impact_scope
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "Site".to_string()),
            classification,
        })
    }
}

/// Category master row; headers follow the same snake_case as event rows.
#[derive(Debug, serde::Deserialize)]
pub struct CategoryCsvRow {
    pub main_group: String,
    pub category: String,
    pub classification: String,
}

impl CategoryCsvRow {
    pub fn into_master(self) -> anyhow::Result<CategoryMaster> {
        Ok(CategoryMaster {
            classification: self.classification.parse()?,
            main_group: self.main_group,
            category: self.category,
        })
    }
}

/// Runs `operation`, and once more after `backoff` if the first attempt
/// failed with a retryable error.
pub async fn retry_once<T, F, Fut>(backoff: Duration, mut operation: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    match operation().await {
        Err(err) if err.is_retryable() => {
            warn!(
                error = %err,
                backoff_ms = backoff.as_millis() as u64,
                "retrying after store failure"
            );
            tokio::time::sleep(backoff).await;
            operation().await
        }
        result => result,
    }
}

/// Wraps a store future with the configured deadline.
pub async fn with_timeout<T, E, Fut>(operation: &str, limit: Duration, fut: Fut) -> EngineResult<T>
where
    E: std::fmt::Display,
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(EngineError::upstream(operation, err)),
        Err(_) => Err(EngineError::upstream(
            operation,
            format!("timed out after {}ms", limit.as_millis()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn csv_row_normalizes_optional_fields() {
        let row = EventCsvRow {
            date: date(2026, 2, 18),
            location_code: "HN".to_string(),
            main_group: "Infra".to_string(),
            category: "Network".to_string(),
            system_component: Some("  ".to_string()),
            description: "uplink down".to_string(),
            severity: "High".to_string(),
            status: "In Progress".to_string(),
            downtime_minutes: Some(12),
            impact_scope: None,
            classification: "Bad".to_string(),
            source_key: None,
        };
        let record = row.into_record().unwrap();
        assert_eq!(record.week_code.as_deref(), Some("W08"));
        assert_eq!(record.status, Status::InProgress);
        assert_eq!(record.system_component, None);
        assert_eq!(record.impact_scope, "Site");
    }

    #[test]
    fn event_and_category_files_share_header_style() {
        let events = "date,location_code,main_group,category,system_component,description,\
            severity,status,downtime_minutes,impact_scope,classification,source_key\n\
            2026-02-16,HN,Infrastructure,Network,Core Switch,reboot loop,\
            High,Resolved,45,Site,Bad,k-1\n";
        let mut reader = csv::Reader::from_reader(events.as_bytes());
        let rows: Vec<EventCsvRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        let record = rows.into_iter().next().unwrap().into_record().unwrap();
        assert_eq!(record.main_group, "Infrastructure");
        assert_eq!(record.downtime_minutes, Some(45));

        let categories = "main_group,category,classification\nChange,Patching,Good\n";
        let mut reader = csv::Reader::from_reader(categories.as_bytes());
        let rows: Vec<CategoryCsvRow> = reader.deserialize().collect::<Result<_, _>>().unwrap();
        let master = rows.into_iter().next().unwrap().into_master().unwrap();
        assert_eq!(master.main_group, "Change");
        assert_eq!(master.classification, Classification::Good);
    }

    #[tokio::test]
    async fn memory_store_lists_distinct_locations() {
        let row = |location: &str| EventCsvRow {
            date: date(2026, 2, 18),
            location_code: location.to_string(),
            main_group: "Infra".to_string(),
            category: "Network".to_string(),
            system_component: None,
            description: "uplink down".to_string(),
            severity: "Low".to_string(),
            status: "Open".to_string(),
            downtime_minutes: None,
            impact_scope: None,
            classification: "Bad".to_string(),
            source_key: None,
        };
        let records = ["HN", "DN", "HN"]
            .into_iter()
            .map(|code| row(code).into_record().unwrap())
            .collect();
        let store = MemoryStore::new(records, Vec::new(), WeekTable::default());
        assert_eq!(store.list_locations().await.unwrap(), vec!["DN", "HN"]);
    }

    #[tokio::test]
    async fn retry_once_retries_only_upstream_failures() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_once(Duration::from_millis(1), || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EngineError::upstream("find_records", "connection reset"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: EngineResult<u32> = retry_once(Duration::from_millis(1), || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::invalid_period("W99", "out of range"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_surfaces_as_upstream_error() {
        let result: EngineResult<()> = with_timeout(
            "find_records",
            Duration::from_millis(5),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), std::io::Error>(())
            },
        )
        .await;
        assert!(matches!(result, Err(EngineError::UpstreamUnavailable { .. })));
    }
}
