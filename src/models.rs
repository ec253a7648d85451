use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Numeric impact band used by the risk matrix.
    pub fn rank(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Open,
    #[serde(rename = "In Progress", alias = "InProgress")]
    InProgress,
    Resolved,
    Closed,
}

impl Status {
    pub fn is_open(self) -> bool {
        matches!(self, Status::Open | Status::InProgress)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Status::Resolved | Status::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Open => "Open",
            Status::InProgress => "In Progress",
            Status::Resolved => "Resolved",
            Status::Closed => "Closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    Good,
    Bad,
    Neutral,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Good => "Good",
            Classification::Bad => "Bad",
            Classification::Neutral => "Neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.value)
    }
}

impl std::error::Error for UnknownValue {}

impl FromStr for Severity {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownValue {
                kind: "severity",
                value: value.to_string(),
            })
    }
}

impl FromStr for Status {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "open" => Ok(Status::Open),
            "inprogress" => Ok(Status::InProgress),
            "resolved" => Ok(Status::Resolved),
            "closed" => Ok(Status::Closed),
            _ => Err(UnknownValue {
                kind: "status",
                value: value.to_string(),
            }),
        }
    }
}

impl FromStr for Classification {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => Ok(Classification::Good),
            "bad" => Ok(Classification::Bad),
            "neutral" => Ok(Classification::Neutral),
            _ => Err(UnknownValue {
                kind: "classification",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    /// Stored week label; informational only, bucketing always uses `date`.
    pub week_code: Option<String>,
    pub location_code: String,
    pub main_group: String,
    pub category: String,
    pub system_component: Option<String>,
    pub description: String,
    pub severity: Severity,
    pub status: Status,
    pub downtime_minutes: Option<i64>,
    pub impact_scope: String,
    pub classification: Classification,
}

impl EventRecord {
    pub fn downtime(&self) -> i64 {
        self.downtime_minutes.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMaster {
    pub main_group: String,
    pub category: String,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekReference {
    pub year: i32,
    pub week_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Inclusive range of UTC calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The range of identical length ending the day before this one starts.
    pub fn preceding(&self) -> DateRange {
        let end = self.start - Duration::days(1);
        let start = end - (self.end - self.start);
        DateRange { start, end }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Category master lookup: (main group, category), then category alone,
/// then the record's own field.
#[derive(Debug, Clone, Default)]
pub struct ClassificationIndex {
    by_group: HashMap<(String, String), Classification>,
    by_category: HashMap<String, Classification>,
}

impl ClassificationIndex {
    pub fn new(master: &[CategoryMaster]) -> Self {
        let mut index = ClassificationIndex::default();
        for entry in master {
            index.by_group.insert(
                (entry.main_group.clone(), entry.category.clone()),
                entry.classification,
            );
            index
                .by_category
                .entry(entry.category.clone())
                .or_insert(entry.classification);
        }
        index
    }

    pub fn classify(&self, record: &EventRecord) -> Classification {
        self.by_group
            .get(&(record.main_group.clone(), record.category.clone()))
            .or_else(|| self.by_category.get(&record.category))
            .copied()
            .unwrap_or(record.classification)
    }
}

/// Optional dimension filters applied by the record store. Classification is
/// not a store filter; callers go through `ClassificationIndex`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub location_code: Option<String>,
    pub category: Option<String>,
}

impl RecordFilter {
    pub fn for_location(location_code: Option<&str>) -> Self {
        Self {
            location_code: location_code.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &EventRecord) -> bool {
        self.location_code
            .as_deref()
            .map_or(true, |code| record.location_code == code)
            && self
                .category
                .as_deref()
                .map_or(true, |category| record.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn preceding_range_has_same_length() {
        let week = DateRange::new(date(2025, 12, 29), date(2026, 1, 4));
        let prior = week.preceding();
        assert_eq!(prior.start, date(2025, 12, 22));
        assert_eq!(prior.end, date(2025, 12, 28));
        assert_eq!(prior.days(), week.days());
    }

    #[test]
    fn status_parses_display_and_compact_forms() {
        assert_eq!("In Progress".parse::<Status>(), Ok(Status::InProgress));
        assert_eq!("in_progress".parse::<Status>(), Ok(Status::InProgress));
        assert_eq!("closed".parse::<Status>(), Ok(Status::Closed));
        assert!("pending".parse::<Status>().is_err());
    }

    #[test]
    fn severity_ranks_follow_impact_bands() {
        let ranks: Vec<u32> = Severity::ALL.iter().map(|s| s.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        assert_eq!("critical".parse::<Severity>(), Ok(Severity::Critical));
    }

    #[test]
    fn negative_downtime_counts_as_zero() {
        let record = EventRecord {
            id: Uuid::new_v4(),
            date: date(2026, 2, 16),
            week_code: None,
            location_code: "HN".to_string(),
            main_group: "Infra".to_string(),
            category: "Network".to_string(),
            system_component: None,
            description: "link flap".to_string(),
            severity: Severity::High,
            status: Status::Open,
            downtime_minutes: Some(-5),
            impact_scope: "Site".to_string(),
            classification: Classification::Bad,
        };
        assert_eq!(record.downtime(), 0);
        assert!(RecordFilter::for_location(Some("HN")).matches(&record));
        assert!(!RecordFilter::for_location(Some("HCM")).matches(&record));

        let by_category = RecordFilter {
            location_code: None,
            category: Some("Power".to_string()),
        };
        assert!(!by_category.matches(&record));
    }

    #[test]
    fn master_classification_overrides_record_field() {
        let mut record = EventRecord {
            id: Uuid::new_v4(),
            date: date(2026, 2, 16),
            week_code: Some("W08".to_string()),
            location_code: "HN".to_string(),
            main_group: "Change".to_string(),
            category: "Patching".to_string(),
            system_component: None,
            description: "monthly patch window".to_string(),
            severity: Severity::Low,
            status: Status::Closed,
            downtime_minutes: None,
            impact_scope: "Site".to_string(),
            classification: Classification::Bad,
        };
        let master = vec![CategoryMaster {
            main_group: "Change".to_string(),
            category: "Patching".to_string(),
            classification: Classification::Good,
        }];
        let index = ClassificationIndex::new(&master);
        assert_eq!(index.classify(&record), Classification::Good);

        record.main_group = "Other".to_string();
        assert_eq!(index.classify(&record), Classification::Good);

        record.category = "Unmapped".to_string();
        assert_eq!(index.classify(&record), Classification::Bad);
    }
}
