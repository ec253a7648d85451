use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    CategoryMaster, Classification, ClassificationIndex, EventRecord, Severity, Status,
    WeekReference,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixEvent {
    pub id: Uuid,
    pub date: NaiveDate,
    pub description: String,
    pub severity: Severity,
    pub status: Status,
    pub downtime_minutes: Option<i64>,
    pub classification: Classification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCell {
    pub location_code: String,
    pub category: String,
    pub events: Vec<MatrixEvent>,
}

/// One reference week laid out as locations x categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyMatrix {
    pub week: WeekReference,
    pub locations: Vec<String>,
    pub categories: Vec<CategoryMaster>,
    pub cells: Vec<MatrixCell>,
}

impl WeeklyMatrix {
    pub fn cell(&self, location_code: &str, category: &str) -> Option<&MatrixCell> {
        self.cells
            .iter()
            .find(|cell| cell.location_code == location_code && cell.category == category)
    }
}

/// Groups the week's events by (location, category).
///
/// Columns are the category master sorted by main group then category,
/// followed by any category that only shows up in the events. Rows are the
/// known locations plus any location seen in the events, sorted by code.
/// Events inside a cell are in date order.
pub fn build_matrix(
    week: WeekReference,
    records: &[EventRecord],
    locations: &[String],
    master: &[CategoryMaster],
    classes: &ClassificationIndex,
) -> WeeklyMatrix {
    let mut in_week: Vec<&EventRecord> = records
        .iter()
        .filter(|r| r.date >= week.start_date && r.date <= week.end_date)
        .collect();
    in_week.sort_by_key(|record| record.date);

    let mut rows: BTreeSet<String> = locations.iter().cloned().collect();
    let mut categories: Vec<CategoryMaster> = master.to_vec();
    categories.sort_by(|a, b| (&a.main_group, &a.category).cmp(&(&b.main_group, &b.category)));
    let mut known: BTreeSet<String> = categories.iter().map(|c| c.category.clone()).collect();

    let mut cells: BTreeMap<(String, String), Vec<MatrixEvent>> = BTreeMap::new();
    for record in in_week {
        let classification = classes.classify(record);
        rows.insert(record.location_code.clone());
        if known.insert(record.category.clone()) {
            categories.push(CategoryMaster {
                main_group: record.main_group.clone(),
                category: record.category.clone(),
                classification,
            });
        }

        cells
            .entry((record.location_code.clone(), record.category.clone()))
            .or_default()
            .push(MatrixEvent {
                id: record.id,
                date: record.date,
                description: record.description.clone(),
                severity: record.severity,
                status: record.status,
                downtime_minutes: record.downtime_minutes,
                classification,
            });
    }

    WeeklyMatrix {
        week,
        locations: rows.into_iter().collect(),
        categories,
        cells: cells
            .into_iter()
            .map(|((location_code, category), events)| MatrixCell {
                location_code,
                category,
                events,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn week_08() -> WeekReference {
        WeekReference {
            year: 2026,
            week_code: "W08".to_string(),
            start_date: date(2026, 2, 16),
            end_date: date(2026, 2, 22),
        }
    }

    fn event(on: NaiveDate, location: &str, main_group: &str, category: &str) -> EventRecord {
        EventRecord {
            id: Uuid::new_v4(),
            date: on,
            week_code: Some("W08".to_string()),
            location_code: location.to_string(),
            main_group: main_group.to_string(),
            category: category.to_string(),
            system_component: None,
            description: format!("{category} at {location}"),
            severity: Severity::Medium,
            status: Status::Open,
            downtime_minutes: None,
            impact_scope: "Site".to_string(),
            classification: Classification::Bad,
        }
    }

    fn master(main_group: &str, category: &str, classification: Classification) -> CategoryMaster {
        CategoryMaster {
            main_group: main_group.to_string(),
            category: category.to_string(),
            classification,
        }
    }

    #[test]
    fn groups_week_events_by_location_and_category() {
        let records = vec![
            event(date(2026, 2, 20), "HN", "Infrastructure", "Network"),
            event(date(2026, 2, 16), "HN", "Infrastructure", "Network"),
            event(date(2026, 2, 18), "HCM", "Change", "Patching"),
            event(date(2026, 2, 23), "HN", "Infrastructure", "Network"),
        ];
        let master = vec![
            master("Infrastructure", "Network", Classification::Bad),
            master("Change", "Patching", Classification::Good),
        ];
        let locations = vec!["HN".to_string(), "DN".to_string()];

        let matrix = build_matrix(
            week_08(),
            &records,
            &locations,
            &master,
            &ClassificationIndex::new(&master),
        );

        assert_eq!(matrix.locations, vec!["DN", "HCM", "HN"]);
        let columns: Vec<&str> = matrix.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(columns, vec!["Patching", "Network"]);

        let network = matrix.cell("HN", "Network").unwrap();
        let days: Vec<NaiveDate> = network.events.iter().map(|e| e.date).collect();
        assert_eq!(days, vec![date(2026, 2, 16), date(2026, 2, 20)]);

        let patching = matrix.cell("HCM", "Patching").unwrap();
        assert_eq!(patching.events[0].classification, Classification::Good);
        assert!(matrix.cell("DN", "Network").is_none());
        assert_eq!(matrix.cells.len(), 2);
    }

    #[test]
    fn unmapped_categories_still_get_a_column() {
        let records = vec![event(date(2026, 2, 17), "HN", "Facilities", "Cooling")];
        let matrix = build_matrix(week_08(), &records, &[], &[], &ClassificationIndex::default());

        assert_eq!(matrix.categories, vec![master("Facilities", "Cooling", Classification::Bad)]);
        assert_eq!(matrix.locations, vec!["HN"]);
    }
}
