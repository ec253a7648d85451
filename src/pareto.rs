use std::collections::{HashMap, HashSet};
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::calendar::{bucket_key, Granularity};
use crate::kpi::round_one;
use crate::models::{Classification, ClassificationIndex, EventRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum ParetoMode {
    #[default]
    All,
    BadOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum ParetoGrouping {
    #[default]
    Category,
    CategoryAndComponent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParetoOptions {
    pub mode: ParetoMode,
    pub grouping: ParetoGrouping,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    category: String,
    system_component: Option<String>,
}

impl GroupKey {
    fn of(record: &EventRecord, grouping: ParetoGrouping) -> Self {
        GroupKey {
            category: record.category.clone(),
            system_component: match grouping {
                ParetoGrouping::Category => None,
                ParetoGrouping::CategoryAndComponent => record.system_component.clone(),
            },
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.system_component {
            Some(component) => write!(f, "{} / {}", self.category, component),
            None => f.write_str(&self.category),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParetoItem {
    pub group_key: String,
    pub category: String,
    pub system_component: Option<String>,
    pub main_group: String,
    pub classification: Classification,
    pub count: usize,
    pub percentage: f64,
    pub cumulative_percentage: f64,
    pub weeks_appeared: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParetoReport {
    pub total: usize,
    pub total_weeks_in_year: usize,
    pub items: Vec<ParetoItem>,
}

struct Group {
    key: GroupKey,
    main_group: String,
    classification: Classification,
    count: usize,
}

/// Frequency ranking of the period's records with cumulative share, plus
/// how many weeks each group showed up in across `year_wide_records`, which
/// callers read over the ISO week-year.
pub fn pareto_rank(
    records: &[EventRecord],
    year_wide_records: &[EventRecord],
    options: ParetoOptions,
    classes: &ClassificationIndex,
) -> ParetoReport {
    let (recurrence, total_weeks_in_year) = weekly_recurrence(year_wide_records, options.grouping);

    let mut groups: Vec<Group> = Vec::new();
    let mut positions: HashMap<GroupKey, usize> = HashMap::new();
    let mut total = 0usize;

    for record in records {
        let classification = classes.classify(record);
        if options.mode == ParetoMode::BadOnly && classification != Classification::Bad {
            continue;
        }
        total += 1;

        let key = GroupKey::of(record, options.grouping);
        let slot = match positions.get(&key) {
            Some(&slot) => slot,
            None => {
                groups.push(Group {
                    key: key.clone(),
                    main_group: record.main_group.clone(),
                    classification,
                    count: 0,
                });
                positions.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].count += 1;
    }

    groups.sort_by(|a, b| b.count.cmp(&a.count));

    let mut cumulative = 0.0;
    let items = groups
        .into_iter()
        .map(|group| {
            let percentage = share(group.count, total);
            cumulative = round_one(cumulative + percentage);
            ParetoItem {
                group_key: group.key.to_string(),
                weeks_appeared: recurrence.get(&group.key).map_or(0, HashSet::len),
                category: group.key.category,
                system_component: group.key.system_component,
                main_group: group.main_group,
                classification: group.classification,
                count: group.count,
                percentage,
                cumulative_percentage: cumulative,
            }
        })
        .collect();

    ParetoReport {
        total,
        total_weeks_in_year,
        items,
    }
}

/// Distinct ISO weeks per group across the year, and across all groups.
fn weekly_recurrence(
    records: &[EventRecord],
    grouping: ParetoGrouping,
) -> (HashMap<GroupKey, HashSet<String>>, usize) {
    let mut by_group: HashMap<GroupKey, HashSet<String>> = HashMap::new();
    let mut all_weeks: HashSet<String> = HashSet::new();

    for record in records {
        let week = bucket_key(record.date, Granularity::Week);
        by_group
            .entry(GroupKey::of(record, grouping))
            .or_default()
            .insert(week.clone());
        all_weeks.insert(week);
    }

    (by_group, all_weeks.len())
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_one(count as f64 / total as f64 * 100.0)
}
