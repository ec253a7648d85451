use std::collections::HashMap;

use serde::Serialize;

use crate::models::{Classification, ClassificationIndex, EventRecord, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskItem {
    pub category: String,
    pub main_group: String,
    pub event_count: usize,
    pub max_severity: Severity,
    pub impact: u32,
    pub likelihood: u32,
    pub likelihood_label: &'static str,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    pub dominant_scope: String,
}

struct CategoryGroup {
    category: String,
    main_group: String,
    event_count: usize,
    max_severity: Severity,
    scopes: Vec<(String, usize)>,
}

/// Risk matrix rows for incident-class records, highest risk first.
pub fn score(records: &[EventRecord], classes: &ClassificationIndex) -> Vec<RiskItem> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for record in records
        .iter()
        .filter(|r| classes.classify(r) == Classification::Bad)
    {
        let slot = *positions.entry(record.category.as_str()).or_insert_with(|| {
            groups.push(CategoryGroup {
                category: record.category.clone(),
                main_group: record.main_group.clone(),
                event_count: 0,
                max_severity: record.severity,
                scopes: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.event_count += 1;
        group.max_severity = group.max_severity.max(record.severity);
        match group.scopes.iter_mut().find(|(scope, _)| *scope == record.impact_scope) {
            Some((_, count)) => *count += 1,
            None => group.scopes.push((record.impact_scope.clone(), 1)),
        }
    }

    let mut items: Vec<RiskItem> = groups
        .into_iter()
        .map(|group| {
            let impact = group.max_severity.rank();
            let (likelihood, likelihood_label) = likelihood_from_count(group.event_count);
            let risk_score = impact * likelihood;
            RiskItem {
                dominant_scope: dominant_scope(&group.scopes),
                category: group.category,
                main_group: group.main_group,
                event_count: group.event_count,
                max_severity: group.max_severity,
                impact,
                likelihood,
                likelihood_label,
                risk_score,
                risk_level: risk_level(risk_score),
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.risk_score
            .cmp(&a.risk_score)
            .then(b.event_count.cmp(&a.event_count))
    });
    items
}

pub fn likelihood_from_count(count: usize) -> (u32, &'static str) {
    match count {
        0..=1 => (1, "Rare"),
        2..=3 => (2, "Unlikely"),
        4..=6 => (3, "Possible"),
        _ => (4, "Likely"),
    }
}

pub fn risk_level(score: u32) -> RiskLevel {
    match score {
        0..=4 => RiskLevel::Low,
        5..=8 => RiskLevel::Medium,
        9..=12 => RiskLevel::High,
        _ => RiskLevel::Critical,
    }
}

/// Most frequent scope; ties go to whichever scope was seen first.
fn dominant_scope(scopes: &[(String, usize)]) -> String {
    let mut best: Option<&(String, usize)> = None;
    for entry in scopes {
        if best.map_or(true, |(_, count)| entry.1 > *count) {
            best = Some(entry);
        }
    }
    best.map(|(scope, _)| scope.clone())
        .unwrap_or_else(|| "Site".to_string())
}
