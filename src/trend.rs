use std::collections::HashMap;

use serde::Serialize;

use crate::calendar::{bucket_key, enumerate_buckets, Bucket, Granularity};
use crate::models::{Classification, ClassificationIndex, DateRange, EventRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySeries {
    pub name: String,
    pub classification: Classification,
    pub data: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub buckets: Vec<Bucket>,
    pub series: Vec<CategorySeries>,
}

impl TrendSeries {
    pub fn x_axis(&self) -> Vec<&str> {
        self.buckets.iter().map(|bucket| bucket.label.as_str()).collect()
    }
}

/// Per-category event counts aligned to the buckets of `range`.
///
/// Series come out with every `Bad` category first, then the rest, each
/// group sorted by name. The chart renderer depends on this order.
pub fn build_series(
    records: &[EventRecord],
    range: DateRange,
    granularity: Granularity,
    classes: &ClassificationIndex,
) -> TrendSeries {
    let buckets = enumerate_buckets(granularity, range);
    let index: HashMap<&str, usize> = buckets
        .iter()
        .enumerate()
        .map(|(i, bucket)| (bucket.key.as_str(), i))
        .collect();

    let mut grouped: HashMap<String, CategorySeries> = HashMap::new();
    for record in records.iter().filter(|r| range.contains(r.date)) {
        let key = bucket_key(record.date, granularity);
        let Some(&slot) = index.get(key.as_str()) else {
            continue;
        };

        let series = grouped
            .entry(record.category.clone())
            .or_insert_with(|| CategorySeries {
                name: record.category.clone(),
                classification: classes.classify(record),
                data: vec![0; buckets.len()],
            });
        series.data[slot] += 1;
    }

    let mut series: Vec<CategorySeries> = grouped.into_values().collect();
    series.sort_by(|a, b| {
        let a_rest = a.classification != Classification::Bad;
        let b_rest = b.classification != Classification::Bad;
        a_rest.cmp(&b_rest).then_with(|| a.name.cmp(&b.name))
    });

    TrendSeries { buckets, series }
}
