use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{format_timestamp, WordRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_words: usize,
    pub categories: BTreeMap<String, usize>,
    pub importance_distribution: BTreeMap<String, usize>,
    pub average_trend_score: f64,
    pub emerging_terms_count: usize,
    pub top_categories: Vec<CategoryCount>,
    #[serde(default)]
    pub processing_timestamp: String,
}

pub fn summarize(words: &[WordRecord], top_n: usize, now: DateTime<Utc>) -> SummaryStats {
    let mut stats = SummaryStats {
        processing_timestamp: format_timestamp(now),
        ..Default::default()
    };
    if words.is_empty() {
        return stats;
    }

    let mut trend_sum = 0u64;
    for w in words {
        let category = if w.category.is_empty() { "Unknown" } else { w.category.as_str() };
        *stats.categories.entry(category.to_string()).or_default() += 1;
        *stats
            .importance_distribution
            .entry(w.importance.to_string())
            .or_default() += 1;
        trend_sum += u64::from(w.trend_potential);
        if w.is_emerging {
            stats.emerging_terms_count += 1;
        }
    }

    stats.total_words = words.len();
    let avg = trend_sum as f64 / words.len() as f64;
    stats.average_trend_score = (avg * 100.0).round() / 100.0;

    let mut by_size: Vec<CategoryCount> = stats
        .categories
        .iter()
        .map(|(category, &count)| CategoryCount {
            category: category.clone(),
            count,
        })
        .collect();
    // BTreeMap iteration is alphabetical; the stable sort keeps that for ties.
    by_size.sort_by(|a, b| b.count.cmp(&a.count));
    by_size.truncate(top_n);
    stats.top_categories = by_size;

    stats
}
