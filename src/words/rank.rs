use chrono::{DateTime, Utc};

use super::{parse_timestamp, WordRecord};
use crate::config::ScoringWeights;

pub fn score(record: &WordRecord, w: &ScoringWeights, now: DateTime<Utc>) -> f64 {
    let mut score = w.importance * f64::from(record.importance.weight())
        + w.trend * f64::from(record.trend_potential)
        + w.business_value * f64::from(record.business_value.weight())
        + w.extraction_count * f64::from(record.extraction_count);
    if record.is_emerging {
        score += w.emerging_bonus;
    }
    score + recency_bonus(&record.last_seen, w.recency_window_days, now)
}

/// `max(0, window - whole days since last_seen)`. Zero when the timestamp
/// doesn't parse; a future timestamp counts as today.
pub fn recency_bonus(last_seen: &str, window_days: f64, now: DateTime<Utc>) -> f64 {
    match parse_timestamp(last_seen) {
        Some(t) => {
            let days = (now - t).num_days().max(0) as f64;
            (window_days - days).max(0.0)
        }
        None => 0.0,
    }
}

/// Score and sort descending. The sort is stable, so equal scores keep
/// their merge order (persisted corpus order, then first appearance in the
/// new batch).
pub fn rank(mut records: Vec<WordRecord>, w: &ScoringWeights, now: DateTime<Utc>) -> Vec<WordRecord> {
    for r in &mut records {
        r.ranking_score = score(r, w, now);
    }
    records.sort_by(|a, b| b.ranking_score.total_cmp(&a.ranking_score));
    records
}
