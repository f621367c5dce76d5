use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::identity::normalize;
use super::{Level, WordRecord};
use crate::config::FilterThresholds;

/// Generic marketing / product words. Exact match on the normalized word.
const STOP_WORDS: &[&str] = &[
    "ai", "new", "latest", "advanced", "powerful", "innovative", "cutting-edge",
    "state-of-the-art", "revolutionary", "breakthrough", "next-generation",
    "enhanced", "improved", "optimized", "efficient", "effective",
    "comprehensive", "complete", "full", "total", "ultimate", "best",
    "top", "leading", "premier", "professional", "enterprise", "business",
    "solution", "solutions", "platform", "platforms", "tool", "tools",
    "software", "application", "app", "service", "services", "system",
    "systems", "technology", "technologies", "framework", "frameworks",
];

static GENERIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^v\d+(\.\d+)*$",
        r"^\d+(\.\d+)*$",
        r"^[a-z]{1,2}$",
        r"^(beta|alpha|preview|demo|trial)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    StopWord,
    Generic,
    LowValue,
}

/// First rule the record trips, if any. Structural rules are checked before
/// the importance/trend rule.
pub fn rejection(record: &WordRecord, thresholds: &FilterThresholds) -> Option<Rejection> {
    let normalized = normalize(&record.word);
    if STOP_WORDS.contains(&normalized.as_str()) {
        return Some(Rejection::StopWord);
    }
    if GENERIC_PATTERNS.iter().any(|re| re.is_match(&normalized)) {
        return Some(Rejection::Generic);
    }
    if record.importance == Level::Low && record.trend_potential < thresholds.min_trend_for_low {
        return Some(Rejection::LowValue);
    }
    None
}

pub fn apply(records: Vec<WordRecord>, thresholds: &FilterThresholds) -> Vec<WordRecord> {
    records
        .into_iter()
        .filter(|r| match rejection(r, thresholds) {
            Some(reason) => {
                debug!(word = %r.word, ?reason, "filtered out");
                false
            }
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::words::TermObservation;

    fn record(word: &str, importance: Level, trend: u8) -> WordRecord {
        WordRecord::from_observation(TermObservation {
            importance,
            trend_potential: trend,
            ..TermObservation::new(word, "Test", "2026-10-01T00:00:00Z")
        })
    }

    fn verdict(word: &str, importance: Level, trend: u8) -> Option<Rejection> {
        rejection(&record(word, importance, trend), &FilterThresholds::default())
    }

    #[test]
    fn stop_words_exact_match_only() {
        assert_eq!(verdict("Platform", Level::High, 9), Some(Rejection::StopWord));
        assert_eq!(verdict("  TOOLS ", Level::High, 9), Some(Rejection::StopWord));
        assert_eq!(verdict("platform engineering", Level::High, 9), None);
    }

    #[test]
    fn structural_patterns() {
        assert_eq!(verdict("v2", Level::Low, 9), Some(Rejection::Generic));
        assert_eq!(verdict("V1.2.3", Level::High, 9), Some(Rejection::Generic));
        assert_eq!(verdict("2024", Level::High, 9), Some(Rejection::Generic));
        assert_eq!(verdict("3.5", Level::High, 9), Some(Rejection::Generic));
        assert_eq!(verdict("XR", Level::High, 9), Some(Rejection::Generic));
        assert_eq!(verdict("Preview", Level::High, 9), Some(Rejection::Generic));
        assert_eq!(verdict("beta testing", Level::High, 9), None);
        assert_eq!(verdict("v2 agents", Level::High, 9), None);
    }

    #[test]
    fn low_importance_needs_trend() {
        assert_eq!(verdict("Vibe Coding", Level::Low, 2), Some(Rejection::LowValue));
        assert_eq!(verdict("Vibe Coding", Level::Low, 3), None);
        assert_eq!(verdict("Vibe Coding", Level::Medium, 1), None);
    }

    #[test]
    fn raising_trend_flips_verdict() {
        let mut r = record("Agent Swarm", Level::Low, 2);
        let t = FilterThresholds::default();
        assert!(rejection(&r, &t).is_some());
        r.trend_potential = 5;
        assert!(rejection(&r, &t).is_none());
    }

    #[test]
    fn threshold_is_configurable() {
        let strict = FilterThresholds { min_trend_for_low: 6 };
        assert!(rejection(&record("Agent Swarm", Level::Low, 5), &strict).is_some());
    }

    #[test]
    fn apply_keeps_order_of_survivors() {
        let out = apply(
            vec![
                record("Agentic RAG", Level::High, 8),
                record("tool", Level::High, 8),
                record("Vibe Coding", Level::Medium, 6),
            ],
            &FilterThresholds::default(),
        );
        let words: Vec<&str> = out.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words, vec!["Agentic RAG", "Vibe Coding"]);
    }
}
