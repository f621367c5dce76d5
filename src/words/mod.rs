pub mod filter;
pub mod identity;
pub mod lenient;
pub mod merge;
pub mod rank;
pub mod stats;

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Settings;
use stats::SummaryStats;

/// Three-step ordinal used for `importance` and `business_value`.
/// Declaration order is the ordering: low < medium < high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

impl Level {
    pub fn weight(self) -> u32 {
        match self {
            Level::Low => 1,
            Level::Medium => 2,
            Level::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
        }
    }

    /// Case-insensitive parse; `None` for anything that isn't low/medium/high.
    pub fn parse(s: &str) -> Option<Level> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Level::Low),
            "medium" | "med" => Some(Level::Medium),
            "high" => Some(Level::High),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_TREND: u8 = 5;

fn default_trend() -> u8 {
    DEFAULT_TREND
}

fn default_count() -> u32 {
    1
}

/// One LLM-extracted candidate term. Never mutated once built.
///
/// Only `word` is required in practice; every other field falls back to a
/// neutral default so a sloppy model reply still decodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermObservation {
    #[serde(default, deserialize_with = "lenient::text")]
    pub word: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub definition: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub context: String,
    #[serde(default, deserialize_with = "lenient::level")]
    pub importance: Level,
    #[serde(default = "default_trend", deserialize_with = "lenient::trend")]
    pub trend_potential: u8,
    #[serde(default, deserialize_with = "lenient::level")]
    pub business_value: Level,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_emerging: bool,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub related_terms: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub target_sectors: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub extracted_at: String,
}

impl TermObservation {
    pub fn new(word: &str, category: &str, extracted_at: &str) -> Self {
        Self {
            word: word.to_string(),
            category: category.to_string(),
            definition: String::new(),
            context: String::new(),
            importance: Level::Medium,
            trend_potential: DEFAULT_TREND,
            business_value: Level::Medium,
            is_emerging: false,
            related_terms: Vec::new(),
            target_sectors: Vec::new(),
            extracted_at: extracted_at.to_string(),
        }
    }
}

/// The durable, deduplicated term. One per `word_hash` in any written corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    #[serde(default, deserialize_with = "lenient::text")]
    pub word: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub definition: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub context: String,
    #[serde(default, deserialize_with = "lenient::level")]
    pub importance: Level,
    #[serde(default = "default_trend", deserialize_with = "lenient::trend")]
    pub trend_potential: u8,
    #[serde(default, deserialize_with = "lenient::level")]
    pub business_value: Level,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_emerging: bool,
    #[serde(default, deserialize_with = "lenient::text")]
    pub extracted_at: String,

    #[serde(default)]
    pub word_hash: String,
    #[serde(default = "default_count", deserialize_with = "lenient::count")]
    pub extraction_count: u32,
    #[serde(default, deserialize_with = "lenient::text")]
    pub first_seen: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub last_seen: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub contexts: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_set")]
    pub related_terms: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient::string_set")]
    pub target_sectors: BTreeSet<String>,
    /// Recomputed every run; the persisted value is informational only.
    #[serde(default, deserialize_with = "lenient::score")]
    pub ranking_score: f64,
}

impl WordRecord {
    /// Seed a fresh record from its first observation.
    pub fn from_observation(obs: TermObservation) -> Self {
        let word_hash = identity::identity(&obs.word, &obs.category);
        let contexts = if obs.context.is_empty() {
            Vec::new()
        } else {
            vec![obs.context.clone()]
        };
        Self {
            word_hash,
            extraction_count: 1,
            first_seen: obs.extracted_at.clone(),
            last_seen: obs.extracted_at.clone(),
            contexts,
            related_terms: obs.related_terms.into_iter().collect(),
            target_sectors: obs.target_sectors.into_iter().collect(),
            ranking_score: 0.0,
            word: obs.word,
            category: obs.category,
            definition: obs.definition,
            context: obs.context,
            importance: obs.importance,
            trend_potential: obs.trend_potential,
            business_value: obs.business_value,
            is_emerging: obs.is_emerging,
            extracted_at: obs.extracted_at,
        }
    }
}

/// Output of one engine pass: ranked survivors plus their aggregates.
/// `words` is exactly what gets persisted; filtered records are gone.
#[derive(Debug, Clone)]
pub struct Processed {
    pub words: Vec<WordRecord>,
    pub summary: SummaryStats,
    /// Unique identities before filtering.
    pub merged: usize,
}

/// Run the full engine: merge previous corpus with the new batch, filter,
/// rank, summarize. Pure apart from the supplied clock.
pub fn process(
    previous: Vec<WordRecord>,
    batch: Vec<TermObservation>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Processed {
    let incoming = batch.len();
    let carried = previous.len();

    let merged = merge::merge_all(previous, batch);
    let merged_count = merged.len();
    info!(carried, incoming, unique = merged_count, "merged observations");

    let kept = filter::apply(merged, &settings.filter);
    info!(kept = kept.len(), dropped = merged_count - kept.len(), "filtered");

    let ranked = rank::rank(kept, &settings.scoring, now);
    let summary = stats::summarize(&ranked, settings.top_n, now);

    Processed {
        words: ranked,
        summary,
        merged: merged_count,
    }
}

/// Timestamp format written for new observations.
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Accepts RFC 3339 and the naive `YYYY-mm-dd HH:MM:SS` / ISO forms older
/// corpora contain (naive values are taken as UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}
