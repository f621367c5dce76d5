use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::words::stats::SummaryStats;
use crate::words::{format_timestamp, WordRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode corpus: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to replace corpus file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// The persisted corpus as read back. Everything optional fails open.
#[derive(Debug, Default)]
pub struct Corpus {
    pub words: Vec<WordRecord>,
    pub summary: Option<SummaryStats>,
    pub last_updated: Option<String>,
}

#[derive(Serialize)]
struct CorpusOut<'a> {
    words: &'a [WordRecord],
    summary: &'a SummaryStats,
    last_updated: String,
    total_words: usize,
}

#[derive(Deserialize)]
struct CorpusIn {
    words: Vec<serde_json::Value>,
    #[serde(default)]
    summary: Option<serde_json::Value>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Read the corpus file. Missing, unreadable or corrupt files yield an empty
/// corpus; individual malformed records are skipped.
pub fn load(path: &Path) -> Corpus {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No corpus at {}, starting fresh", path.display());
            return Corpus::default();
        }
        Err(e) => {
            warn!("Could not read corpus {}: {}", path.display(), e);
            return Corpus::default();
        }
    };
    parse(&text).unwrap_or_else(|e| {
        warn!("Ignoring corrupt corpus {}: {}", path.display(), e);
        Corpus::default()
    })
}

fn parse(text: &str) -> Result<Corpus, serde_json::Error> {
    let raw: CorpusIn = serde_json::from_str(text)?;
    let total = raw.words.len();
    let words: Vec<WordRecord> = raw
        .words
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<WordRecord>(v) {
            Ok(w) if !w.word.trim().is_empty() => Some(w),
            Ok(_) => None,
            Err(e) => {
                debug!("skipping malformed corpus record: {}", e);
                None
            }
        })
        .collect();
    if words.len() < total {
        debug!("dropped {} of {} corpus records", total - words.len(), total);
    }
    let summary = raw.summary.and_then(|v| serde_json::from_value(v).ok());
    Ok(Corpus {
        words,
        summary,
        last_updated: raw.last_updated,
    })
}

/// Replace the corpus file wholesale (temp file + rename in the same dir).
pub fn save(
    path: &Path,
    words: &[WordRecord],
    summary: &SummaryStats,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let out = CorpusOut {
        words,
        summary,
        last_updated: format_timestamp(now),
        total_words: words.len(),
    };

    let tmp = NamedTempFile::new_in(parent)?;
    {
        let mut w = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut w, &out)?;
        w.flush()?;
    }
    tmp.persist(path)?;
    info!("Saved {} words to {}", words.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::words::{self, Level, TermObservation};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let c = load(&dir.path().join("nope.json"));
        assert!(c.words.is_empty());
        assert!(c.summary.is_none());
    }

    #[test]
    fn corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load(&path).words.is_empty());

        fs::write(&path, r#"{"summary": {}}"#).unwrap();
        assert!(load(&path).words.is_empty());
    }

    #[test]
    fn legacy_fixture_loads_and_skips_bad_records() {
        let text = fs::read_to_string("tests/fixtures/legacy_corpus.json").unwrap();
        let c = parse(&text).unwrap();
        let names: Vec<&str> = c.words.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(names, vec!["RAG", "Vibe Coding", "Agent Swarm"]);
        assert_eq!(c.words[0].extraction_count, 3);
        assert_eq!(c.words[0].importance, Level::High);
        assert_eq!(c.words[1].trend_potential, 9);
        assert!(c.words[1].related_terms.contains("pair programming"));
        assert_eq!(c.words[2].extraction_count, 1);
        assert_eq!(c.last_updated.as_deref(), Some("2026-10-12T08:30:00.000000"));
        // legacy top_categories shape does not decode; summary is optional
        assert!(c.summary.is_none());
    }

    #[test]
    fn save_then_reload_round_trips_identities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("corpus.json");

        let batch = vec![
            TermObservation {
                importance: Level::High,
                trend_potential: 8,
                context: "RAG over contracts".into(),
                ..TermObservation::new("RAG", "AI Technique", "2026-10-18T09:00:00Z")
            },
            TermObservation::new("rag", "AI Technique", "2026-10-19T09:00:00Z"),
            TermObservation::new("Vibe Coding", "Methodology", "2026-10-19T09:00:00Z"),
        ];
        let settings = Settings::default();
        let first = words::process(Vec::new(), batch, &settings, now());
        save(&path, &first.words, &first.summary, now()).unwrap();

        let reloaded = load(&path);
        assert_eq!(reloaded.summary.as_ref(), Some(&first.summary));
        let again = words::process(reloaded.words, Vec::new(), &settings, now());

        let key = |ws: &[WordRecord]| {
            let mut v: Vec<(String, u32)> =
                ws.iter().map(|w| (w.word_hash.clone(), w.extraction_count)).collect();
            v.sort();
            v
        };
        assert_eq!(key(&first.words), key(&again.words));
    }

    #[test]
    fn written_file_has_wrapper_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        save(&path, &[], &SummaryStats::default(), now()).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["total_words"], 0);
        assert_eq!(v["last_updated"], "2026-10-19T12:00:00Z");
        assert!(v["words"].as_array().unwrap().is_empty());
    }
}
