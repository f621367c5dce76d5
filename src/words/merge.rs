use std::collections::HashMap;

use tracing::debug;

use super::identity::identity;
use super::{parse_timestamp, TermObservation, WordRecord};

/// Identity → record table. Keeps first-insertion order so later stable
/// sorting has a deterministic tie-break.
#[derive(Default)]
pub struct Merger {
    index: HashMap<String, usize>,
    records: Vec<WordRecord>,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one record from the persisted corpus. It keeps its own counters;
    /// a second persisted record with the same identity is folded in.
    pub fn absorb(&mut self, mut record: WordRecord) {
        if record.word.trim().is_empty() {
            debug!("skipping persisted record with empty word");
            return;
        }
        record.word_hash = identity(&record.word, &record.category);
        record.extraction_count = record.extraction_count.max(1);
        if record.first_seen.is_empty() {
            record.first_seen = record.extracted_at.clone();
        }
        if record.last_seen.is_empty() {
            record.last_seen = record.first_seen.clone();
        }

        match self.index.get(&record.word_hash) {
            Some(&i) => fold_record(&mut self.records[i], record),
            None => self.insert(record),
        }
    }

    /// Feed one fresh observation.
    pub fn observe(&mut self, obs: TermObservation) {
        if obs.word.trim().is_empty() {
            debug!("skipping observation with empty word");
            return;
        }
        let hash = identity(&obs.word, &obs.category);
        match self.index.get(&hash) {
            Some(&i) => fold_observation(&mut self.records[i], obs),
            None => self.insert(WordRecord::from_observation(obs)),
        }
    }

    pub fn into_records(self) -> Vec<WordRecord> {
        self.records
    }

    fn insert(&mut self, record: WordRecord) {
        self.index.insert(record.word_hash.clone(), self.records.len());
        self.records.push(record);
    }
}

/// Persisted corpus first, then the new batch.
pub fn merge_all(previous: Vec<WordRecord>, batch: Vec<TermObservation>) -> Vec<WordRecord> {
    let mut merger = Merger::new();
    for record in previous {
        merger.absorb(record);
    }
    for obs in batch {
        merger.observe(obs);
    }
    merger.into_records()
}

fn fold_observation(existing: &mut WordRecord, obs: TermObservation) {
    existing.extraction_count += 1;
    advance_last_seen(&mut existing.last_seen, &obs.extracted_at);
    push_context(&mut existing.contexts, obs.context);
    if obs.importance > existing.importance {
        existing.importance = obs.importance;
    }
    existing.trend_potential = existing.trend_potential.max(obs.trend_potential);
    existing.related_terms.extend(obs.related_terms);
    existing.target_sectors.extend(obs.target_sectors);
}

fn fold_record(existing: &mut WordRecord, other: WordRecord) {
    existing.extraction_count += other.extraction_count;
    if is_earlier(&other.first_seen, &existing.first_seen) {
        existing.first_seen = other.first_seen;
    }
    advance_last_seen(&mut existing.last_seen, &other.last_seen);
    for ctx in other.contexts {
        push_context(&mut existing.contexts, ctx);
    }
    if other.importance > existing.importance {
        existing.importance = other.importance;
    }
    existing.trend_potential = existing.trend_potential.max(other.trend_potential);
    existing.related_terms.extend(other.related_terms);
    existing.target_sectors.extend(other.target_sectors);
}

/// Move to `candidate` unless both parse and `candidate` is older.
fn advance_last_seen(last_seen: &mut String, candidate: &str) {
    if candidate.is_empty() || is_earlier(candidate, last_seen) {
        return;
    }
    *last_seen = candidate.to_string();
}

fn is_earlier(a: &str, b: &str) -> bool {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

fn push_context(contexts: &mut Vec<String>, ctx: String) {
    if !ctx.is_empty() && !contexts.contains(&ctx) {
        contexts.push(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::words::Level;

    fn obs(word: &str, at: &str) -> TermObservation {
        TermObservation::new(word, "AI Technique", at)
    }

    #[test]
    fn first_observation_seeds_record() {
        let mut o = obs("RAG", "2026-10-01T00:00:00Z");
        o.context = "RAG pipelines for support docs".into();
        let out = merge_all(Vec::new(), vec![o]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].extraction_count, 1);
        assert_eq!(out[0].first_seen, "2026-10-01T00:00:00Z");
        assert_eq!(out[0].last_seen, out[0].first_seen);
        assert_eq!(out[0].contexts, vec!["RAG pipelines for support docs"]);
    }

    #[test]
    fn empty_context_not_recorded() {
        let out = merge_all(Vec::new(), vec![obs("RAG", "2026-10-01T00:00:00Z")]);
        assert!(out[0].contexts.is_empty());
    }

    #[test]
    fn contexts_append_unique_in_order() {
        let mut a = obs("RAG", "2026-10-01T00:00:00Z");
        a.context = "one".into();
        let mut b = obs("rag", "2026-10-02T00:00:00Z");
        b.context = "two".into();
        let mut c = obs("Rag", "2026-10-03T00:00:00Z");
        c.context = "one".into();
        let out = merge_all(Vec::new(), vec![a, b, c]);
        assert_eq!(out[0].contexts, vec!["one", "two"]);
        assert_eq!(out[0].extraction_count, 3);
    }

    #[test]
    fn importance_only_escalates() {
        let mut a = obs("RAG", "2026-10-01T00:00:00Z");
        a.importance = Level::Medium;
        let mut b = obs("RAG", "2026-10-02T00:00:00Z");
        b.importance = Level::Low;
        let mut c = obs("RAG", "2026-10-03T00:00:00Z");
        c.importance = Level::High;
        let mut d = obs("RAG", "2026-10-04T00:00:00Z");
        d.importance = Level::Medium;

        let out = merge_all(Vec::new(), vec![a.clone(), b]);
        assert_eq!(out[0].importance, Level::Medium);
        let out = merge_all(Vec::new(), vec![a, c, d]);
        assert_eq!(out[0].importance, Level::High);
    }

    #[test]
    fn last_seen_never_regresses() {
        let late = obs("RAG", "2026-10-05T00:00:00Z");
        let early = obs("RAG", "2026-10-01T00:00:00Z");
        let out = merge_all(Vec::new(), vec![late, early]);
        assert_eq!(out[0].last_seen, "2026-10-05T00:00:00Z");
        assert_eq!(out[0].extraction_count, 2);
    }

    #[test]
    fn unparseable_time_still_advances() {
        let a = obs("RAG", "2026-10-05T00:00:00Z");
        let b = obs("RAG", "last tuesday");
        let out = merge_all(Vec::new(), vec![a, b]);
        assert_eq!(out[0].last_seen, "last tuesday");
    }

    #[test]
    fn set_union_and_count_independent_of_order() {
        let mut a = obs("RAG", "2026-10-01T00:00:00Z");
        a.related_terms = vec!["retrieval".into(), "vector search".into()];
        a.target_sectors = vec!["legal".into()];
        let mut b = obs("rag", "2026-10-02T00:00:00Z");
        b.related_terms = vec!["retrieval".into(), "grounding".into()];
        b.target_sectors = vec!["support".into()];

        let ab = merge_all(Vec::new(), vec![a.clone(), b.clone()]);
        let ba = merge_all(Vec::new(), vec![b, a]);
        assert_eq!(ab[0].extraction_count, ba[0].extraction_count);
        assert_eq!(ab[0].related_terms, ba[0].related_terms);
        assert_eq!(ab[0].target_sectors, ba[0].target_sectors);
        assert_eq!(ab[0].related_terms.len(), 3);
    }

    #[test]
    fn persisted_record_keeps_counters_then_takes_new_observation() {
        let mut seed = WordRecord::from_observation(obs("RAG", "2026-09-01T00:00:00Z"));
        seed.extraction_count = 4;
        seed.last_seen = "2026-09-20T00:00:00Z".into();

        let out = merge_all(vec![seed], vec![obs("rag", "2026-10-01T00:00:00Z")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].extraction_count, 5);
        assert_eq!(out[0].first_seen, "2026-09-01T00:00:00Z");
        assert_eq!(out[0].last_seen, "2026-10-01T00:00:00Z");
    }

    #[test]
    fn persisted_duplicates_fold_together() {
        let mut a = WordRecord::from_observation(obs("RAG", "2026-09-05T00:00:00Z"));
        a.extraction_count = 2;
        let mut b = WordRecord::from_observation(obs("rag", "2026-09-01T00:00:00Z"));
        b.extraction_count = 3;
        let out = merge_all(vec![a, b], Vec::new());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].extraction_count, 5);
        assert_eq!(out[0].first_seen, "2026-09-01T00:00:00Z");
        assert_eq!(out[0].last_seen, "2026-09-05T00:00:00Z");
    }

    #[test]
    fn blank_words_skipped() {
        let out = merge_all(Vec::new(), vec![obs("   ", "2026-10-01T00:00:00Z"), obs("RAG", "")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].word, "RAG");
    }

    #[test]
    fn hashes_unique_in_output() {
        let batch = vec![
            obs("RAG", "2026-10-01T00:00:00Z"),
            obs("rag!", "2026-10-01T00:00:00Z"),
            TermObservation::new("RAG", "Search", "2026-10-01T00:00:00Z"),
        ];
        let out = merge_all(Vec::new(), batch);
        assert_eq!(out.len(), 2);
        assert_ne!(out[0].word_hash, out[1].word_hash);
    }
}
