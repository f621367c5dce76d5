use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::export;
use crate::extract::{self, ExtractError, Extraction, TermExtractor};
use crate::notify::{self, Notifier};
use crate::source::{self, Origin};
use crate::store;
use crate::words::{self, format_timestamp, Processed, TermObservation};

/// Counters for one `run`, written into the backup and the notifications.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub source: Option<Origin>,
    pub tools_collected: usize,
    pub terms_extracted: usize,
    pub failed_batches: usize,
    pub words_merged: usize,
    pub words_processed: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration_secs: f64,
}

impl RunStats {
    pub fn print(&self) {
        println!("Tools collected:  {}", self.tools_collected);
        println!("Terms extracted:  {}", self.terms_extracted);
        println!("Unique merged:    {}", self.words_merged);
        println!("Words kept:       {}", self.words_processed);
        if self.failed_batches > 0 {
            println!("Failed batches:   {}", self.failed_batches);
        }
        for w in &self.warnings {
            println!("Warning: {}", w);
        }
        for e in &self.errors {
            println!("Error: {}", e);
        }
    }
}

pub struct RunReport {
    pub stats: RunStats,
    pub processed: Processed,
    pub outputs: Vec<PathBuf>,
}

/// collect -> extract -> process -> persist -> export -> notify.
///
/// A failing collect, extract setup or corpus write aborts the run with an
/// error notification. Export and notification problems only add warnings.
pub async fn run(settings: &Settings, mock: bool, tools_file: Option<&Path>) -> Result<RunReport> {
    let t0 = Instant::now();
    let mock = mock || settings.mock_mode;
    let notifier = Notifier::from_settings(settings);
    let mut stats = RunStats::default();

    notifier
        .send(&notify::start_notice(&settings.target_url, mock, Utc::now()), &[])
        .await;

    // Stage 1: tools
    let (tools, origin) = match source::collect(&settings.target_url, tools_file, mock).await {
        Ok(found) => found,
        Err(e) => return Err(abort(&notifier, "collect", e, &mut stats).await),
    };
    stats.source = Some(origin);
    stats.tools_collected = tools.len();
    info!(?origin, tools = tools.len(), "collected tools");
    if origin == Origin::Mock {
        stats.warnings.push("Live scraping failed; used built-in mock tools".into());
    }

    // Stage 2: terms
    let extraction = match TermExtractor::from_settings(settings) {
        Ok(extractor) => extractor.extract(&tools).await,
        Err(ExtractError::MissingKey) if mock => {
            warn!("No API key in mock mode, using canned observations");
            Extraction {
                observations: extract::mock_observations(&format_timestamp(Utc::now())),
                ..Extraction::default()
            }
        }
        Err(e) => return Err(abort(&notifier, "extract", e.into(), &mut stats).await),
    };
    stats.terms_extracted = extraction.observations.len();
    stats.failed_batches = extraction.failed_batches;
    if extraction.failed_batches > 0 {
        stats.warnings.push(format!(
            "{} of {} extraction batches failed",
            extraction.failed_batches, extraction.batches
        ));
    }
    if extraction.observations.is_empty() {
        stats.warnings.push("No new terms extracted; corpus carried forward".into());
    }

    // Stage 3: engine
    let now = Utc::now();
    let corpus = store::load(&settings.corpus_path);
    let processed = words::process(corpus.words, extraction.observations, settings, now);
    stats.words_merged = processed.merged;
    stats.words_processed = processed.words.len();

    // Stage 4: persist
    if let Err(e) = store::save(&settings.corpus_path, &processed.words, &processed.summary, now) {
        let e = anyhow::Error::new(e).context(format!("Failed to save {}", settings.corpus_path.display()));
        return Err(abort(&notifier, "persist", e, &mut stats).await);
    }
    let mut outputs = vec![settings.corpus_path.clone()];

    stats.duration_secs = t0.elapsed().as_secs_f64();

    // Stage 5: exports
    let csv = export::write_csv(&settings.csv_path, &processed.words);
    let backup = export::write_backup(&settings.backup_dir, &processed.words, &processed.summary, &stats, now);
    let markdown =
        export::write_markdown_summary(&settings.backup_dir, &processed.words, &processed.summary, &stats, now);
    let mut attachments = Vec::new();
    for (result, attach) in [(csv, true), (backup, true), (markdown, false)] {
        match result {
            Ok(path) => {
                if attach {
                    attachments.push(path.clone());
                }
                outputs.push(path);
            }
            Err(e) => {
                warn!("Export failed: {:#}", e);
                stats.warnings.push(format!("Export failed: {:#}", e));
            }
        }
    }

    if settings.ci_artifacts {
        let backup = attachments.iter().find(|p| p.extension().is_some_and(|e| e == "json"));
        let staged = export::stage_ci_artifacts(
            &settings.artifacts_dir,
            backup.map(PathBuf::as_path),
            &processed.words,
            &stats,
            now,
        );
        match staged {
            Ok(staged) => outputs.extend(staged),
            Err(e) => {
                warn!("CI artifact staging failed: {:#}", e);
                stats.warnings.push(format!("CI artifact staging failed: {:#}", e));
            }
        }
    }

    // Stage 6: notify
    let sent = notifier
        .send(
            &notify::success_notice(&processed.words, &processed.summary, &stats, &settings.target_url, now),
            &attachments,
        )
        .await;
    if !stats.warnings.is_empty() {
        notifier
            .send(&notify::warning_notice(&stats.warnings, Some(&processed.summary), now), &[])
            .await;
    }
    debug!(sent, "notifications done");

    stats.duration_secs = t0.elapsed().as_secs_f64();
    Ok(RunReport {
        stats,
        processed,
        outputs,
    })
}

async fn abort(notifier: &Notifier, stage: &str, err: anyhow::Error, stats: &mut RunStats) -> anyhow::Error {
    let message = format!("{:#}", err);
    warn!(stage, "run aborted: {}", message);
    stats.errors.push(message.clone());
    notifier
        .send(&notify::error_notice(stage, &message, stats, Utc::now()), &[])
        .await;
    err.context(format!("{} stage failed", stage))
}

/// Feed a JSON array of observations through the engine and persist the result.
pub fn process_file(settings: &Settings, input: &Path) -> Result<Processed> {
    let now = Utc::now();
    let mut batch = read_observations(input)?;
    for obs in batch.iter_mut().filter(|o| o.extracted_at.is_empty()) {
        obs.extracted_at = format_timestamp(now);
    }
    let corpus = store::load(&settings.corpus_path);
    let processed = words::process(corpus.words, batch, settings, now);
    store::save(&settings.corpus_path, &processed.words, &processed.summary, now)
        .with_context(|| format!("Failed to save {}", settings.corpus_path.display()))?;
    export::write_csv(&settings.csv_path, &processed.words)?;
    Ok(processed)
}

/// Observations file: either a bare array or an object with `new_words`, as
/// the model returns it. Malformed entries are skipped.
pub fn read_observations(path: &Path) -> Result<Vec<TermObservation>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj.remove("new_words") {
            Some(serde_json::Value::Array(items)) => items,
            _ => anyhow::bail!("{} has no new_words array", path.display()),
        },
        _ => anyhow::bail!("{} is not an array of observations", path.display()),
    };

    let total = items.len();
    let batch: Vec<TermObservation> = items
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect();
    if batch.len() < total {
        warn!("Skipped {} malformed observations in {}", total - batch.len(), path.display());
    }
    info!("Read {} observations from {}", batch.len(), path.display());
    Ok(batch)
}

/// The persisted corpus re-ranked against the current clock.
pub fn load_ranked(settings: &Settings) -> Processed {
    let corpus = store::load(&settings.corpus_path);
    words::process(corpus.words, Vec::new(), settings, Utc::now())
}
