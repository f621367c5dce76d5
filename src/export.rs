use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::pipeline::RunStats;
use crate::words::stats::SummaryStats;
use crate::words::{format_timestamp, WordRecord};

pub const CSV_HEADERS: &[&str] = &[
    "word",
    "category",
    "definition",
    "importance",
    "trend_potential",
    "business_value",
    "is_emerging",
    "extraction_count",
    "ranking_score",
    "first_seen",
    "last_seen",
    "related_terms",
    "target_sectors",
    "contexts",
];

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(w: &mut W, row: &[String]) -> io::Result<()> {
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

/// One flat row per record; list fields joined.
pub fn csv_row(w: &WordRecord) -> Vec<String> {
    vec![
        w.word.clone(),
        w.category.clone(),
        w.definition.clone(),
        w.importance.to_string(),
        w.trend_potential.to_string(),
        w.business_value.to_string(),
        w.is_emerging.to_string(),
        w.extraction_count.to_string(),
        format!("{}", w.ranking_score),
        w.first_seen.clone(),
        w.last_seen.clone(),
        join(&w.related_terms, ", "),
        join(&w.target_sectors, ", "),
        join(&w.contexts, " | "),
    ]
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>, sep: &str) -> String {
    items.into_iter().map(String::as_str).collect::<Vec<_>>().join(sep)
}

pub fn to_csv_string(words: &[WordRecord]) -> String {
    let mut buf = Vec::new();
    let headers: Vec<String> = CSV_HEADERS.iter().map(|h| h.to_string()).collect();
    // Writing into a Vec cannot fail.
    let _ = write_row(&mut buf, &headers);
    for w in words {
        let _ = write_row(&mut buf, &csv_row(w));
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn write_csv(path: &Path, words: &[WordRecord]) -> Result<PathBuf> {
    ensure_parent(path)?;
    fs::write(path, to_csv_string(words))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Exported {} words to {}", words.len(), path.display());
    Ok(path.to_path_buf())
}

pub fn stamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Dated full-detail backup next to the other run outputs.
pub fn write_backup(
    dir: &Path,
    words: &[WordRecord],
    summary: &SummaryStats,
    run: &RunStats,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("ai_words_backup_{}.json", stamp(now)));
    let body = serde_json::json!({
        "timestamp": format_timestamp(now),
        "total_words": words.len(),
        "words": words,
        "summary": summary,
        "run": run,
    });
    fs::write(&path, serde_json::to_string_pretty(&body)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Created backup {}", path.display());
    Ok(path)
}

pub fn write_markdown_summary(
    dir: &Path,
    words: &[WordRecord],
    summary: &SummaryStats,
    run: &RunStats,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("ai_words_summary_{}.md", stamp(now)));
    fs::write(&path, render_markdown(words, summary, run, now))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn render_markdown(
    words: &[WordRecord],
    summary: &SummaryStats,
    run: &RunStats,
    now: DateTime<Utc>,
) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# AI Words Report\n");
    let _ = writeln!(md, "Generated: {}\n", now.format("%Y-%m-%d %H:%M:%S UTC"));

    let _ = writeln!(md, "## Run\n");
    let _ = writeln!(md, "- Tools collected: {}", run.tools_collected);
    let _ = writeln!(md, "- Terms extracted: {}", run.terms_extracted);
    let _ = writeln!(md, "- Words kept: {}", run.words_processed);
    if !run.warnings.is_empty() {
        let _ = writeln!(md, "- Warnings: {}", run.warnings.join("; "));
    }

    let _ = writeln!(md, "\n## Summary\n");
    let _ = writeln!(md, "- Total words: {}", summary.total_words);
    let _ = writeln!(md, "- Emerging terms: {}", summary.emerging_terms_count);
    let _ = writeln!(md, "- Average trend score: {}", summary.average_trend_score);
    for c in &summary.top_categories {
        let _ = writeln!(md, "- {}: {}", c.category, c.count);
    }

    let _ = writeln!(md, "\n## Top words\n");
    let _ = writeln!(md, "| # | Word | Category | Importance | Trend | Score |");
    let _ = writeln!(md, "|---|------|----------|------------|-------|-------|");
    for (i, w) in words.iter().take(20).enumerate() {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {:.1} |",
            i + 1,
            cell(&w.word),
            cell(&w.category),
            w.importance,
            w.trend_potential,
            w.ranking_score
        );
    }
    md
}

/// Copies the dated backup into `dir` and writes `execution_summary.md` there,
/// for CI to upload as build artifacts. Returns the files written.
pub fn stage_ci_artifacts(
    dir: &Path,
    backup: Option<&Path>,
    words: &[WordRecord],
    run: &RunStats,
    now: DateTime<Utc>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut staged = Vec::new();

    if let Some(src) = backup.filter(|p| p.exists()) {
        if let Some(name) = src.file_name() {
            let dest = dir.join(name);
            fs::copy(src, &dest)
                .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
            staged.push(dest);
        }
    }

    let path = dir.join("execution_summary.md");
    fs::write(&path, render_execution_summary(words, run, now))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    staged.push(path);

    info!("Staged {} CI artifacts in {}", staged.len(), dir.display());
    Ok(staged)
}

pub fn render_execution_summary(words: &[WordRecord], run: &RunStats, now: DateTime<Utc>) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# AI Words Mining Execution Summary
");
    let _ = writeln!(md, "## Execution Statistics
");
    let _ = writeln!(md, "- **Finished**: {}", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(md, "- **Duration**: {:.1}s", run.duration_secs);
    let _ = writeln!(md, "- **Tools collected**: {}", run.tools_collected);
    let _ = writeln!(md, "- **Terms extracted**: {}", run.terms_extracted);
    let _ = writeln!(md, "- **Words kept**: {}", run.words_processed);

    let _ = writeln!(md, "\n## Words\n");
    if words.is_empty() {
        let _ = writeln!(md, "No words extracted");
    } else {
        let _ = writeln!(md, "| Word | Category | Definition |");
        let _ = writeln!(md, "|------|----------|------------|");
        for w in words {
            let _ = writeln!(
                md,
                "| {} | {} | {} |",
                cell(&w.word),
                cell(&w.category),
                cell(&w.definition)
            );
        }
    }

    if !run.warnings.is_empty() {
        let _ = writeln!(md, "\n## Warnings\n");
        for warning in &run.warnings {
            let _ = writeln!(md, "- {}", warning);
        }
    }
    md
}

fn cell(s: &str) -> String {
    s.replace('|', "/").replace('\n', " ")
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}
