mod config;
mod export;
mod extract;
mod notify;
mod pipeline;
mod source;
mod store;
mod words;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use config::Settings;
use words::WordRecord;

#[derive(Parser)]
#[command(name = "ai_words", about = "Mine emerging AI terminology from tool listings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect tools, extract terms, merge into the corpus, export and notify
    Run {
        /// Allow built-in mock tools and canned terms when live sources fail
        #[arg(long)]
        mock: bool,
        /// Read tools from a JSON file instead of scraping
        #[arg(long)]
        tools: Option<PathBuf>,
    },
    /// Merge a JSON file of term observations into the corpus (no network)
    Process {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Ranked corpus table
    Top {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Only this category (case-insensitive)
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Summary statistics of the corpus
    Stats,
    /// Write the corpus as CSV
    Export {
        /// Defaults to the configured csv_path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show effective settings (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Run { mock, tools } => {
            println!("Pipeline: {}", settings.target_url);
            let report = pipeline::run(&settings, mock, tools.as_deref()).await?;
            println!("\n--- Execution summary ---");
            report.stats.print();
            println!("\nTop words:");
            print_table(&report.processed.words, 10);
            println!("\nOutputs:");
            for path in &report.outputs {
                println!("  {}", path.display());
            }
            Ok(())
        }
        Commands::Process { input } => {
            let processed = pipeline::process_file(&settings, &input)?;
            println!(
                "Merged into {} unique terms, {} kept after filtering.",
                processed.merged,
                processed.words.len()
            );
            println!("Saved to {}", settings.corpus_path.display());
            Ok(())
        }
        Commands::Top { limit, category } => {
            let ranked = pipeline::load_ranked(&settings);
            let rows: Vec<WordRecord> = match &category {
                Some(c) => ranked
                    .words
                    .into_iter()
                    .filter(|w| w.category.eq_ignore_ascii_case(c))
                    .collect(),
                None => ranked.words,
            };
            if rows.is_empty() {
                println!("No words found. Run 'run' or 'process' first.");
                return Ok(());
            }
            print_table(&rows, limit);
            println!("\n{} of {} words shown", rows.len().min(limit), rows.len());
            Ok(())
        }
        Commands::Stats => {
            let corpus = store::load(&settings.corpus_path);
            let summary = match corpus.summary {
                Some(s) => s,
                None => pipeline::load_ranked(&settings).summary,
            };
            println!("Total words:     {}", summary.total_words);
            println!("Emerging terms:  {}", summary.emerging_terms_count);
            println!("Avg trend score: {}", summary.average_trend_score);
            println!("Last updated:    {}", corpus.last_updated.as_deref().unwrap_or("-"));
            if !summary.importance_distribution.is_empty() {
                println!("\n--- Importance ---");
                for (level, n) in &summary.importance_distribution {
                    println!("  {:<8} {}", level, n);
                }
            }
            if !summary.top_categories.is_empty() {
                println!("\n--- Top categories ---");
                for c in &summary.top_categories {
                    println!("  {:<28} {}", truncate(&c.category, 28), c.count);
                }
            }
            Ok(())
        }
        Commands::Export { output } => {
            let ranked = pipeline::load_ranked(&settings);
            let path = output.unwrap_or_else(|| settings.csv_path.clone());
            let written = export::write_csv(&path, &ranked.words)?;
            println!("Exported {} words to {}", ranked.words.len(), written.display());
            Ok(())
        }
        Commands::Config => {
            for (name, value) in settings.describe() {
                println!("{:<18} {}", name, value);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_table(words: &[WordRecord], limit: usize) {
    println!(
        "{:>3} | {:<28} | {:<20} | {:<6} | {:>5} | {:>5} | {:>7}",
        "#", "Word", "Category", "Imp.", "Trend", "Seen", "Score"
    );
    println!("{}", "-".repeat(92));
    for (i, w) in words.iter().take(limit).enumerate() {
        println!(
            "{:>3} | {:<28} | {:<20} | {:<6} | {:>5} | {:>5} | {:>7.1}",
            i + 1,
            truncate(&w.word, 28),
            truncate(&w.category, 20),
            w.importance.as_str(),
            w.trend_potential,
            w.extraction_count,
            w.ranking_score
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
