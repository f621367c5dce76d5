use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

const ENV_PREFIX: &str = "AIWORDS";
const MAX_RETRIES_CAP: u32 = 10;

/// Runtime settings, built once in `main` and passed down by reference.
///
/// Env vars use the `AIWORDS_` prefix; nested fields use `__`
/// (`AIWORDS_SCORING__EMERGING_BONUS=20`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus_path: PathBuf,
    pub csv_path: PathBuf,
    pub backup_dir: PathBuf,
    pub target_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub request_delay_ms: u64,
    pub webhook_url: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub email_from: Option<String>,
    pub email_to: Option<String>,
    /// Copy run outputs into `artifacts_dir` for a CI job to upload. Also
    /// switched on by `GITHUB_ACTIONS=true`.
    pub ci_artifacts: bool,
    pub artifacts_dir: PathBuf,
    pub mock_mode: bool,
    pub top_n: usize,
    pub scoring: ScoringWeights,
    pub filter: FilterThresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            corpus_path: PathBuf::from("data/processed_words.json"),
            csv_path: PathBuf::from("data/ai_words_export.csv"),
            backup_dir: PathBuf::from("data/backups"),
            target_url: "https://theresanaiforthat.com/trending/week/top-50/?pos=1".into(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            batch_size: 10,
            max_retries: 3,
            request_delay_ms: 1000,
            webhook_url: None,
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            email_from: None,
            email_to: None,
            ci_artifacts: false,
            artifacts_dir: PathBuf::from("artifacts"),
            mock_mode: false,
            top_n: 5,
            scoring: ScoringWeights::default(),
            filter: FilterThresholds::default(),
        }
    }
}

/// Ranking multipliers. `recency_window_days` is both the max recency bonus
/// and the number of days it takes to decay to zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub importance: f64,
    pub trend: f64,
    pub business_value: f64,
    pub extraction_count: f64,
    pub emerging_bonus: f64,
    pub recency_window_days: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            importance: 10.0,
            trend: 5.0,
            business_value: 8.0,
            extraction_count: 3.0,
            emerging_bonus: 15.0,
            recency_window_days: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterThresholds {
    /// Records with `importance == low` need at least this trend potential.
    pub min_trend_for_low: u8,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self { min_trend_for_low: 3 }
    }
}

impl Settings {
    /// Defaults, then `.env`, then `AIWORDS_*` from the process environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut settings = Self::from_env(Environment::with_prefix(ENV_PREFIX))?;
        if std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true") {
            settings.ci_artifacts = true;
        }
        Ok(settings)
    }

    fn from_env(env: Environment) -> Result<Self> {
        let mut settings: Settings = Config::builder()
            .add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.openai_api_key = settings.openai_api_key.filter(|k| !k.trim().is_empty());
        settings.webhook_url = settings.webhook_url.filter(|u| !u.trim().is_empty());
        for field in [
            &mut settings.smtp_host,
            &mut settings.smtp_username,
            &mut settings.smtp_password,
            &mut settings.email_from,
            &mut settings.email_to,
        ] {
            *field = field.take().filter(|v| !v.trim().is_empty());
        }
        settings.batch_size = settings.batch_size.max(1);
        settings.max_retries = settings.max_retries.min(MAX_RETRIES_CAP);
        Ok(settings)
    }

    /// (name, value) pairs for display, secrets masked.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let mask = |v: &Option<String>| match v {
            Some(_) => "*".repeat(20),
            None => "Not set".to_string(),
        };
        vec![
            ("corpus_path", self.corpus_path.display().to_string()),
            ("csv_path", self.csv_path.display().to_string()),
            ("backup_dir", self.backup_dir.display().to_string()),
            ("target_url", self.target_url.clone()),
            ("openai_base_url", self.openai_base_url.clone()),
            ("model", self.model.clone()),
            ("batch_size", self.batch_size.to_string()),
            ("max_retries", self.max_retries.to_string()),
            ("request_delay_ms", self.request_delay_ms.to_string()),
            ("mock_mode", self.mock_mode.to_string()),
            ("ci_artifacts", self.ci_artifacts.to_string()),
            ("artifacts_dir", self.artifacts_dir.display().to_string()),
            ("smtp_host", self.smtp_host.clone().unwrap_or_else(|| "Not set".into())),
            ("smtp_port", self.smtp_port.to_string()),
            ("email_from", self.email_from.clone().unwrap_or_else(|| "Not set".into())),
            ("email_to", self.email_to.clone().unwrap_or_else(|| "Not set".into())),
            ("smtp_username", mask(&self.smtp_username)),
            ("smtp_password", mask(&self.smtp_password)),
            ("top_n", self.top_n.to_string()),
            ("scoring", format!("{:?}", self.scoring)),
            ("filter", format!("{:?}", self.filter)),
            ("openai_api_key", mask(&self.openai_api_key)),
            ("webhook_url", mask(&self.webhook_url)),
        ]
    }
}
